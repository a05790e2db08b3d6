//! SQLite store: durability and compare-and-swap across handles.

use crate::helpers::{ScriptedPush, ScriptedWhatsApp, t0, test_config};
use chrono::Duration;
use reminder_engine::model::TaskStatus;
use reminder_engine::store::{SqliteStore, TaskStore, UpdateOutcome, UserStore};
use reminder_engine::{Channel, CycleDeps, ManualClock, ScanCycle, Task};
use std::sync::Arc;

fn seeded(path: &std::path::Path) -> SqliteStore {
    let store = SqliteStore::open(path).unwrap();
    store
        .upsert_user("u1", Some("Ana"), Some("+51999000111"))
        .unwrap();
    store.register_push_token("u1", "tok-a").unwrap();
    store.register_push_token("u1", "tok-b").unwrap();
    store
        .insert_task(&Task::new("t1", "u1", "Pay rent", Some(t0() + Duration::days(1))))
        .unwrap();
    store
}

#[tokio::test]
async fn two_handles_on_one_file_apply_exactly_one_update() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reminders.db");
    let first = seeded(&path);
    let second = SqliteStore::open(&path).unwrap();

    let (a, b) = tokio::join!(
        first.update_reminder_state("t1", Channel::Push, None, t0()),
        second.update_reminder_state("t1", Channel::Push, None, t0() + Duration::seconds(1)),
    );
    let outcomes = [a.unwrap(), b.unwrap()];
    assert_eq!(
        outcomes.iter().filter(|o| **o == UpdateOutcome::Applied).count(),
        1
    );
    assert_eq!(
        outcomes.iter().filter(|o| **o == UpdateOutcome::Conflict).count(),
        1
    );
    assert_eq!(first.task("t1").unwrap().unwrap().sent_history.len(), 1);
}

#[tokio::test]
async fn dedup_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("reminders.db");
    let config = test_config();

    {
        let store = Arc::new(seeded(&path));
        let cycle = ScanCycle::new(
            &config,
            CycleDeps {
                tasks: store.clone(),
                users: store,
                push: Arc::new(ScriptedPush::default()),
                whatsapp: Arc::new(ScriptedWhatsApp::default()),
                clock: Arc::new(ManualClock::new(t0())),
            },
        );
        assert_eq!(cycle.run_once(Channel::WhatsApp).await.unwrap().sent, 1);
    }

    // A restarted process must not resend inside the cooldown.
    let reopened = Arc::new(SqliteStore::open(&path).unwrap());
    let whatsapp = Arc::new(ScriptedWhatsApp::default());
    let cycle = ScanCycle::new(
        &config,
        CycleDeps {
            tasks: reopened.clone(),
            users: reopened.clone(),
            push: Arc::new(ScriptedPush::default()),
            whatsapp: whatsapp.clone(),
            clock: Arc::new(ManualClock::new(t0() + Duration::hours(1))),
        },
    );
    let report = cycle.run_once(Channel::WhatsApp).await.unwrap();
    assert_eq!(report.sent, 0);
    assert_eq!(report.skipped, 1);
    assert!(whatsapp.calls().is_empty());

    let task = reopened.task("t1").unwrap().unwrap();
    assert_eq!(task.last_whatsapp_sent_at, Some(t0()));
    assert_eq!(task.sent_history.len(), 1);
}

#[tokio::test]
async fn sqlite_backed_cycle_removes_invalid_token() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(seeded(&dir.path().join("reminders.db")));
    let push = Arc::new(ScriptedPush::default());
    push.respond(
        "tok-b",
        reminder_engine::DeliveryResult::InvalidRecipient("UNREGISTERED".to_owned()),
    );
    let cycle = ScanCycle::new(
        &test_config(),
        CycleDeps {
            tasks: store.clone(),
            users: store.clone(),
            push,
            whatsapp: Arc::new(ScriptedWhatsApp::default()),
            clock: Arc::new(ManualClock::new(t0())),
        },
    );

    assert_eq!(cycle.run_once(Channel::Push).await.unwrap().sent, 1);
    let contact = store.contact_info("u1").await.unwrap().unwrap();
    assert_eq!(contact.push_tokens.len(), 1);
    assert!(contact.push_tokens.contains("tok-a"));
}

#[tokio::test]
async fn completed_and_deleted_tasks_leave_scope() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded(&dir.path().join("reminders.db"));
    store
        .insert_task(&Task::new("t2", "u1", "Call bank", Some(t0())))
        .unwrap();
    store.set_task_status("t1", TaskStatus::Done).unwrap();
    assert!(store.delete_task("t2").unwrap());

    let candidates = store
        .find_due_candidates(Channel::Push, t0(), Duration::days(3))
        .await
        .unwrap();
    assert!(candidates.is_empty());
    assert_eq!(
        store
            .update_reminder_state("t1", Channel::Push, None, t0())
            .await
            .unwrap(),
        UpdateOutcome::Conflict
    );
}
