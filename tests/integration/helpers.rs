//! Shared helpers for integration tests: scripted adapters and store fixtures.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use reminder_engine::channels::{PushAdapter, PushMessage, TemplateMessage, WhatsAppAdapter};
use reminder_engine::model::ContactInfo;
use reminder_engine::store::MemoryStore;
use reminder_engine::{CycleDeps, DeliveryResult, ManualClock, ReminderConfig, ScanCycle, Task};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::time::Instant;

/// Fixed start instant so tests never depend on the wall clock.
pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

/// Push adapter answering per token from a script; unscripted tokens are delivered.
#[derive(Default)]
pub(crate) struct ScriptedPush {
    results: Mutex<HashMap<String, DeliveryResult>>,
    calls: Mutex<Vec<(String, PushMessage)>>,
}

impl ScriptedPush {
    pub(crate) fn respond(&self, token: &str, result: DeliveryResult) {
        self.results
            .lock()
            .unwrap()
            .insert(token.to_owned(), result);
    }

    pub(crate) fn calls(&self) -> Vec<(String, PushMessage)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn sent_to(&self) -> Vec<String> {
        self.calls().into_iter().map(|(token, _)| token).collect()
    }
}

#[async_trait]
impl PushAdapter for ScriptedPush {
    fn id(&self) -> &'static str {
        "scripted"
    }

    async fn send(&self, token: &str, message: &PushMessage) -> DeliveryResult {
        // Suspend once so concurrent cycles interleave like real network calls.
        tokio::task::yield_now().await;
        self.calls
            .lock()
            .unwrap()
            .push((token.to_owned(), message.clone()));
        self.results
            .lock()
            .unwrap()
            .get(token)
            .cloned()
            .unwrap_or(DeliveryResult::Delivered)
    }
}

/// Push adapter that holds every send for `delay` and tracks overlap.
pub(crate) struct SlowPush {
    delay: std::time::Duration,
    result: DeliveryResult,
    started: Notify,
    active: AtomicUsize,
    max_active: AtomicUsize,
    starts: Mutex<Vec<Instant>>,
}

impl SlowPush {
    pub(crate) fn new(delay: std::time::Duration, result: DeliveryResult) -> Self {
        Self {
            delay,
            result,
            started: Notify::new(),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            starts: Mutex::new(Vec::new()),
        }
    }

    /// Resolves once a send has begun.
    pub(crate) async fn wait_started(&self) {
        self.started.notified().await;
    }

    pub(crate) fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub(crate) fn starts(&self) -> Vec<Instant> {
        self.starts.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushAdapter for SlowPush {
    fn id(&self) -> &'static str {
        "slow"
    }

    async fn send(&self, _token: &str, _message: &PushMessage) -> DeliveryResult {
        self.starts.lock().unwrap().push(Instant::now());
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        self.started.notify_one();
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// WhatsApp adapter answering per phone from a script.
#[derive(Default)]
pub(crate) struct ScriptedWhatsApp {
    results: Mutex<HashMap<String, DeliveryResult>>,
    calls: Mutex<Vec<(String, TemplateMessage)>>,
}

impl ScriptedWhatsApp {
    pub(crate) fn respond(&self, phone: &str, result: DeliveryResult) {
        self.results
            .lock()
            .unwrap()
            .insert(phone.to_owned(), result);
    }

    pub(crate) fn calls(&self) -> Vec<(String, TemplateMessage)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WhatsAppAdapter for ScriptedWhatsApp {
    fn id(&self) -> &'static str {
        "scripted"
    }

    async fn send(&self, phone: &str, message: &TemplateMessage) -> DeliveryResult {
        self.calls
            .lock()
            .unwrap()
            .push((phone.to_owned(), message.clone()));
        self.results
            .lock()
            .unwrap()
            .get(phone)
            .cloned()
            .unwrap_or(DeliveryResult::Delivered)
    }
}

/// In-memory engine with scripted adapters and a manual clock at [`t0`].
pub(crate) struct Harness {
    pub store: Arc<MemoryStore>,
    pub push: Arc<ScriptedPush>,
    pub whatsapp: Arc<ScriptedWhatsApp>,
    pub clock: ManualClock,
    pub cycle: Arc<ScanCycle>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with_config(&test_config())
    }

    pub(crate) fn with_config(config: &ReminderConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let push = Arc::new(ScriptedPush::default());
        let whatsapp = Arc::new(ScriptedWhatsApp::default());
        let clock = ManualClock::new(t0());
        let cycle = Arc::new(ScanCycle::new(config, deps(&store, &push, &whatsapp, &clock)));
        Self {
            store,
            push,
            whatsapp,
            clock,
            cycle,
        }
    }

    pub(crate) fn deps(&self) -> CycleDeps {
        deps(&self.store, &self.push, &self.whatsapp, &self.clock)
    }

    /// A cycle over this harness's store and clock with a different push adapter.
    pub(crate) fn cycle_with_push(&self, push: Arc<dyn PushAdapter>) -> Arc<ScanCycle> {
        let mut deps = self.deps();
        deps.push = push;
        Arc::new(ScanCycle::new(&test_config(), deps))
    }

    /// Add a user with the given push tokens and phone.
    pub(crate) fn user(&self, user_id: &str, tokens: &[&str], phone: Option<&str>) {
        self.store
            .upsert_user(
                user_id,
                ContactInfo {
                    name: Some(format!("User {user_id}")),
                    push_tokens: tokens.iter().map(|t| (*t).to_owned()).collect(),
                    phone: phone.map(str::to_owned),
                },
            )
            .unwrap();
    }

    /// Add a pending task due `due_in` from [`t0`].
    pub(crate) fn task(&self, task_id: &str, user_id: &str, due_in: Duration) {
        self.store
            .insert_task(Task::new(task_id, user_id, format!("Task {task_id}"), Some(t0() + due_in)))
            .unwrap();
    }

    pub(crate) fn stored(&self, task_id: &str) -> Task {
        self.store.task(task_id).unwrap().expect("task exists")
    }
}

fn deps(
    store: &Arc<MemoryStore>,
    push: &Arc<ScriptedPush>,
    whatsapp: &Arc<ScriptedWhatsApp>,
    clock: &ManualClock,
) -> CycleDeps {
    CycleDeps {
        tasks: store.clone(),
        users: store.clone(),
        push: push.clone(),
        whatsapp: whatsapp.clone(),
        clock: Arc::new(clock.clone()),
    }
}

/// Default policy (3 day lead, 5 min push / 6 h WhatsApp cooldown), no rate limit.
pub(crate) fn test_config() -> ReminderConfig {
    let mut config = ReminderConfig::default();
    config.push.max_sends_per_minute = 0;
    config.whatsapp.max_sends_per_minute = 0;
    config
}
