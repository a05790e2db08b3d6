//! In-memory implementation of [`TaskStore`] and [`UserStore`].
//!
//! Used by tests and local runs without a database file. A single mutex
//! guards all state, so the compare-and-swap update is trivially atomic.

use super::{StoreError, TaskStore, UpdateOutcome, UserStore, can_advance};
use crate::model::{Channel, ContactInfo, SentRecord, Task, TaskStatus};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
struct State {
    tasks: HashMap<String, Task>,
    users: HashMap<String, ContactInfo>,
}

/// An in-memory task and user store.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unreachable backend: every call fails with
    /// [`StoreError::Unavailable`] while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_owned()));
        }
        self.state
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }

    /// Insert a new task. An existing id is rejected, so seeding can never
    /// rewind a task's dedup state.
    pub fn insert_task(&self, task: Task) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.tasks.contains_key(&task.id) {
            return Err(StoreError::AlreadyExists(task.id));
        }
        state.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    /// Fetch a task snapshot by id.
    pub fn task(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
        Ok(self.lock()?.tasks.get(task_id).cloned())
    }

    /// Mark a task pending or done.
    pub fn set_task_status(&self, task_id: &str, status: TaskStatus) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let task = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.to_owned()))?;
        task.status = status;
        Ok(())
    }

    /// Remove a task entirely.
    pub fn delete_task(&self, task_id: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.tasks.remove(task_id).is_some())
    }

    /// Insert or replace a user's contact info.
    pub fn upsert_user(&self, user_id: &str, contact: ContactInfo) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.users.insert(user_id.to_owned(), contact);
        Ok(())
    }

    /// Register a push token for a user. Registering an existing token is a no-op.
    pub fn register_push_token(&self, user_id: &str, token: &str) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state
            .users
            .values()
            .any(|contact| contact.push_tokens.contains(token))
        {
            return Ok(());
        }
        state
            .users
            .entry(user_id.to_owned())
            .or_default()
            .push_tokens
            .insert(token.to_owned());
        Ok(())
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn find_due_candidates(
        &self,
        _channel: Channel,
        now: DateTime<Utc>,
        lead_time: Duration,
    ) -> Result<Vec<Task>, StoreError> {
        let horizon = now
            .checked_add_signed(lead_time)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let state = self.lock()?;
        let mut candidates: Vec<Task> = state
            .tasks
            .values()
            .filter(|task| task.status == TaskStatus::Pending)
            .filter(|task| task.reminder_deadline.is_some_and(|deadline| deadline <= horizon))
            .cloned()
            .collect();
        candidates.sort_by(|a, b| a.reminder_deadline.cmp(&b.reminder_deadline));
        Ok(candidates)
    }

    async fn update_reminder_state(
        &self,
        task_id: &str,
        channel: Channel,
        expected: Option<DateTime<Utc>>,
        sent_at: DateTime<Utc>,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut state = self.lock()?;
        let Some(task) = state.tasks.get_mut(task_id) else {
            return Ok(UpdateOutcome::Conflict);
        };
        if task.status != TaskStatus::Pending
            || !can_advance(task.last_sent_at(channel), expected, sent_at)
        {
            return Ok(UpdateOutcome::Conflict);
        }
        task.set_last_sent_at(channel, sent_at);
        task.sent_history.push(SentRecord {
            channel,
            at: sent_at,
        });
        Ok(UpdateOutcome::Applied)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn contact_info(&self, user_id: &str) -> Result<Option<ContactInfo>, StoreError> {
        Ok(self.lock()?.users.get(user_id).cloned())
    }

    async fn remove_push_token(&self, user_id: &str, token: &str) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        Ok(state
            .users
            .get_mut(user_id)
            .is_some_and(|contact| contact.push_tokens.remove(token)))
    }
}
