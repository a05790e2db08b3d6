//! Task and user store contracts.
//!
//! The engine only needs two things from persistence: a filtered candidate
//! query and one compare-and-swap write of a task's per-channel dedup state.
//! Contact lookup and stale-token removal come from the user store.

pub mod memory;
mod schema;
pub mod sqlite;

use crate::model::{Channel, ContactInfo, Task};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Store error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("record already exists: {0}")]
    AlreadyExists(String),

    #[error("lock poisoned: {0}")]
    Lock(String),

    #[error("encoding error: {0}")]
    Encoding(String),
}

/// Result of a conditional dedup-state update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The timestamp was advanced and the send appended to the history.
    Applied,
    /// Another writer moved the state first, or the task left scope.
    Conflict,
}

/// Task persistence as seen by the scan cycle.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Pending tasks with a deadline no later than `now + lead_time`.
    ///
    /// Tasks without a deadline never appear. The query deliberately ignores
    /// per-channel cooldowns; the caller re-checks each candidate.
    async fn find_due_candidates(
        &self,
        channel: Channel,
        now: DateTime<Utc>,
        lead_time: Duration,
    ) -> Result<Vec<Task>, StoreError>;

    /// Set `channel`'s last-sent timestamp to `sent_at` if it still equals
    /// `expected`, and append the send to the task history.
    ///
    /// Never moves the timestamp backwards. Returns [`UpdateOutcome::Conflict`]
    /// when the stored value differs from `expected` or the task is no longer
    /// pending.
    async fn update_reminder_state(
        &self,
        task_id: &str,
        channel: Channel,
        expected: Option<DateTime<Utc>>,
        sent_at: DateTime<Utc>,
    ) -> Result<UpdateOutcome, StoreError>;
}

/// User contact lookup.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Contact addresses for `user_id`; `None` when the user does not exist.
    async fn contact_info(&self, user_id: &str) -> Result<Option<ContactInfo>, StoreError>;

    /// Drop a push token the provider reported as permanently invalid.
    /// Returns `true` when a token was removed.
    async fn remove_push_token(&self, user_id: &str, token: &str) -> Result<bool, StoreError>;
}

/// Shared CAS rule used by every store implementation.
pub(crate) fn can_advance(
    current: Option<DateTime<Utc>>,
    expected: Option<DateTime<Utc>>,
    sent_at: DateTime<Utc>,
) -> bool {
    current == expected && current.is_none_or(|previous| sent_at >= previous)
}
