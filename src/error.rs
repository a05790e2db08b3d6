//! Error types for the reminder engine.

use crate::store::StoreError;

/// Top-level error type for the reminder engine.
#[derive(Debug, thiserror::Error)]
pub enum ReminderError {
    /// Task or user store failure (unreachable, corrupt, lock poisoned).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Channel adapter construction or transport setup error.
    #[error("channel error: {0}")]
    Channel(String),

    /// Scheduler lifecycle error.
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ReminderError>;
