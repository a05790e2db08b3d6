//! Rate limiting for outbound channel messages.
//!
//! Each channel's scan cycle owns one limiter. A send refused by the limiter
//! is a transient failure: the candidate stays untouched and is picked up
//! again on the next tick.

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use thiserror::Error;

const WINDOW: Duration = Duration::from_secs(60);

/// Rate limiting error.
#[derive(Debug, Clone, Error)]
pub enum RateLimitError {
    /// Rate limit exceeded; must wait before sending.
    #[error("rate limit exceeded; retry after {retry_after_secs}s")]
    Exceeded {
        /// Seconds to wait before retry.
        retry_after_secs: u64,
    },
}

/// Per-channel rate limiter using a sliding one-minute window.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Maximum messages allowed per minute; `0` disables limiting.
    max_messages_per_minute: u32,
    /// Sliding window of message timestamps.
    window: VecDeque<Instant>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given per-minute limit.
    #[must_use]
    pub fn new(max_messages_per_minute: u32) -> Self {
        Self {
            max_messages_per_minute,
            window: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        self.max_messages_per_minute == 0
    }

    /// Try to send a message, returning an error if rate limit is exceeded.
    ///
    /// On success, records the send timestamp.
    pub fn try_send(&mut self) -> Result<(), RateLimitError> {
        self.try_send_at(Instant::now())
    }

    fn try_send_at(&mut self, now: Instant) -> Result<(), RateLimitError> {
        if self.is_unlimited() {
            return Ok(());
        }

        while let Some(&first) = self.window.front() {
            if now.duration_since(first) >= WINDOW {
                self.window.pop_front();
            } else {
                break;
            }
        }

        if self.window.len() >= self.max_messages_per_minute as usize
            && let Some(&oldest) = self.window.front()
        {
            let remaining = WINDOW.saturating_sub(now.duration_since(oldest));
            let retry_after_secs = remaining.as_secs().saturating_add(1);
            return Err(RateLimitError::Exceeded { retry_after_secs });
        }

        self.window.push_back(now);
        Ok(())
    }

    /// Get the number of messages remaining in the current window.
    #[must_use]
    pub fn remaining(&self) -> Option<u32> {
        if self.is_unlimited() {
            return None;
        }
        Some(
            self.max_messages_per_minute
                .saturating_sub(u32::try_from(self.window.len()).unwrap_or(u32::MAX)),
        )
    }
}
