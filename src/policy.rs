//! Reminder window policy.
//!
//! Pure decision logic: given a deadline, the current time, and the last time
//! a channel delivered for a task, decide whether a reminder is due. Works on
//! absolute UTC timestamps only; local-time cadence belongs to the tickers.

use crate::config::{MAX_DURATION_SECS, ReminderConfig};
use crate::model::Channel;
use chrono::{DateTime, Duration, Utc};

/// Default lead time: the window opens three days before the deadline.
pub const DEFAULT_LEAD_TIME_SECS: u64 = 3 * 24 * 3600;

/// Lead time plus per-channel cooldowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderPolicy {
    lead_time: Duration,
    push_cooldown: Duration,
    whatsapp_cooldown: Duration,
}

impl ReminderPolicy {
    pub fn new(lead_time: Duration, push_cooldown: Duration, whatsapp_cooldown: Duration) -> Self {
        Self {
            lead_time,
            push_cooldown,
            whatsapp_cooldown,
        }
    }

    /// Build the policy from the configured lead time and channel cooldowns.
    #[must_use]
    pub fn from_config(config: &ReminderConfig) -> Self {
        Self::new(
            secs(config.policy.lead_time_secs),
            secs(config.push.cooldown_secs),
            secs(config.whatsapp.cooldown_secs),
        )
    }

    #[must_use]
    pub fn lead_time(&self) -> Duration {
        self.lead_time
    }

    #[must_use]
    pub fn cooldown(&self, channel: Channel) -> Duration {
        match channel {
            Channel::Push => self.push_cooldown,
            Channel::WhatsApp => self.whatsapp_cooldown,
        }
    }

    /// Instant at which the reminder window for `deadline` opens.
    #[must_use]
    pub fn window_opens_at(&self, deadline: DateTime<Utc>) -> DateTime<Utc> {
        deadline
            .checked_sub_signed(self.lead_time)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Returns `true` when a reminder for `channel` should be sent at `now`.
    ///
    /// The window has no upper bound: an overdue task that is still pending
    /// keeps being reminded at the channel's cooldown.
    #[must_use]
    pub fn is_due(
        &self,
        channel: Channel,
        now: DateTime<Utc>,
        deadline: DateTime<Utc>,
        last_sent_at: Option<DateTime<Utc>>,
    ) -> bool {
        if now < self.window_opens_at(deadline) {
            return false;
        }
        match last_sent_at {
            None => true,
            Some(last) => now - last >= self.cooldown(channel),
        }
    }
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self::from_config(&ReminderConfig::default())
    }
}

/// Config seconds as a `Duration`, saturating at [`MAX_DURATION_SECS`].
fn secs(value: u64) -> Duration {
    let clamped = i64::try_from(value.min(MAX_DURATION_SECS)).unwrap_or(i64::MAX);
    Duration::try_seconds(clamped).unwrap_or(Duration::MAX)
}
