//! Domain types shared by the policy, scan cycle, stores, and adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Notification channel a reminder can be delivered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Mobile/web push (FCM).
    Push,
    /// WhatsApp Business template message.
    #[serde(rename = "whatsapp")]
    WhatsApp,
}

impl Channel {
    /// All channels, in a stable order.
    pub const ALL: [Channel; 2] = [Channel::Push, Channel::WhatsApp];

    /// Stable channel identifier (`push`, `whatsapp`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::WhatsApp => "whatsapp",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "push" => Ok(Self::Push),
            "whatsapp" => Ok(Self::WhatsApp),
            other => Err(format!("unknown channel: {other}")),
        }
    }
}

/// Task completion status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Done,
}

impl TaskStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Done => "done",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "done" => Ok(Self::Done),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// One entry of a task's send audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentRecord {
    pub channel: Channel,
    pub at: DateTime<Utc>,
}

/// A user task as seen by the reminder engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Opaque, immutable task key.
    pub id: String,
    /// Task title, rendered into message bodies.
    pub title: String,
    pub status: TaskStatus,
    /// When set, the task is in scope for reminders.
    pub reminder_deadline: Option<DateTime<Utc>>,
    pub last_push_sent_at: Option<DateTime<Utc>>,
    pub last_whatsapp_sent_at: Option<DateTime<Utc>>,
    /// Append-only send history across all channels.
    #[serde(default)]
    pub sent_history: Vec<SentRecord>,
    /// Owning user (lookup only).
    pub user_id: String,
}

impl Task {
    /// Create a pending task with no reminder state.
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        title: impl Into<String>,
        reminder_deadline: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status: TaskStatus::Pending,
            reminder_deadline,
            last_push_sent_at: None,
            last_whatsapp_sent_at: None,
            sent_history: Vec::new(),
            user_id: user_id.into(),
        }
    }

    /// Per-channel dedup state.
    #[must_use]
    pub fn last_sent_at(&self, channel: Channel) -> Option<DateTime<Utc>> {
        match channel {
            Channel::Push => self.last_push_sent_at,
            Channel::WhatsApp => self.last_whatsapp_sent_at,
        }
    }

    pub(crate) fn set_last_sent_at(&mut self, channel: Channel, at: DateTime<Utc>) {
        match channel {
            Channel::Push => self.last_push_sent_at = Some(at),
            Channel::WhatsApp => self.last_whatsapp_sent_at = Some(at),
        }
    }
}

/// Per-channel contact addresses of a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    /// Display name used in message greetings.
    pub name: Option<String>,
    /// Registered push tokens; each is independently valid or invalid.
    pub push_tokens: BTreeSet<String>,
    /// Phone number in E.164 form.
    pub phone: Option<String>,
}

impl ContactInfo {
    /// Returns the phone number when it is present and non-blank.
    #[must_use]
    pub fn usable_phone(&self) -> Option<&str> {
        self.phone
            .as_deref()
            .map(str::trim)
            .filter(|phone| !phone.is_empty())
    }
}

/// Outcome of one delivery attempt to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    /// Accepted by the channel provider.
    Delivered,
    /// Recipient is permanently unreachable (revoked/expired push token).
    InvalidRecipient(String),
    /// Network, timeout, rate limit, or provider-side rejection; retried next cycle.
    Transient(String),
}

impl DeliveryResult {
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Counts produced by one scan cycle run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub channel: Channel,
    /// Candidates returned by the task store.
    pub scanned: usize,
    /// Candidates delivered to at least one recipient.
    pub sent: usize,
    /// Candidates whose delivery or state update failed.
    pub failed: usize,
    /// Candidates not due, or with no reachable recipient.
    pub skipped: usize,
    /// Candidates whose state was already advanced by a concurrent cycle.
    pub conflicts: usize,
}

impl CycleReport {
    #[must_use]
    pub fn empty(channel: Channel) -> Self {
        Self {
            channel,
            scanned: 0,
            sent: 0,
            failed: 0,
            skipped: 0,
            conflicts: 0,
        }
    }
}

impl std::fmt::Display for CycleReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: scanned={} sent={} failed={} skipped={} conflicts={}",
            self.channel, self.scanned, self.sent, self.failed, self.skipped, self.conflicts
        )
    }
}
