//! Scan cycle: one pass over the due candidates of a single channel.
//!
//! Each run fetches candidates from the task store, re-checks them against the
//! reminder policy, dispatches through the channel adapter, and records the
//! send with a compare-and-swap write. Candidates are processed independently
//! with bounded concurrency; only a failed candidate query fails the run.

use crate::channels::{PushAdapter, RateLimiter, WhatsAppAdapter};
use crate::clock::Clock;
use crate::config::{
    MAX_DURATION_SECS, PushChannelConfig, ReminderConfig, WhatsAppChannelConfig,
};
use crate::error::Result;
use crate::messages;
use crate::model::{Channel, ContactInfo, CycleReport, DeliveryResult, Task};
use crate::policy::ReminderPolicy;
use crate::store::{TaskStore, UpdateOutcome, UserStore};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use futures_util::future::join_all;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Collaborators injected into the engine.
#[derive(Clone)]
pub struct CycleDeps {
    pub tasks: Arc<dyn TaskStore>,
    pub users: Arc<dyn UserStore>,
    pub push: Arc<dyn PushAdapter>,
    pub whatsapp: Arc<dyn WhatsAppAdapter>,
    pub clock: Arc<dyn Clock>,
}

/// Per-candidate result, folded into a [`CycleReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CandidateOutcome {
    Sent,
    Failed,
    Skipped,
    Conflict,
}

/// Runs scan cycles for every channel against shared stores and adapters.
pub struct ScanCycle {
    deps: CycleDeps,
    policy: ReminderPolicy,
    push_config: PushChannelConfig,
    whatsapp_config: WhatsAppChannelConfig,
    max_concurrency: usize,
    dispatch_timeout: Duration,
    push_limiter: Mutex<RateLimiter>,
    whatsapp_limiter: Mutex<RateLimiter>,
}

impl ScanCycle {
    #[must_use]
    pub fn new(config: &ReminderConfig, deps: CycleDeps) -> Self {
        Self {
            deps,
            policy: ReminderPolicy::from_config(config),
            push_config: config.push.clone(),
            whatsapp_config: config.whatsapp.clone(),
            max_concurrency: config.scan.max_concurrency.max(1),
            dispatch_timeout: Duration::from_secs(
                config.scan.dispatch_timeout_secs.clamp(1, MAX_DURATION_SECS),
            ),
            push_limiter: Mutex::new(RateLimiter::new(
                config.max_sends_per_minute(Channel::Push),
            )),
            whatsapp_limiter: Mutex::new(RateLimiter::new(
                config.max_sends_per_minute(Channel::WhatsApp),
            )),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &ReminderPolicy {
        &self.policy
    }

    /// Current time according to the injected clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.deps.clock.now()
    }

    /// Run one full cycle for `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ReminderError::Store`] when the candidate query fails.
    /// Per-candidate failures are counted in the report, never returned.
    pub async fn run_once(&self, channel: Channel) -> Result<CycleReport> {
        self.run_cancellable(channel, &CancellationToken::new()).await
    }

    /// Like [`run_once`](Self::run_once), but stops issuing new dispatches
    /// once `cancel` fires. Dispatches already in flight run to completion.
    pub(crate) async fn run_cancellable(
        &self,
        channel: Channel,
        cancel: &CancellationToken,
    ) -> Result<CycleReport> {
        let now = self.now();
        let candidates = self
            .deps
            .tasks
            .find_due_candidates(channel, now, self.policy.lead_time())
            .await?;

        let mut report = CycleReport::empty(channel);
        report.scanned = candidates.len();

        let outcomes: Vec<CandidateOutcome> = futures_util::stream::iter(candidates)
            .map(|task| self.process_candidate(channel, task, now, cancel))
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                CandidateOutcome::Sent => report.sent += 1,
                CandidateOutcome::Failed => report.failed += 1,
                CandidateOutcome::Skipped => report.skipped += 1,
                CandidateOutcome::Conflict => report.conflicts += 1,
            }
        }

        info!(
            channel = %channel,
            scanned = report.scanned,
            sent = report.sent,
            failed = report.failed,
            skipped = report.skipped,
            conflicts = report.conflicts,
            "scan cycle finished"
        );
        Ok(report)
    }

    async fn process_candidate(
        &self,
        channel: Channel,
        task: Task,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> CandidateOutcome {
        let Some(deadline) = task.reminder_deadline else {
            return CandidateOutcome::Skipped;
        };
        let expected = task.last_sent_at(channel);
        if !self.policy.is_due(channel, now, deadline, expected) {
            debug!(channel = %channel, task_id = %task.id, "reminder not due");
            return CandidateOutcome::Skipped;
        }

        let contact = match self.deps.users.contact_info(&task.user_id).await {
            Ok(Some(contact)) => contact,
            Ok(None) => {
                debug!(channel = %channel, task_id = %task.id, user_id = %task.user_id, "owner not found");
                return CandidateOutcome::Skipped;
            }
            Err(e) => {
                warn!(channel = %channel, task_id = %task.id, user_id = %task.user_id, "contact lookup failed: {e}");
                return CandidateOutcome::Failed;
            }
        };

        if cancel.is_cancelled() {
            debug!(channel = %channel, task_id = %task.id, "cycle cancelled before dispatch");
            return CandidateOutcome::Skipped;
        }

        let dispatched = match channel {
            Channel::Push => self.dispatch_push(&task, &contact).await,
            Channel::WhatsApp => self.dispatch_whatsapp(&task, &contact).await,
        };
        let Some(delivered) = dispatched else {
            return CandidateOutcome::Skipped;
        };
        if !delivered {
            return CandidateOutcome::Failed;
        }

        let sent_at = self.now();
        match self
            .deps
            .tasks
            .update_reminder_state(&task.id, channel, expected, sent_at)
            .await
        {
            Ok(UpdateOutcome::Applied) => CandidateOutcome::Sent,
            Ok(UpdateOutcome::Conflict) => {
                debug!(channel = %channel, task_id = %task.id, "reminder state already advanced");
                CandidateOutcome::Conflict
            }
            Err(e) => {
                warn!(channel = %channel, task_id = %task.id, "cannot record reminder send: {e}");
                CandidateOutcome::Failed
            }
        }
    }

    /// Fan out to every registered token. `None` when there is nobody to
    /// notify, otherwise whether at least one token accepted the message.
    async fn dispatch_push(&self, task: &Task, contact: &ContactInfo) -> Option<bool> {
        if contact.push_tokens.is_empty() {
            debug!(channel = "push", task_id = %task.id, user_id = %task.user_id, "no push tokens");
            return None;
        }

        let message = messages::push_message(&self.push_config, task);
        let sends = contact.push_tokens.iter().map(|token| {
            let message = &message;
            async move {
                let result = self
                    .deliver(&self.push_limiter, self.deps.push.send(token, message))
                    .await;
                (token, result)
            }
        });

        let mut delivered = false;
        for (token, result) in join_all(sends).await {
            match result {
                DeliveryResult::Delivered => delivered = true,
                DeliveryResult::InvalidRecipient(reason) => {
                    warn!(channel = "push", task_id = %task.id, user_id = %task.user_id, "dropping invalid push token: {reason}");
                    if let Err(e) = self.deps.users.remove_push_token(&task.user_id, token).await {
                        warn!(channel = "push", user_id = %task.user_id, "cannot remove invalid push token: {e}");
                    }
                }
                DeliveryResult::Transient(reason) => {
                    warn!(channel = "push", task_id = %task.id, user_id = %task.user_id, "push delivery failed: {reason}");
                }
            }
        }
        Some(delivered)
    }

    async fn dispatch_whatsapp(&self, task: &Task, contact: &ContactInfo) -> Option<bool> {
        let Some(phone) = contact.usable_phone() else {
            debug!(channel = "whatsapp", task_id = %task.id, user_id = %task.user_id, "no phone number");
            return None;
        };

        let message = messages::whatsapp_message(&self.whatsapp_config, task, contact);
        match self
            .deliver(
                &self.whatsapp_limiter,
                self.deps.whatsapp.send(phone, &message),
            )
            .await
        {
            DeliveryResult::Delivered => Some(true),
            DeliveryResult::InvalidRecipient(reason) | DeliveryResult::Transient(reason) => {
                warn!(channel = "whatsapp", task_id = %task.id, user_id = %task.user_id, "whatsapp delivery failed: {reason}");
                Some(false)
            }
        }
    }

    /// Apply the rate limit and dispatch timeout around one adapter call.
    async fn deliver(
        &self,
        limiter: &Mutex<RateLimiter>,
        send: impl Future<Output = DeliveryResult>,
    ) -> DeliveryResult {
        let admitted = limiter
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .try_send();
        if let Err(e) = admitted {
            return DeliveryResult::Transient(e.to_string());
        }
        match tokio::time::timeout(self.dispatch_timeout, send).await {
            Ok(result) => result,
            Err(_) => DeliveryResult::Transient(format!(
                "dispatch timed out after {}s",
                self.dispatch_timeout.as_secs()
            )),
        }
    }
}
