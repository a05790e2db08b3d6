//! Per-channel scheduler loop.
//!
//! Spawns a tokio task that waits on its ticker and runs one scan cycle per
//! tick. Cycles of one channel never overlap; channels never share a loop.

use crate::cycle::ScanCycle;
use crate::error::{ReminderError, Result};
use crate::model::{Channel, CycleReport};
use crate::scheduler::ticker::Ticker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Number of run-history entries to keep.
pub const DEFAULT_HISTORY_LIMIT: usize = 200;

/// How a scheduled cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleRunOutcome {
    Success,
    /// The cycle could not reach the task store.
    Failed,
}

/// One entry of a scheduler's run history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleRunRecord {
    pub run_id: String,
    pub channel: Channel,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: CycleRunOutcome,
    pub summary: String,
    #[serde(default)]
    pub report: Option<CycleReport>,
}

type History = Arc<Mutex<VecDeque<CycleRunRecord>>>;

/// Drives one channel's scan cycle from a [`Ticker`].
pub struct ChannelScheduler {
    channel: Channel,
    cycle: Arc<ScanCycle>,
    ticker: Option<Box<dyn Ticker>>,
    history: History,
    max_history_entries: usize,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ChannelScheduler {
    pub fn new(channel: Channel, cycle: Arc<ScanCycle>, ticker: Box<dyn Ticker>) -> Self {
        Self {
            channel,
            cycle,
            ticker: Some(ticker),
            history: Arc::new(Mutex::new(VecDeque::new())),
            max_history_entries: DEFAULT_HISTORY_LIMIT,
            cancel: CancellationToken::new(),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Override the in-memory run-history limit.
    #[must_use]
    pub fn with_history_limit(mut self, max_entries: usize) -> Self {
        self.max_history_entries = max_entries.max(1);
        self
    }

    #[must_use]
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Start the background loop.
    ///
    /// # Errors
    ///
    /// Returns [`ReminderError::Scheduler`] if the scheduler is already
    /// running or has been stopped. A stopped scheduler cannot be restarted.
    pub fn start(&mut self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ReminderError::Scheduler(format!(
                "{} scheduler was stopped and cannot be restarted",
                self.channel
            )));
        }
        let Some(mut ticker) = self.ticker.take() else {
            return Err(ReminderError::Scheduler(format!(
                "{} scheduler is already running",
                self.channel
            )));
        };

        let channel = self.channel;
        let cycle = Arc::clone(&self.cycle);
        let history = Arc::clone(&self.history);
        let max_history_entries = self.max_history_entries;
        let cancel = self.cancel.clone();
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);

        self.handle = Some(tokio::spawn(async move {
            info!(channel = %channel, "scheduler started");
            loop {
                let ticked = tokio::select! {
                    biased;
                    () = cancel.cancelled() => false,
                    ticked = ticker.tick() => ticked,
                };
                if !ticked || cancel.is_cancelled() {
                    break;
                }

                let record = run_cycle(&cycle, channel, &cancel).await;
                push_history(&history, record, max_history_entries);
            }
            running.store(false, Ordering::SeqCst);
            info!(channel = %channel, "scheduler stopped");
        }));
        Ok(())
    }

    /// Stop the loop. An in-flight cycle finishes its started dispatches
    /// first; no new cycle starts after this is called.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        self.ticker = None;
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            warn!(channel = %self.channel, "scheduler task ended abnormally: {e}");
        }
        self.running.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Recent cycle runs, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<CycleRunRecord> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

async fn run_cycle(
    cycle: &ScanCycle,
    channel: Channel,
    cancel: &CancellationToken,
) -> CycleRunRecord {
    let run_id = uuid::Uuid::new_v4().to_string();
    let started_at = cycle.now();
    let result = cycle.run_cancellable(channel, cancel).await;
    let finished_at = cycle.now();

    match result {
        Ok(report) => CycleRunRecord {
            run_id,
            channel,
            started_at,
            finished_at,
            outcome: CycleRunOutcome::Success,
            summary: report.to_string(),
            report: Some(report),
        },
        Err(e) => {
            error!(channel = %channel, run_id = %run_id, "scan cycle failed: {e}");
            CycleRunRecord {
                run_id,
                channel,
                started_at,
                finished_at,
                outcome: CycleRunOutcome::Failed,
                summary: e.to_string(),
                report: None,
            }
        }
    }
}

fn push_history(history: &History, record: CycleRunRecord, max_entries: usize) {
    let mut history = history.lock().unwrap_or_else(|e| e.into_inner());
    history.push_back(record);
    while history.len() > max_entries {
        history.pop_front();
    }
}
