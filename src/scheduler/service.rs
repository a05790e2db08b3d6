//! Composition root: one scheduler per enabled channel.

use crate::config::ReminderConfig;
use crate::cycle::{CycleDeps, ScanCycle};
use crate::error::Result;
use crate::model::{Channel, CycleReport};
use crate::scheduler::runner::{ChannelScheduler, CycleRunRecord};
use crate::scheduler::ticker;
use futures_util::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

/// All channel schedulers of a running engine.
pub struct ReminderService {
    cycle: Arc<ScanCycle>,
    schedulers: Vec<ChannelScheduler>,
}

impl ReminderService {
    /// Build a scheduler for every enabled channel, ticking at its configured
    /// cadence.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ReminderError::Config`] when a channel cadence cannot
    /// be turned into a ticker.
    pub fn from_config(config: &ReminderConfig, deps: CycleDeps) -> Result<Self> {
        let cycle = Arc::new(ScanCycle::new(config, deps));
        let mut schedulers = Vec::new();
        for channel in Channel::ALL {
            if !config.channel_enabled(channel) {
                info!(channel = %channel, "channel disabled");
                continue;
            }
            let ticker = ticker::from_cadence(
                config.cadence(channel),
                config.whatsapp.utc_offset_minutes,
            )?;
            info!(channel = %channel, cadence = %config.cadence(channel), "channel scheduled");
            schedulers.push(ChannelScheduler::new(channel, Arc::clone(&cycle), ticker));
        }
        Ok(Self { cycle, schedulers })
    }

    /// Channels with a scheduler, in start order.
    #[must_use]
    pub fn channels(&self) -> Vec<Channel> {
        self.schedulers.iter().map(ChannelScheduler::channel).collect()
    }

    /// Run one cycle for `channel` outside the schedule.
    ///
    /// # Errors
    ///
    /// Propagates cycle-fatal store errors.
    pub async fn run_once(&self, channel: Channel) -> Result<CycleReport> {
        self.cycle.run_once(channel).await
    }

    /// Start every scheduler. Either all of them run afterwards or none do.
    ///
    /// # Errors
    ///
    /// Fails if any scheduler is already running or was stopped. Schedulers
    /// started before the failure are stopped again.
    pub async fn start(&mut self) -> Result<()> {
        for index in 0..self.schedulers.len() {
            if let Err(e) = self.schedulers[index].start() {
                warn!(
                    channel = %self.schedulers[index].channel(),
                    "scheduler failed to start, stopping the others: {e}"
                );
                self.stop().await;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Stop every scheduler, waiting for in-flight cycles.
    pub async fn stop(&mut self) {
        join_all(self.schedulers.iter_mut().map(|scheduler| scheduler.stop())).await;
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.schedulers.iter().any(ChannelScheduler::is_running)
    }

    /// Run history of `channel`'s scheduler; empty if the channel is disabled.
    #[must_use]
    pub fn history(&self, channel: Channel) -> Vec<CycleRunRecord> {
        self.schedulers
            .iter()
            .find(|s| s.channel() == channel)
            .map(ChannelScheduler::history)
            .unwrap_or_default()
    }
}
