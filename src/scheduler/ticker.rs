//! Tick sources that drive a channel scheduler.
//!
//! A ticker only says "run now"; it never decides what is due. The scheduler
//! awaits [`Ticker::tick`] between cycles, so a tick cannot overlap a cycle
//! that is still running.

use crate::config::{Cadence, MAX_DURATION_SECS};
use crate::error::{ReminderError, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Interval, MissedTickBehavior};

/// Source of scheduler ticks.
#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next tick. Returns `false` once the ticker is exhausted.
    async fn tick(&mut self) -> bool;
}

/// Build the production ticker for a configured cadence.
///
/// # Errors
///
/// Returns [`ReminderError::Config`] for a zero or oversized interval, or an
/// invalid daily time.
pub fn from_cadence(cadence: &Cadence, utc_offset_minutes: i32) -> Result<Box<dyn Ticker>> {
    match cadence {
        Cadence::Interval { secs: 0 } => Err(ReminderError::Config(
            "cadence interval must be at least 1 second".to_owned(),
        )),
        Cadence::Interval { secs } if *secs > MAX_DURATION_SECS => Err(ReminderError::Config(
            format!("cadence interval of {secs}s exceeds {MAX_DURATION_SECS}s"),
        )),
        Cadence::Interval { secs } => Ok(Box::new(IntervalTicker::new(Duration::from_secs(*secs)))),
        Cadence::Daily { hour, min } => Ok(Box::new(DailyTicker::new(
            *hour,
            *min,
            utc_offset_minutes,
        )?)),
    }
}

/// Fixed-period ticker. The first tick fires immediately.
///
/// Ticks missed while a cycle is running are dropped, not queued.
pub struct IntervalTicker {
    period: Duration,
    interval: Option<Interval>,
}

impl IntervalTicker {
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            interval: None,
        }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> bool {
        let period = self.period;
        let interval = self.interval.get_or_insert_with(|| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });
        interval.tick().await;
        true
    }
}

/// Fires once a day at `hour:min` local time in a fixed UTC offset.
#[derive(Debug, Clone)]
pub struct DailyTicker {
    hour: u32,
    min: u32,
    offset: FixedOffset,
}

impl DailyTicker {
    /// # Errors
    ///
    /// Returns [`ReminderError::Config`] when the time or offset is out of range.
    pub fn new(hour: u8, min: u8, utc_offset_minutes: i32) -> Result<Self> {
        if hour > 23 || min > 59 {
            return Err(ReminderError::Config(format!(
                "invalid daily time {hour:02}:{min:02}"
            )));
        }
        let offset = utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                ReminderError::Config(format!("invalid UTC offset: {utc_offset_minutes} minutes"))
            })?;
        Ok(Self {
            hour: u32::from(hour),
            min: u32::from(min),
            offset,
        })
    }

    /// First firing time strictly after `now`.
    #[must_use]
    pub fn next_fire_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.offset);
        let mut day = local.date_naive();
        loop {
            let candidate = day
                .and_hms_opt(self.hour, self.min, 0)
                .and_then(|naive| self.offset.from_local_datetime(&naive).single())
                .map(|at| at.with_timezone(&Utc));
            match candidate {
                Some(at) if at > now => return at,
                _ => match day.succ_opt() {
                    Some(next) => day = next,
                    None => return now + chrono::Duration::days(1),
                },
            }
        }
    }
}

#[async_trait]
impl Ticker for DailyTicker {
    async fn tick(&mut self) -> bool {
        let now = Utc::now();
        let wait = (self.next_fire_after(now) - now)
            .to_std()
            .unwrap_or_default();
        tokio::time::sleep(wait).await;
        true
    }
}

/// Test ticker fired explicitly through a [`ManualTickHandle`].
pub struct ManualTicker {
    rx: mpsc::UnboundedReceiver<oneshot::Sender<()>>,
    pending: Option<oneshot::Sender<()>>,
}

/// Fires a [`ManualTicker`]. Dropping every handle exhausts the ticker.
#[derive(Clone)]
pub struct ManualTickHandle {
    tx: mpsc::UnboundedSender<oneshot::Sender<()>>,
}

impl ManualTicker {
    /// Create a ticker and the handle that fires it.
    #[must_use]
    pub fn pair() -> (Self, ManualTickHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx, pending: None }, ManualTickHandle { tx })
    }
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) -> bool {
        // Asking for the next tick means the previous cycle has finished.
        if let Some(done) = self.pending.take() {
            let _ = done.send(());
        }
        match self.rx.recv().await {
            Some(done) => {
                self.pending = Some(done);
                true
            }
            None => false,
        }
    }
}

impl ManualTickHandle {
    /// Fire one tick and wait until the cycle it triggered has finished.
    ///
    /// Returns `false` when the scheduler exited before acknowledging.
    pub async fn tick(&self) -> bool {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(done_tx).is_err() {
            return false;
        }
        done_rx.await.is_ok()
    }

    /// Fire one tick without waiting for the cycle.
    pub fn fire(&self) -> bool {
        let (done_tx, _done_rx) = oneshot::channel();
        self.tx.send(done_tx).is_ok()
    }
}
