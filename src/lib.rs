//! Reminder engine: deadline reminders over push and WhatsApp.
//!
//! On a fixed cadence per channel, the engine scans pending tasks with a
//! reminder deadline, decides which reminders are due, dispatches them, and
//! records each send with a compare-and-swap write so a reminder is never
//! repeated inside its channel's cooldown.
//!
//! # Architecture
//!
//! - **Policy** ([`policy`]): pure due-check from deadline, lead time, and cooldown
//! - **Scan cycle** ([`cycle`]): candidate query, dispatch, dedup write
//! - **Scheduler** ([`scheduler`]): one ticker-driven loop per channel
//! - **Channels** ([`channels`]): FCM push and WhatsApp Cloud template adapters
//! - **Stores** ([`store`]): task/user contracts with in-memory and SQLite backends

pub mod channels;
pub mod clock;
pub mod config;
pub mod cycle;
pub mod error;
pub mod messages;
pub mod model;
pub mod policy;
pub mod scheduler;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ReminderConfig;
pub use cycle::{CycleDeps, ScanCycle};
pub use error::{ReminderError, Result};
pub use model::{Channel, CycleReport, DeliveryResult, Task, TaskStatus};
pub use policy::ReminderPolicy;
pub use scheduler::{ChannelScheduler, ReminderService};
