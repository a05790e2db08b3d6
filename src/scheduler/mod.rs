//! Background scheduling of scan cycles.
//!
//! Each channel gets its own [`ChannelScheduler`] with its own ticker, so a
//! slow WhatsApp cycle never delays push cycles.

pub mod runner;
pub mod service;
pub mod ticker;

pub use runner::{ChannelScheduler, CycleRunOutcome, CycleRunRecord};
pub use service::ReminderService;
pub use ticker::{DailyTicker, IntervalTicker, ManualTickHandle, ManualTicker, Ticker};
