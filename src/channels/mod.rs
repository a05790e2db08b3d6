//! Outbound delivery channels (FCM push, WhatsApp Cloud templates).
//!
//! Adapters are thin: they turn one delivery request into one HTTP call and
//! fold every failure into a [`DeliveryResult`](crate::model::DeliveryResult).
//! Policy, dedup, and recipient bookkeeping live in the scan cycle.

pub mod push;
pub mod rate_limit;
pub mod traits;
pub mod whatsapp;

pub use push::FcmPushAdapter;
pub use rate_limit::{RateLimitError, RateLimiter};
pub use traits::{PushAdapter, PushMessage, TemplateMessage, TemplateParameter, WhatsAppAdapter};
pub use whatsapp::CloudWhatsAppAdapter;
