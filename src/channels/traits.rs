use crate::model::DeliveryResult;
use async_trait::async_trait;
use serde::Serialize;

/// Push notification payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
}

/// One positional parameter of a WhatsApp template body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TemplateParameter {
    Text { text: String },
}

impl TemplateParameter {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text { text: value.into() }
    }
}

/// Pre-approved WhatsApp template message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateMessage {
    pub name: String,
    pub language_code: String,
    /// Ordered body parameters (`{{1}}`, `{{2}}`, ...).
    pub parameters: Vec<TemplateParameter>,
}

/// Push delivery contract. One call delivers to one device token.
#[async_trait]
pub trait PushAdapter: Send + Sync {
    /// Stable adapter identifier (e.g. `fcm`).
    fn id(&self) -> &'static str;

    /// Deliver `message` to `token`. Never errors: every failure is folded
    /// into a [`DeliveryResult`].
    async fn send(&self, token: &str, message: &PushMessage) -> DeliveryResult;
}

/// WhatsApp template delivery contract.
///
/// There is no permanent-failure signal at this boundary: template
/// rejections are reported as [`DeliveryResult::Transient`].
#[async_trait]
pub trait WhatsAppAdapter: Send + Sync {
    fn id(&self) -> &'static str;

    async fn send(&self, phone: &str, message: &TemplateMessage) -> DeliveryResult;
}
