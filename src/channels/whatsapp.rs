use crate::channels::traits::{TemplateMessage, WhatsAppAdapter};
use crate::config::WhatsAppChannelConfig;
use crate::error::{ReminderError, Result};
use crate::model::DeliveryResult;
use async_trait::async_trait;

/// WhatsApp Business Cloud API adapter for template messages.
#[derive(Clone)]
pub struct CloudWhatsAppAdapter {
    access_token: String,
    phone_number_id: String,
    api_base: String,
    api_version: String,
    client: reqwest::Client,
}

impl CloudWhatsAppAdapter {
    pub fn new(config: &WhatsAppChannelConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(
                config.request_timeout_secs.max(1),
            ))
            .build()
            .map_err(|e| ReminderError::Channel(format!("cannot build WhatsApp client: {e}")))?;
        Ok(Self {
            access_token: config.access_token.clone(),
            phone_number_id: config.phone_number_id.clone(),
            api_base: config.api_base.trim_end_matches('/').to_owned(),
            api_version: config.api_version.clone(),
            client,
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/{}/{}/messages",
            self.api_base, self.api_version, self.phone_number_id
        )
    }
}

/// Build the Cloud API request body for a template message.
#[must_use]
pub fn template_payload(to: &str, message: &TemplateMessage) -> serde_json::Value {
    let to = to.strip_prefix('+').unwrap_or(to);
    let mut template = serde_json::json!({
        "name": message.name,
        "language": { "code": message.language_code }
    });
    if !message.parameters.is_empty() {
        template["components"] = serde_json::json!([{
            "type": "body",
            "parameters": message.parameters
        }]);
    }
    serde_json::json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "template",
        "template": template
    })
}

#[async_trait]
impl WhatsAppAdapter for CloudWhatsAppAdapter {
    fn id(&self) -> &'static str {
        "whatsapp"
    }

    async fn send(&self, phone: &str, message: &TemplateMessage) -> DeliveryResult {
        if self.access_token.trim().is_empty() {
            return DeliveryResult::Transient("whatsapp access token is empty".to_owned());
        }
        if self.phone_number_id.trim().is_empty() {
            return DeliveryResult::Transient("whatsapp phone_number_id is empty".to_owned());
        }

        let body = template_payload(phone, message);
        let response = match self
            .client
            .post(self.messages_url())
            .header("Authorization", format!("Bearer {}", self.access_token))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return DeliveryResult::Transient(format!("whatsapp request timed out: {e}"));
            }
            Err(e) => return DeliveryResult::Transient(format!("whatsapp request failed: {e}")),
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return DeliveryResult::Transient(format!("whatsapp send failed ({status}): {body}"));
        }

        DeliveryResult::Delivered
    }
}
