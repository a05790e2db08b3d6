use crate::channels::traits::{PushAdapter, PushMessage};
use crate::config::PushChannelConfig;
use crate::error::{ReminderError, Result};
use crate::model::DeliveryResult;
use async_trait::async_trait;
use reqwest::StatusCode;

/// Firebase Cloud Messaging (HTTP v1) push adapter.
///
/// Token lifecycle errors (`UNREGISTERED`, sender mismatch, malformed token)
/// are reported as [`DeliveryResult::InvalidRecipient`] so the caller can
/// drop the token; everything else is transient.
#[derive(Clone)]
pub struct FcmPushAdapter {
    project_id: String,
    access_token: String,
    api_base: String,
    client: reqwest::Client,
}

impl FcmPushAdapter {
    pub fn new(config: &PushChannelConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(
                config.request_timeout_secs.max(1),
            ))
            .build()
            .map_err(|e| ReminderError::Channel(format!("cannot build FCM client: {e}")))?;
        Ok(Self {
            project_id: config.project_id.clone(),
            access_token: config.access_token.clone(),
            api_base: config.api_base.trim_end_matches('/').to_owned(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/projects/{}/messages:send",
            self.api_base, self.project_id
        )
    }
}

#[async_trait]
impl PushAdapter for FcmPushAdapter {
    fn id(&self) -> &'static str {
        "fcm"
    }

    async fn send(&self, token: &str, message: &PushMessage) -> DeliveryResult {
        if self.access_token.trim().is_empty() || self.project_id.trim().is_empty() {
            return DeliveryResult::Transient("fcm credentials are not configured".to_owned());
        }

        // A unique tag stops browsers from collapsing successive reminders.
        let tag = chrono::Utc::now().timestamp_millis().to_string();
        let body = serde_json::json!({
            "message": {
                "token": token,
                "notification": {
                    "title": message.title,
                    "body": message.body
                },
                "webpush": {
                    "notification": { "tag": tag }
                }
            }
        });

        let response = match self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return DeliveryResult::Transient(format!("fcm request timed out: {e}"));
            }
            Err(e) => return DeliveryResult::Transient(format!("fcm request failed: {e}")),
        };

        let status = response.status();
        if status.is_success() {
            return DeliveryResult::Delivered;
        }
        let body = response.text().await.unwrap_or_default();
        classify_failure(status, &body)
    }
}

/// Map an FCM error response onto the delivery taxonomy.
fn classify_failure(status: StatusCode, body: &str) -> DeliveryResult {
    let parsed: serde_json::Value = serde_json::from_str(body).unwrap_or_default();
    let error = parsed.get("error");
    let error_status = error
        .and_then(|e| e.get("status"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    let message = error
        .and_then(|e| e.get("message"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    let error_code = error
        .and_then(|e| e.get("details"))
        .and_then(serde_json::Value::as_array)
        .and_then(|details| {
            details
                .iter()
                .find_map(|d| d.get("errorCode").and_then(serde_json::Value::as_str))
        })
        .unwrap_or_default();

    let summary = format!("fcm send failed ({status}): {error_status} {message}");
    let invalid_token = matches!(error_code, "UNREGISTERED" | "SENDER_ID_MISMATCH")
        || status == StatusCode::NOT_FOUND
        || (status == StatusCode::BAD_REQUEST
            && error_status == "INVALID_ARGUMENT"
            && message.to_ascii_lowercase().contains("registration token"));

    if invalid_token {
        DeliveryResult::InvalidRecipient(summary)
    } else {
        DeliveryResult::Transient(summary)
    }
}
