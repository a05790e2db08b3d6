//! HTTP contract tests for the FCM and WhatsApp Cloud adapters.

use reminder_engine::channels::{
    CloudWhatsAppAdapter, FcmPushAdapter, PushAdapter, PushMessage, TemplateMessage,
    TemplateParameter, WhatsAppAdapter,
};
use reminder_engine::config::{PushChannelConfig, WhatsAppChannelConfig};
use reminder_engine::DeliveryResult;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fcm(server: &MockServer) -> FcmPushAdapter {
    FcmPushAdapter::new(&PushChannelConfig {
        project_id: "tasks-app".to_owned(),
        access_token: "fcm-secret".to_owned(),
        api_base: server.uri(),
        request_timeout_secs: 2,
        ..Default::default()
    })
    .unwrap()
}

fn whatsapp(server: &MockServer) -> CloudWhatsAppAdapter {
    CloudWhatsAppAdapter::new(&WhatsAppChannelConfig {
        access_token: "wa-secret".to_owned(),
        phone_number_id: "1098765".to_owned(),
        api_base: server.uri(),
        request_timeout_secs: 2,
        ..Default::default()
    })
    .unwrap()
}

fn push_message() -> PushMessage {
    PushMessage {
        title: "Task reminder".to_owned(),
        body: "Task \"Pay rent\" is due soon".to_owned(),
    }
}

fn template() -> TemplateMessage {
    TemplateMessage {
        name: "message_simple".to_owned(),
        language_code: "es_PE".to_owned(),
        parameters: vec![
            TemplateParameter::text("Hola! Ana"),
            TemplateParameter::text("Pay rent"),
        ],
    }
}

// ────────────────────────────────────────────────────────────────────────────
// FCM
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fcm_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/projects/tasks-app/messages:send"))
        .and(header("authorization", "Bearer fcm-secret"))
        .and(body_partial_json(json!({
            "message": {
                "token": "device-1",
                "notification": {
                    "title": "Task reminder",
                    "body": "Task \"Pay rent\" is due soon"
                }
            }
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"name": "projects/tasks-app/messages/1"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let result = fcm(&server).send("device-1", &push_message()).await;
    assert_eq!(result, DeliveryResult::Delivered);
}

#[tokio::test]
async fn fcm_webpush_tag_is_unique_timestamp() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let before = chrono::Utc::now().timestamp_millis();
    fcm(&server).send("device-1", &push_message()).await;

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let tag: i64 = body["message"]["webpush"]["notification"]["tag"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(tag >= before);
}

#[tokio::test]
async fn fcm_unregistered_token_is_invalid_recipient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {
                "code": 404,
                "message": "Requested entity was not found.",
                "status": "NOT_FOUND",
                "details": [{"errorCode": "UNREGISTERED"}]
            }
        })))
        .mount(&server)
        .await;

    let result = fcm(&server).send("stale", &push_message()).await;
    assert!(matches!(result, DeliveryResult::InvalidRecipient(_)));
}

#[tokio::test]
async fn fcm_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let result = fcm(&server).send("device-1", &push_message()).await;
    assert!(matches!(result, DeliveryResult::Transient(_)));
}

#[tokio::test]
async fn fcm_slow_response_times_out_as_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(5)))
        .mount(&server)
        .await;

    let result = fcm(&server).send("device-1", &push_message()).await;
    assert!(matches!(result, DeliveryResult::Transient(_)));
}

// ────────────────────────────────────────────────────────────────────────────
// WhatsApp Cloud
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn whatsapp_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v18.0/1098765/messages"))
        .and(header("authorization", "Bearer wa-secret"))
        .and(body_partial_json(json!({
            "messaging_product": "whatsapp",
            "to": "51999888777",
            "type": "template",
            "template": {
                "name": "message_simple",
                "language": {"code": "es_PE"},
                "components": [{
                    "type": "body",
                    "parameters": [
                        {"type": "text", "text": "Hola! Ana"},
                        {"type": "text", "text": "Pay rent"}
                    ]
                }]
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{"id": "wamid.1"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = whatsapp(&server).send("+51999888777", &template()).await;
    assert_eq!(result, DeliveryResult::Delivered);
}

#[tokio::test]
async fn whatsapp_rejection_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"message": "Template name does not exist", "code": 132001}
        })))
        .mount(&server)
        .await;

    let result = whatsapp(&server).send("+51999888777", &template()).await;
    assert!(matches!(result, DeliveryResult::Transient(_)));
}

#[tokio::test]
async fn whatsapp_without_credentials_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let adapter = CloudWhatsAppAdapter::new(&WhatsAppChannelConfig {
        api_base: server.uri(),
        ..Default::default()
    })
    .unwrap();
    let result = adapter.send("+51999888777", &template()).await;
    assert!(matches!(result, DeliveryResult::Transient(_)));
}
