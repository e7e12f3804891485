mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use event_bus::InMemoryBus;
use notify_rs::models::NormalizedEvent;
use notify_rs::webhook::{self, WebhookState};
use std::sync::Arc;
use tower::ServiceExt;

fn app(bus: &InMemoryBus) -> axum::Router {
    webhook::router(WebhookState {
        bus: Arc::new(bus.clone()),
        topic: "provider.events".to_string(),
    })
}

fn callback(provider: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/v1/providers/{provider}/events"))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn sendgrid_callback_is_normalized() {
    let bus = InMemoryBus::new();
    let body = serde_json::json!({
        "sg_message_id": "X",
        "event": "delivered",
        "tenant_id": "t1",
    });

    let response = app(&bus).oneshot(callback("sendgrid", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let records = bus.records("provider.events");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key, "X");

    let event: NormalizedEvent = serde_json::from_slice(&records[0].payload).unwrap();
    assert_eq!(event.message_id, "X");
    assert_eq!(event.provider, "sendgrid");
    assert_eq!(event.status, "delivered");
    assert_eq!(event.tenant_id, "t1");
    // The original payload rides along verbatim.
    assert_eq!(event.meta, body);
}

#[tokio::test]
async fn ses_callback_is_normalized() {
    let bus = InMemoryBus::new();
    let body = serde_json::json!({
        "message_id": "m-9",
        "event": "bounced",
        "tenant_id": "t2",
        "bounce_type": "hard",
    });

    let response = app(&bus).oneshot(callback("ses", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let records = bus.records("provider.events");
    let event: NormalizedEvent = serde_json::from_slice(&records[0].payload).unwrap();
    assert_eq!(event.message_id, "m-9");
    assert_eq!(event.provider, "ses");
    assert_eq!(event.status, "bounced");
    assert_eq!(event.meta["bounce_type"], serde_json::json!("hard"));
}

#[tokio::test]
async fn redelivered_callback_produces_two_events() {
    let bus = InMemoryBus::new();
    let app = app(&bus);
    let body = serde_json::json!({"sg_message_id": "X", "event": "opened", "tenant_id": "t1"});

    for _ in 0..2 {
        let response = app.clone().oneshot(callback("sendgrid", &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    // At-least-once by design; downstream reduces duplicates.
    assert_eq!(bus.records("provider.events").len(), 2);
}

#[tokio::test]
async fn unknown_provider_is_rejected() {
    let bus = InMemoryBus::new();
    let body = serde_json::json!({"message_id": "m-1", "event": "delivered"});

    let response = app(&bus).oneshot(callback("mailgun", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(bus.records("provider.events").is_empty());
}

#[tokio::test]
async fn missing_required_fields_are_rejected() {
    let bus = InMemoryBus::new();
    let app = app(&bus);

    let cases = [
        ("ses", serde_json::json!({"event": "delivered"})),
        ("ses", serde_json::json!({"message_id": "m-1"})),
        ("sendgrid", serde_json::json!({"event": "delivered"})),
    ];

    for (provider, body) in cases {
        let response = app.clone().oneshot(callback(provider, &body)).await.unwrap();
        assert_eq!(
            response.status(),
            StatusCode::BAD_REQUEST,
            "{provider} body should be rejected: {body}"
        );
    }

    assert!(bus.records("provider.events").is_empty());
}

#[tokio::test]
async fn malformed_callback_body_is_rejected() {
    let bus = InMemoryBus::new();
    let request = Request::builder()
        .method("POST")
        .uri("/v1/providers/ses/events")
        .header("content-type", "application/json")
        .body(Body::from("not json"))
        .unwrap();

    let response = app(&bus).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
