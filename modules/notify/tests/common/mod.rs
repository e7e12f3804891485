#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use http_body_util::BodyExt;
use notify_rs::error::StoreError;
use notify_rs::models::Message;
use notify_rs::store::MessageStore;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// In-memory stand-in for the postgres store: same contract, same
/// uniqueness rule on `(tenant_id, message_key)`.
#[derive(Default)]
pub struct MemoryStore {
    messages: Mutex<HashMap<(String, String), Message>>,
}

impl MemoryStore {
    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create_message(&self, msg: Message) -> Result<(Message, bool), StoreError> {
        let mut messages = self.messages.lock().unwrap();
        let key = (msg.tenant_id.clone(), msg.message_key.clone());
        if let Some(existing) = messages.get(&key) {
            return Ok((existing.clone(), true));
        }
        messages.insert(key, msg.clone());
        Ok((msg, false))
    }
}

/// Build a `POST /v1/notify` request. `None` omits the header entirely.
pub fn notify_request(
    tenant: Option<&str>,
    idempotency_key: Option<&str>,
    body: serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/v1/notify")
        .header("content-type", "application/json");
    if let Some(tenant) = tenant {
        builder = builder.header("x-tenant-id", tenant);
    }
    if let Some(key) = idempotency_key {
        builder = builder.header("x-idempotency-key", key);
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

pub fn valid_notify_body() -> serde_json::Value {
    serde_json::json!({
        "channel": "email",
        "template_id": "welcome",
        "to": {"email": "a@b.com"},
        "data": {"name": "Ada"},
    })
}

/// Read a response body as JSON.
pub async fn body_json(response: axum::http::Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll until `cond` holds; panics after two seconds.
pub async fn wait_for<F>(what: &str, mut cond: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
