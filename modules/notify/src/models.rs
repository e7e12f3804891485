use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle status a message is created with.
pub const STATUS_QUEUED: &str = "queued";

/// Body of a `POST /v1/notify` request.
///
/// All fields default so that absence surfaces as a validation error rather
/// than a deserialization error; validation is structural only (an unknown
/// channel is accepted here and dead-lettered by the dispatcher).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyRequest {
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub to: Map<String, Value>,
    #[serde(default)]
    pub template_id: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub options: Value,
}

/// The canonical persisted record of a requested notification.
///
/// `(tenant_id, message_key)` is unique in the store; the record is created
/// exactly once by the ingress and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub tenant_id: String,
    pub message_key: String,
    pub channel: String,
    pub payload: Value,
    pub template_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// The dispatch envelope carried on `notifications` and the per-channel
/// topics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchMessage {
    pub message_id: String,
    pub tenant_id: String,
    pub channel: String,
    pub payload: Value,
    pub template_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl DispatchMessage {
    pub fn from_message(msg: &Message) -> Self {
        Self {
            message_id: msg.id.clone(),
            tenant_id: msg.tenant_id.clone(),
            channel: msg.channel.clone(),
            payload: msg.payload.clone(),
            template_id: msg.template_id.clone(),
            created_at: msg.created_at,
            metadata: None,
        }
    }
}

/// Delivery status record emitted by channel workers on `provider.events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub message_id: String,
    pub tenant_id: String,
    pub status: String,
    pub channel: String,
    pub template_id: String,
    pub emitted_at: DateTime<Utc>,
}

/// The canonical cross-provider callback shape emitted by the webhook
/// normalizer on `provider.events`.
///
/// `meta` carries the original provider payload verbatim so downstream
/// consumers can recover provider-specific detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub message_id: String,
    pub tenant_id: String,
    pub provider: String,
    pub status: String,
    pub occurred_at: DateTime<Utc>,
    pub meta: Value,
}
