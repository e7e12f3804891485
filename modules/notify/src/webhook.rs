//! Provider webhook normalizer: heterogeneous callback shapes in, canonical
//! events out.

use crate::error::ApiError;
use crate::metrics::WEBHOOK_EVENTS;
use crate::models::NormalizedEvent;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use chrono::Utc;
use event_bus::EventBus;
use serde_json::Value;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct WebhookState {
    pub bus: Arc<dyn EventBus>,
    pub topic: String,
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/v1/providers/{provider}/events", post(receive_event))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// `POST /v1/providers/{provider}/events`
///
/// Providers routinely redeliver callbacks; duplicates pass straight through
/// to `provider.events` and are reduced downstream.
async fn receive_event(
    State(state): State<WebhookState>,
    Path(provider): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::Validation(format!("invalid callback body: {e}")))?;

    let event = normalize(&provider, payload)?;

    let bytes = serde_json::to_vec(&event)
        .map_err(|e| ApiError::Internal(format!("encode event: {e}")))?;
    state.bus.publish(&state.topic, &event.message_id, bytes).await?;

    WEBHOOK_EVENTS
        .with_label_values(&[provider.as_str(), "ok"])
        .inc();
    tracing::info!(
        provider = %event.provider,
        message_id = %event.message_id,
        status = %event.status,
        "provider event normalized"
    );

    Ok(StatusCode::ACCEPTED.into_response())
}

/// Map a provider-shaped callback onto the canonical event.
///
/// | provider | message_id from | status from | tenant from |
/// |----------|-----------------|-------------|-------------|
/// | ses      | `message_id`    | `event`     | `tenant_id` |
/// | sendgrid | `sg_message_id` | `event`     | `tenant_id` |
pub fn normalize(provider: &str, payload: Value) -> Result<NormalizedEvent, ApiError> {
    let id_field = match provider {
        "ses" => "message_id",
        "sendgrid" => "sg_message_id",
        _ => {
            return Err(ApiError::Validation(format!(
                "unsupported provider: {provider}"
            )))
        }
    };

    let message_id = required_str(&payload, provider, id_field)?;
    let status = required_str(&payload, provider, "event")?;
    let tenant_id = payload
        .get("tenant_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(NormalizedEvent {
        message_id,
        tenant_id,
        provider: provider.to_string(),
        status,
        occurred_at: Utc::now(),
        meta: payload,
    })
}

fn required_str(payload: &Value, provider: &str, field: &str) -> Result<String, ApiError> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::Validation(format!("{provider} {field} missing")))
}
