//! Idempotent HTTP ingress: validate, persist once, enqueue once.

use crate::error::ApiError;
use crate::metrics::{INGEST_LATENCY, INGEST_REQUESTS};
use crate::models::{DispatchMessage, Message, NotifyRequest, STATUS_QUEUED};
use crate::store::MessageStore;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use event_bus::EventBus;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

#[derive(Clone)]
pub struct IngestState {
    pub store: Arc<dyn MessageStore>,
    pub bus: Arc<dyn EventBus>,
    pub topic: String,
}

pub fn router(state: IngestState) -> Router {
    Router::new()
        .route("/v1/notify", post(notify))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// `POST /v1/notify`
///
/// The store insert is durable before the bus produce; a crash in between
/// loses the enqueue but never the record, and the caller can safely retry
/// with the same idempotency key.
async fn notify(
    State(state): State<IngestState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let tenant_id = required_header(&headers, "x-tenant-id")?;
    let message_key = required_header(&headers, "x-idempotency-key")?;

    let req: NotifyRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::Validation(format!("invalid request body: {e}")))?;
    validate_request(&req)?;

    let timer = INGEST_LATENCY
        .with_label_values(&[req.channel.as_str()])
        .start_timer();

    let msg = Message {
        id: Uuid::new_v4().to_string(),
        tenant_id,
        message_key,
        channel: req.channel.clone(),
        payload: json!({
            "to": req.to,
            "data": req.data,
            "options": req.options,
        }),
        template_id: req.template_id.clone(),
        status: STATUS_QUEUED.to_string(),
        created_at: Utc::now(),
    };

    let (msg, duplicate) = state.store.create_message(msg).await?;
    timer.observe_duration();

    let outcome = if duplicate { "duplicate" } else { "accepted" };
    INGEST_REQUESTS
        .with_label_values(&[outcome, req.channel.as_str()])
        .inc();

    if duplicate {
        tracing::info!(
            message_id = %msg.id,
            tenant_id = %msg.tenant_id,
            "duplicate notify request, returning original record"
        );
        return Ok((
            StatusCode::CONFLICT,
            Json(json!({ "message_id": msg.id, "status": "duplicate" })),
        )
            .into_response());
    }

    let envelope = DispatchMessage::from_message(&msg);
    let payload = serde_json::to_vec(&envelope)
        .map_err(|e| ApiError::Internal(format!("encode envelope: {e}")))?;
    let key = format!("{}:{}", msg.tenant_id, msg.message_key);
    state.bus.publish(&state.topic, &key, payload).await?;

    tracing::info!(
        message_id = %msg.id,
        tenant_id = %msg.tenant_id,
        channel = %msg.channel,
        "notification accepted"
    );

    Ok((StatusCode::ACCEPTED, Json(json!({ "message_id": msg.id }))).into_response())
}

fn required_header(headers: &HeaderMap, name: &str) -> Result<String, ApiError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::Validation(format!("missing {name} header")))
}

fn validate_request(req: &NotifyRequest) -> Result<(), ApiError> {
    if req.channel.is_empty() {
        return Err(ApiError::Validation("channel is required".to_string()));
    }
    if req.template_id.is_empty() {
        return Err(ApiError::Validation("template_id is required".to_string()));
    }
    if req.to.is_empty() {
        return Err(ApiError::Validation("to is required".to_string()));
    }
    Ok(())
}
