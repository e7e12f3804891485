//! Process-global prometheus collectors plus the metrics listener.
//!
//! Collectors register against the default registry at first use and are
//! never threaded through call chains.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    pub static ref INGEST_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "ingest_requests_total",
        "Total number of /notify requests received",
        &["status", "channel"]
    )
    .expect("metric");
    pub static ref INGEST_LATENCY: HistogramVec = register_histogram_vec!(
        "ingest_request_duration_seconds",
        "Latency for /notify requests",
        &["channel"]
    )
    .expect("metric");
    pub static ref DISPATCHED_MESSAGES: IntCounterVec = register_int_counter_vec!(
        "dispatcher_messages_total",
        "Records routed by the dispatcher, by destination topic",
        &["topic"]
    )
    .expect("metric");
    pub static ref PROVIDER_DELIVERIES: IntCounterVec = register_int_counter_vec!(
        "worker_provider_deliveries_total",
        "Provider delivery attempts by outcome",
        &["provider", "outcome"]
    )
    .expect("metric");
    pub static ref WEBHOOK_EVENTS: IntCounterVec = register_int_counter_vec!(
        "webhook_events_total",
        "Total webhook events processed",
        &["provider", "status"]
    )
    .expect("metric");
}

async fn render() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buf = Vec::new();
    match encoder.encode(&families, &mut buf) {
        Ok(()) => match String::from_utf8(buf) {
            Ok(body) => (StatusCode::OK, body),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("metrics error: {e}"),
            ),
        },
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics error: {e}"),
        ),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub fn router() -> Router {
    Router::new()
        .route("/metrics", get(render))
        .route("/health", get(health))
}

/// Spawn the metrics listener on its own port.
///
/// Failure to bind is fatal at startup; failures afterwards only lose the
/// metrics surface, never the pipeline.
pub async fn spawn_server(port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port = port, "metrics listener started");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router()).await {
            tracing::error!(error = %e, "metrics server stopped");
        }
    });
    Ok(())
}
