use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use event_bus::BusError;

/// Failures from the message store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Errors surfaced to HTTP callers.
///
/// Validation problems are the caller's fault (400); everything else is an
/// internal failure (500) the caller may retry — the ingress dedup makes the
/// retry safe.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) | ApiError::Bus(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Fatal failures inside a consumer loop.
///
/// Decode problems never become a `PipelineError` (they are logged, acked and
/// skipped); a produce failure does, and takes the process down so the
/// supervisor restarts it without the offset having moved.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("encode outgoing record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("worker configuration error: {0}")]
    Config(String),
}
