//! Logging and trace-export wiring, initialised once per binary.

use crate::config::Config;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace as sdktrace;
use opentelemetry_sdk::Resource;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to initialise otlp trace exporter: {0}")]
    Otlp(#[from] opentelemetry::trace::TraceError),
}

/// Install the tracing subscriber: env-filtered JSON logs, plus an OTLP span
/// exporter when `OTLP_ENDPOINT` is configured (no-op otherwise).
pub fn init(cfg: &Config) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let fmt_layer = tracing_subscriber::fmt::layer().json();

    let otel_layer = match &cfg.otlp_endpoint {
        Some(endpoint) => {
            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .tonic()
                        .with_endpoint(endpoint.clone()),
                )
                .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                    KeyValue::new("service.name", cfg.service_name.clone()),
                ])))
                .install_batch(opentelemetry_sdk::runtime::Tokio)?;
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .init();

    Ok(())
}

/// Flush and tear down the trace exporter, bounded by a 5-second grace.
pub async fn shutdown() {
    let flush = tokio::task::spawn_blocking(opentelemetry::global::shutdown_tracer_provider);
    if tokio::time::timeout(Duration::from_secs(5), flush).await.is_err() {
        tracing::warn!("telemetry shutdown did not complete within grace period");
    }
}
