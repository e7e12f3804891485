use anyhow::Context;
use notify_rs::config::Config;
use notify_rs::ingest::{self, IngestState};
use notify_rs::store::PostgresStore;
use notify_rs::{build_bus, metrics, serve_http, telemetry};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::from_env("ingestion")?;
    telemetry::init(&cfg)?;
    metrics::spawn_server(cfg.metrics_port).await?;

    let database_url = cfg
        .database_url
        .clone()
        .context("DATABASE_URL must be provided")?;
    let store = PostgresStore::connect(&database_url)
        .await
        .context("connect postgres")?;
    let bus = build_bus(&cfg)?;

    let app = ingest::router(IngestState {
        store: Arc::new(store),
        bus,
        topic: cfg.notification_topic.clone(),
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cfg.http_port)).await?;
    tracing::info!(port = cfg.http_port, "ingestion service listening");
    serve_http(listener, app).await?;

    telemetry::shutdown().await;
    Ok(())
}
