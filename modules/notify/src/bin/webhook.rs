use notify_rs::config::Config;
use notify_rs::webhook::{self, WebhookState};
use notify_rs::{build_bus, metrics, serve_http, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::from_env("webhook")?;
    telemetry::init(&cfg)?;
    metrics::spawn_server(cfg.metrics_port).await?;

    let bus = build_bus(&cfg)?;

    let app = webhook::router(WebhookState {
        bus,
        topic: cfg.provider_events_topic.clone(),
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cfg.http_port)).await?;
    tracing::info!(port = cfg.http_port, "webhook service listening");
    serve_http(listener, app).await?;

    telemetry::shutdown().await;
    Ok(())
}
