use notify_rs::config::Config;
use notify_rs::providers::{Provider, SendGridProvider, SesProvider};
use notify_rs::retry::BackoffPolicy;
use notify_rs::worker::EmailWorker;
use notify_rs::{build_bus, metrics, shutdown_signal, telemetry};
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::from_env("email-worker")?;
    telemetry::init(&cfg)?;
    metrics::spawn_server(cfg.metrics_port).await?;

    let bus = build_bus(&cfg)?;

    let ses = SesProvider::new(cfg.ses_endpoint.clone(), cfg.ses_api_key.clone());
    let sendgrid =
        SendGridProvider::new(cfg.sendgrid_endpoint.clone(), cfg.sendgrid_api_key.clone());
    let providers: Vec<Arc<dyn Provider>> = vec![Arc::new(ses), Arc::new(sendgrid)];

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let worker = EmailWorker {
        bus,
        providers,
        policy: BackoffPolicy::default(),
        source_topic: cfg.email_topic.clone(),
        group: cfg.service_name.clone(),
        events_topic: cfg.provider_events_topic.clone(),
        dlq_topic: cfg.dlq_topic.clone(),
    };

    tracing::info!("email worker started");
    worker.run(shutdown_rx).await?;

    telemetry::shutdown().await;
    Ok(())
}
