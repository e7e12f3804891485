use notify_rs::config::Config;
use notify_rs::dispatch::Dispatcher;
use notify_rs::{build_bus, metrics, shutdown_signal, telemetry};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::from_env("dispatcher")?;
    telemetry::init(&cfg)?;
    metrics::spawn_server(cfg.metrics_port).await?;

    let bus = build_bus(&cfg)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let dispatcher = Dispatcher {
        bus,
        source_topic: cfg.notification_topic.clone(),
        group: cfg.service_name.clone(),
    };

    tracing::info!("dispatcher service started");
    dispatcher.run(shutdown_rx).await?;

    telemetry::shutdown().await;
    Ok(())
}
