//! Multi-tenant notification pipeline.
//!
//! Four stages compose into a linear pipeline with a callback side-branch:
//!
//! ```text
//!  HTTP client → ingest → store + notifications topic
//!                              ↓
//!                          dispatch → dispatch.<channel>
//!                                          ↓
//!                                       worker → provider HTTP
//!                                          ↓ success        ↓ exhaustion
//!                                   provider.events   dlq.dispatch.email
//!                                          ↑
//!  provider callback → webhook ────────────┘
//! ```
//!
//! Each stage consumes, acts, then commits; duplicates are tolerated
//! everywhere downstream of the ingress dedup.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod models;
pub mod providers;
pub mod retry;
pub mod store;
pub mod telemetry;
pub mod webhook;
pub mod worker;

use config::{BusType, Config};
use event_bus::{BusResult, EventBus, InMemoryBus, KafkaBus};
use std::sync::Arc;
use std::time::Duration;

/// How long in-flight HTTP connections get to drain after a shutdown signal.
const HTTP_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Build the event bus selected by configuration.
pub fn build_bus(cfg: &Config) -> BusResult<Arc<dyn EventBus>> {
    match cfg.bus_type {
        BusType::Kafka => {
            tracing::info!(brokers = %cfg.kafka_brokers, "connecting to kafka");
            Ok(Arc::new(KafkaBus::new(&cfg.kafka_brokers)?))
        }
        BusType::InMemory => {
            tracing::info!("using in-memory bus");
            Ok(Arc::new(InMemoryBus::new()))
        }
    }
}

/// Resolves when the process receives SIGINT or SIGTERM.
///
/// Used both as the axum graceful-shutdown future and to trip the
/// watch-channel cancellation handle the consumer loops observe.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}

/// Serve an axum app until a shutdown signal, then give in-flight
/// connections a bounded grace window before returning.
pub async fn serve_http(
    listener: tokio::net::TcpListener,
    app: axum::Router,
) -> std::io::Result<()> {
    let (tx, rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = tx.send(true);
    });

    let graceful = {
        let mut rx = rx.clone();
        async move {
            let _ = rx.changed().await;
        }
    };
    let mut grace = rx.clone();

    let server = async move { axum::serve(listener, app).with_graceful_shutdown(graceful).await };
    tokio::select! {
        result = server => result,
        _ = async {
            let _ = grace.changed().await;
            tokio::time::sleep(HTTP_SHUTDOWN_GRACE).await;
        } => {
            tracing::warn!("shutdown grace period elapsed with connections still open");
            Ok(())
        }
    }
}
