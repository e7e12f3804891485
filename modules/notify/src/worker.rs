//! Email channel worker: deliver via ordered providers, dead-letter on
//! exhaustion, emit a status event on success.

use crate::error::PipelineError;
use crate::metrics::PROVIDER_DELIVERIES;
use crate::models::{DispatchMessage, StatusEvent};
use crate::providers::Provider;
use crate::retry::{send_with_retry, BackoffPolicy};
use chrono::Utc;
use event_bus::{Delivery, EventBus};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::Instrument;

pub struct EmailWorker {
    pub bus: Arc<dyn EventBus>,
    /// Tried in order; the order IS the failover policy.
    pub providers: Vec<Arc<dyn Provider>>,
    pub policy: BackoffPolicy,
    pub source_topic: String,
    pub group: String,
    pub events_topic: String,
    pub dlq_topic: String,
}

impl EmailWorker {
    /// Serial consume → deliver → outcome-produce → commit loop.
    ///
    /// An outcome-produce failure propagates without committing the source
    /// offset, so the record is re-processed after restart. A duplicate
    /// provider send in that case is covered by at-least-once.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), PipelineError> {
        if self.providers.is_empty() {
            return Err(PipelineError::Config(
                "at least one provider required".to_string(),
            ));
        }

        let mut stream = self.bus.subscribe(&self.source_topic, &self.group).await?;

        loop {
            let delivery = tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("email worker shutting down");
                    return Ok(());
                }
                next = stream.next() => match next {
                    Some(delivery) => delivery,
                    None => return Ok(()),
                },
            };
            self.handle(delivery).await?;
        }
    }

    async fn handle(&self, delivery: Delivery) -> Result<(), PipelineError> {
        let msg: DispatchMessage = match serde_json::from_slice(&delivery.payload) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::error!(error = %e, "failed to decode email envelope, skipping");
                commit(&delivery);
                return Ok(());
            }
        };

        let span = tracing::info_span!(
            "deliver_email",
            message_id = %msg.message_id,
            tenant_id = %msg.tenant_id,
        );
        self.deliver(&msg, &delivery).instrument(span).await
    }

    async fn deliver(
        &self,
        msg: &DispatchMessage,
        delivery: &Delivery,
    ) -> Result<(), PipelineError> {
        let mut delivered = false;
        for provider in &self.providers {
            match send_with_retry(provider.as_ref(), msg, &self.policy).await {
                Ok(()) => {
                    PROVIDER_DELIVERIES
                        .with_label_values(&[provider.name(), "sent"])
                        .inc();
                    delivered = true;
                    break;
                }
                Err(e) => {
                    let outcome = if e.is_permanent() { "rejected" } else { "exhausted" };
                    PROVIDER_DELIVERIES
                        .with_label_values(&[provider.name(), outcome])
                        .inc();
                    tracing::warn!(
                        provider = provider.name(),
                        error = %e,
                        "provider delivery failed, failing over"
                    );
                }
            }
        }

        if delivered {
            let event = StatusEvent {
                message_id: msg.message_id.clone(),
                tenant_id: msg.tenant_id.clone(),
                status: "sent".to_string(),
                channel: msg.channel.clone(),
                template_id: msg.template_id.clone(),
                emitted_at: Utc::now(),
            };
            let payload = serde_json::to_vec(&event)?;
            self.bus
                .publish(&self.events_topic, &msg.message_id, payload)
                .await?;
        } else {
            tracing::error!("all providers failed, dead-lettering");
            self.bus
                .publish(&self.dlq_topic, &msg.message_id, delivery.payload.clone())
                .await?;
        }

        commit(delivery);
        Ok(())
    }
}

fn commit(delivery: &Delivery) {
    if let Err(e) = delivery.ack() {
        tracing::warn!(topic = %delivery.topic, error = %e, "offset commit failed");
    }
}
