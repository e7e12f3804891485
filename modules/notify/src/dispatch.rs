//! Channel dispatch: fan records out from `notifications` to the per-channel
//! topics.

use crate::error::PipelineError;
use crate::metrics::DISPATCHED_MESSAGES;
use crate::models::DispatchMessage;
use event_bus::{Delivery, EventBus};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;

/// Records whose channel no known worker serves land here for the operator.
pub const DLQ_NOTIFICATIONS_TOPIC: &str = "dlq.notifications";

/// The fixed channel routing table. `None` means the channel is unknown and
/// the record goes to the notifications DLQ.
pub fn topic_for_channel(channel: &str) -> Option<&'static str> {
    match channel {
        "email" => Some("dispatch.email"),
        "sms" => Some("dispatch.sms"),
        "push" => Some("dispatch.push"),
        "whatsapp" => Some("dispatch.wa"),
        _ => None,
    }
}

pub struct Dispatcher {
    pub bus: Arc<dyn EventBus>,
    pub source_topic: String,
    pub group: String,
}

impl Dispatcher {
    /// Serial consume → route → produce → commit loop.
    ///
    /// Returns `Ok(())` on cancellation. A produce failure is returned
    /// without committing the source offset, so the record is re-processed
    /// after restart (duplicates downstream are tolerated).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), PipelineError> {
        let mut stream = self.bus.subscribe(&self.source_topic, &self.group).await?;

        loop {
            let delivery = tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("dispatcher shutting down");
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
        let envelope: DispatchMessage = match serde_json::from_slice(&delivery.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                // Malformed records are not retryable and must not block the
                // partition: commit and advance.
                tracing::error!(error = %e, "failed to decode envelope, skipping");
                commit(&delivery);
                return Ok(());
            }
        };

        let topic = match topic_for_channel(&envelope.channel) {
            Some(topic) => topic,
            None => {
                tracing::warn!(
                    message_id = %envelope.message_id,
                    channel = %envelope.channel,
                    "unknown channel, routing to dead letter"
                );
                DLQ_NOTIFICATIONS_TOPIC
            }
        };

        let key = format!("{}:{}", envelope.tenant_id, envelope.message_id);
        // The envelope is forwarded verbatim; only the key changes, from the
        // ingress idempotency key to the stable message identity.
        self.bus
            .publish(topic, &key, delivery.payload.clone())
            .await?;
        DISPATCHED_MESSAGES.with_label_values(&[topic]).inc();

        tracing::debug!(
            message_id = %envelope.message_id,
            tenant_id = %envelope.tenant_id,
            topic = %topic,
            "record dispatched"
        );

        commit(&delivery);
        Ok(())
    }
}

fn commit(delivery: &Delivery) {
    if let Err(e) = delivery.ack() {
        // Redelivery after a failed commit is covered by at-least-once.
        tracing::warn!(topic = %delivery.topic, error = %e, "offset commit failed");
    }
}
