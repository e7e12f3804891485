//! Kafka-based implementation of the EventBus trait

use crate::{AckHandle, BusError, BusResult, Delivery, EventBus};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use std::sync::Arc;
use std::time::Duration;

const PRODUCE_TIMEOUT: Duration = Duration::from_secs(5);

/// EventBus implementation backed by Kafka (rdkafka)
///
/// Delivery semantics are at-least-once:
/// - produces wait for broker acknowledgment from all replicas (`acks=all`)
/// - auto-commit is disabled; offsets move only when the consumer acks a
///   [`Delivery`], so a crash between act and ack replays the record
/// - records are keyed, and the default hash partitioner keeps every record
///   for one key on one partition, which preserves per-message ordering
///
/// One producer handle is created up front and shared by all publishes; a
/// dedicated consumer is created per subscription.
pub struct KafkaBus {
    producer: FutureProducer,
    brokers: String,
}

impl KafkaBus {
    /// Create a Kafka event bus against a comma-separated broker list.
    pub fn new(brokers: &str) -> BusResult<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .create()
            .map_err(|e| BusError::ConnectionError(format!("create producer: {e}")))?;

        tracing::info!(brokers = %brokers, "kafka producer created");

        Ok(Self {
            producer,
            brokers: brokers.to_string(),
        })
    }

    fn create_consumer(&self, topic: &str, group: &str) -> BusResult<StreamConsumer> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| BusError::SubscribeError(format!("create consumer: {e}")))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| BusError::SubscribeError(format!("subscribe to {topic}: {e}")))?;

        Ok(consumer)
    }
}

struct KafkaAck {
    consumer: Arc<StreamConsumer>,
    topic: String,
    partition: i32,
    offset: i64,
}

impl AckHandle for KafkaAck {
    fn ack(&self) -> BusResult<()> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&self.topic, self.partition, Offset::Offset(self.offset + 1))
            .map_err(|e| BusError::CommitError(e.to_string()))?;
        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| BusError::CommitError(e.to_string()))
    }
}

#[async_trait]
impl EventBus for KafkaBus {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> BusResult<()> {
        let record = FutureRecord::to(topic).key(key).payload(&payload);

        match self.producer.send(record, Timeout::After(PRODUCE_TIMEOUT)).await {
            Ok((partition, offset)) => {
                tracing::debug!(
                    topic = %topic,
                    key = %key,
                    partition = partition,
                    offset = offset,
                    "record published"
                );
                Ok(())
            }
            Err((kafka_error, _)) => {
                tracing::error!(topic = %topic, error = %kafka_error, "failed to publish record");
                Err(BusError::PublishError(format!("{topic}: {kafka_error}")))
            }
        }
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
    ) -> BusResult<BoxStream<'static, Delivery>> {
        let consumer = Arc::new(self.create_consumer(topic, group)?);
        let topic = topic.to_string();

        tracing::info!(topic = %topic, group = %group, manual_commit = true, "subscribed");

        let stream = async_stream::stream! {
            loop {
                match consumer.recv().await {
                    Ok(message) => {
                        let key = message
                            .key()
                            .map(|k| String::from_utf8_lossy(k).into_owned())
                            .unwrap_or_default();
                        let payload = message.payload().map(<[u8]>::to_vec).unwrap_or_default();
                        let acker = KafkaAck {
                            consumer: consumer.clone(),
                            topic: topic.clone(),
                            partition: message.partition(),
                            offset: message.offset(),
                        };
                        yield Delivery {
                            topic: topic.clone(),
                            key,
                            payload,
                            acker: Box::new(acker),
                        };
                    }
                    Err(e) => {
                        tracing::error!(topic = %topic, error = %e, "consumer receive failed");
                        // Back off so a broken broker connection does not spin.
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        };

        Ok(stream.boxed())
    }
}
