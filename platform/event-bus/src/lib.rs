//! # EventBus Abstraction
//!
//! A shared abstraction over the message bus that carries records between
//! pipeline stages. Topics are plain names, every record is keyed (the key
//! drives hash partitioning, so all records for one message land on one
//! partition), and consumption is explicit-commit: a [`Delivery`] is only
//! marked done when the consumer calls [`Delivery::ack`] after its side
//! effects are durable.
//!
//! ## Implementations
//!
//! - **KafkaBus**: production implementation backed by rdkafka with manual
//!   offset commits (`enable.auto.commit=false`)
//! - **InMemoryBus**: dev/test implementation with a shared topic log that
//!   tests can inspect
//!
//! ## Usage
//!
//! ```rust,no_run
//! use event_bus::{EventBus, InMemoryBus, KafkaBus};
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Production: Kafka
//! let bus: Arc<dyn EventBus> = Arc::new(KafkaBus::new("localhost:9092")?);
//!
//! // Dev/Test: in-memory
//! let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
//!
//! bus.publish("notifications", "t1:k1", b"{}".to_vec()).await?;
//!
//! let mut stream = bus.subscribe("notifications", "dispatcher").await?;
//! while let Some(delivery) = stream.next().await {
//!     // ... act on the record ...
//!     delivery.ack()?;
//! }
//! # Ok(())
//! # }
//! ```

mod inmemory_bus;
mod kafka_bus;

pub use inmemory_bus::{InMemoryBus, PublishedRecord};
pub use kafka_bus::KafkaBus;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;

/// Errors that can occur when using the event bus
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to publish record: {0}")]
    PublishError(String),

    #[error("failed to subscribe to topic: {0}")]
    SubscribeError(String),

    #[error("failed to commit offset: {0}")]
    CommitError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

/// Result type for event bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Commit hook behind [`Delivery::ack`]. Implemented per bus backend.
pub(crate) trait AckHandle: Send + Sync {
    fn ack(&self) -> BusResult<()>;
}

/// A record handed to a consumer, with its commit handle.
///
/// The offset behind this record is NOT committed until [`Delivery::ack`] is
/// called. A consumer that crashes before acking will see the record again
/// after restart (at-least-once).
pub struct Delivery {
    /// The topic this record was consumed from
    pub topic: String,
    /// The partitioning key the producer attached
    pub key: String,
    /// The record payload (raw bytes)
    pub payload: Vec<u8>,
    pub(crate) acker: Box<dyn AckHandle>,
}

impl Delivery {
    /// Commit the source offset for this record.
    ///
    /// Must only be called after the consumer's side effects (downstream
    /// produce, store write) have acknowledged.
    pub fn ack(&self) -> BusResult<()> {
        self.acker.ack()
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("topic", &self.topic)
            .field("key", &self.key)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// Core event bus abstraction: keyed produce plus explicit-commit consume.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a keyed record to a topic.
    ///
    /// Resolves only once the bus has acknowledged the record; an `Ok` return
    /// means the record is durable on the topic.
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> BusResult<()>;

    /// Subscribe to a topic as a member of `group`.
    ///
    /// Returns a stream of [`Delivery`] values. The stream blocks until a
    /// record is available; it ends only when the bus is torn down. Consumers
    /// in the same group share the topic's partitions.
    async fn subscribe(&self, topic: &str, group: &str)
        -> BusResult<BoxStream<'static, Delivery>>;
}

impl fmt::Debug for dyn EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventBus")
    }
}
