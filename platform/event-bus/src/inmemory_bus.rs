//! In-memory implementation of the EventBus trait for testing and development

use crate::{AckHandle, BusResult, Delivery, EventBus};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// A record as it was published, kept in the shared topic log.
#[derive(Debug, Clone)]
pub struct PublishedRecord {
    pub key: String,
    pub payload: Vec<u8>,
}

struct InMemoryState {
    topics: Mutex<HashMap<String, Vec<PublishedRecord>>>,
    // committed offset per (topic, group): the index of the next unacked record
    commits: Mutex<HashMap<(String, String), u64>>,
    wakeup: Notify,
}

/// EventBus implementation backed by an in-process topic log
///
/// This implementation is suitable for:
/// - Unit and integration tests (no broker required)
/// - Local development without Docker
///
/// Every subscription replays its topic from offset zero (the equivalent of
/// `auto.offset.reset=earliest` with a fresh consumer group) and then follows
/// the log live. The full per-topic log and the committed offsets are kept so
/// tests can assert on exactly what was produced and what was acked.
///
/// # Example
/// ```rust
/// use event_bus::{EventBus, InMemoryBus};
/// use futures::StreamExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryBus::new();
/// bus.publish("notifications", "t1:k1", b"hello".to_vec()).await?;
///
/// let mut stream = bus.subscribe("notifications", "dispatcher").await?;
/// let delivery = stream.next().await.unwrap();
/// assert_eq!(delivery.key, "t1:k1");
/// delivery.ack()?;
/// assert_eq!(bus.committed("notifications", "dispatcher"), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryBus {
    state: Arc<InMemoryState>,
}

impl InMemoryBus {
    /// Create a new in-memory event bus
    pub fn new() -> Self {
        Self {
            state: Arc::new(InMemoryState {
                topics: Mutex::new(HashMap::new()),
                commits: Mutex::new(HashMap::new()),
                wakeup: Notify::new(),
            }),
        }
    }

    /// Snapshot of everything published to `topic`, in publish order.
    pub fn records(&self, topic: &str) -> Vec<PublishedRecord> {
        self.state
            .topics
            .lock()
            .expect("topic log lock poisoned")
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// The committed offset for `(topic, group)`: the number of records at
    /// the head of the topic that the group has acked.
    pub fn committed(&self, topic: &str, group: &str) -> u64 {
        self.state
            .commits
            .lock()
            .expect("commit map lock poisoned")
            .get(&(topic.to_string(), group.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

struct InMemoryAck {
    state: Arc<InMemoryState>,
    topic: String,
    group: String,
    offset: u64,
}

impl AckHandle for InMemoryAck {
    fn ack(&self) -> BusResult<()> {
        let mut commits = self
            .state
            .commits
            .lock()
            .expect("commit map lock poisoned");
        let entry = commits
            .entry((self.topic.clone(), self.group.clone()))
            .or_insert(0);
        // Acks can arrive out of order after redelivery; never move backwards.
        *entry = (*entry).max(self.offset + 1);
        Ok(())
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> BusResult<()> {
        {
            let mut topics = self
                .state
                .topics
                .lock()
                .expect("topic log lock poisoned");
            topics.entry(topic.to_string()).or_default().push(PublishedRecord {
                key: key.to_string(),
                payload,
            });
        }
        self.state.wakeup.notify_waiters();
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
    ) -> BusResult<BoxStream<'static, Delivery>> {
        let state = self.state.clone();
        let topic = topic.to_string();
        let group = group.to_string();

        let stream = async_stream::stream! {
            let mut cursor: u64 = 0;
            loop {
                // Register for a wakeup before checking the log, so a publish
                // that lands between the check and the await is not missed.
                let notified = state.wakeup.notified();
                let next = {
                    let topics = state.topics.lock().expect("topic log lock poisoned");
                    topics
                        .get(&topic)
                        .and_then(|log| log.get(cursor as usize))
                        .cloned()
                };
                match next {
                    Some(record) => {
                        let delivery = Delivery {
                            topic: topic.clone(),
                            key: record.key,
                            payload: record.payload,
                            acker: Box::new(InMemoryAck {
                                state: state.clone(),
                                topic: topic.clone(),
                                group: group.clone(),
                                offset: cursor,
                            }),
                        };
                        cursor += 1;
                        yield delivery;
                    }
                    None => notified.await,
                }
            }
        };

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    async fn next_with_timeout(stream: &mut BoxStream<'static, Delivery>) -> Delivery {
        tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("timeout")
            .expect("stream ended")
    }

    #[tokio::test]
    async fn test_publish_and_subscribe() {
        let bus = InMemoryBus::new();
        let mut stream = bus.subscribe("test.topic", "g1").await.unwrap();

        bus.publish("test.topic", "k1", b"payload".to_vec())
            .await
            .unwrap();

        let delivery = next_with_timeout(&mut stream).await;
        assert_eq!(delivery.topic, "test.topic");
        assert_eq!(delivery.key, "k1");
        assert_eq!(delivery.payload, b"payload");
    }

    #[tokio::test]
    async fn test_subscribe_replays_from_start() {
        let bus = InMemoryBus::new();

        // Published before anyone subscribed
        bus.publish("replay", "k1", b"first".to_vec()).await.unwrap();
        bus.publish("replay", "k2", b"second".to_vec()).await.unwrap();

        let mut stream = bus.subscribe("replay", "late").await.unwrap();
        assert_eq!(next_with_timeout(&mut stream).await.key, "k1");
        assert_eq!(next_with_timeout(&mut stream).await.key, "k2");
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = InMemoryBus::new();
        let mut stream = bus.subscribe("a", "g").await.unwrap();

        bus.publish("b", "k", b"other".to_vec()).await.unwrap();
        bus.publish("a", "k", b"mine".to_vec()).await.unwrap();

        let delivery = next_with_timeout(&mut stream).await;
        assert_eq!(delivery.payload, b"mine");
        assert_eq!(bus.records("b").len(), 1);
    }

    #[tokio::test]
    async fn test_ack_advances_committed_offset() {
        let bus = InMemoryBus::new();
        let mut stream = bus.subscribe("commits", "worker").await.unwrap();

        bus.publish("commits", "k1", b"1".to_vec()).await.unwrap();
        bus.publish("commits", "k2", b"2".to_vec()).await.unwrap();

        let first = next_with_timeout(&mut stream).await;
        assert_eq!(bus.committed("commits", "worker"), 0);

        first.ack().unwrap();
        assert_eq!(bus.committed("commits", "worker"), 1);

        let second = next_with_timeout(&mut stream).await;
        second.ack().unwrap();
        assert_eq!(bus.committed("commits", "worker"), 2);
    }

    #[tokio::test]
    async fn test_groups_track_offsets_independently() {
        let bus = InMemoryBus::new();
        let mut one = bus.subscribe("shared", "g1").await.unwrap();
        let mut two = bus.subscribe("shared", "g2").await.unwrap();

        bus.publish("shared", "k", b"x".to_vec()).await.unwrap();

        next_with_timeout(&mut one).await.ack().unwrap();
        let _unacked = next_with_timeout(&mut two).await;

        assert_eq!(bus.committed("shared", "g1"), 1);
        assert_eq!(bus.committed("shared", "g2"), 0);
    }
}
