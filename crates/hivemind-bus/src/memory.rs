//! In-process broker.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::{BusError, Delivery, MessageBus, Subscription, TopicPattern};

struct Subscriber {
    pattern: TopicPattern,
    tx: mpsc::UnboundedSender<Delivery>,
}

/// Fan-out bus living in process memory.
///
/// Every matching subscriber gets its own copy. Publishing never blocks:
/// subscriber queues are unbounded. Messages do not survive a restart.
#[derive(Default)]
pub struct InMemoryBus {
    subscribers: RwLock<Vec<Subscriber>>,
    published: AtomicU64,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages published so far.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Number of live subscriptions.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .await
            .iter()
            .filter(|s| !s.tx.is_closed())
            .count()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        if topic.is_empty() {
            return Err(BusError::InvalidTopic(topic.to_string()));
        }
        self.published.fetch_add(1, Ordering::Relaxed);

        let mut saw_closed = false;
        {
            let subscribers = self.subscribers.read().await;
            for sub in subscribers.iter().filter(|s| s.pattern.matches(topic)) {
                let delivery = Delivery {
                    topic: topic.to_string(),
                    payload: payload.clone(),
                };
                if sub.tx.send(delivery).is_err() {
                    saw_closed = true;
                }
            }
        }

        if saw_closed {
            let mut subscribers = self.subscribers.write().await;
            subscribers.retain(|s| !s.tx.is_closed());
            debug!(remaining = subscribers.len(), "Pruned closed subscriptions");
        }

        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<Subscription, BusError> {
        let parsed = TopicPattern::parse(pattern)?;
        let (tx, rx) = mpsc::unbounded_channel();

        self.subscribers.write().await.push(Subscriber {
            pattern: parsed,
            tx,
        });

        debug!(pattern = %pattern, "Subscription created");
        Ok(Subscription::new(pattern, rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fan_out_to_matching_subscribers_only() {
        let bus = InMemoryBus::new();
        let mut health_a = bus.subscribe("health.*").await.unwrap();
        let mut health_b = bus.subscribe("health.*").await.unwrap();
        let mut tasks = bus.subscribe("task.*").await.unwrap();

        bus.publish("health.w1", b"{}".to_vec()).await.unwrap();

        assert_eq!(health_a.recv().await.unwrap().topic, "health.w1");
        assert_eq!(health_b.recv().await.unwrap().topic, "health.w1");
        assert!(tasks.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_order_within_topic() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe("task.quiz").await.unwrap();

        for i in 0..5u8 {
            bus.publish("task.quiz", vec![i]).await.unwrap();
        }
        for i in 0..5u8 {
            assert_eq!(sub.recv().await.unwrap().payload, vec![i]);
        }
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let bus = InMemoryBus::new();
        let sub = bus.subscribe("health.*").await.unwrap();
        assert_eq!(bus.subscriber_count().await, 1);

        drop(sub);
        bus.publish("health.w1", Vec::new()).await.unwrap();

        assert_eq!(bus.subscriber_count().await, 0);
        assert_eq!(bus.published_count(), 1);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = InMemoryBus::new();
        assert!(bus.publish("metrics.w.cpu", b"1".to_vec()).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_pattern_rejected() {
        let bus = InMemoryBus::new();
        assert!(matches!(
            bus.subscribe("health..").await,
            Err(BusError::InvalidTopic(_))
        ));
    }
}
