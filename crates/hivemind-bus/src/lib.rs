//! HiveMind message bus.
//!
//! Producers publish structured records on dotted topics; consumers
//! subscribe with AMQP-style patterns (`*` matches one word, `#` matches
//! zero or more). Two brokers are provided:
//!
//! - [`InMemoryBus`]: in-process fan-out, used for single-process runs and tests.
//! - `AmqpBus` (feature `amqp`): RabbitMQ topic exchange with persistent delivery.

pub mod error;
pub mod memory;
pub mod topic;

#[cfg(feature = "amqp")]
pub mod amqp;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;

pub use error::BusError;
pub use memory::InMemoryBus;
pub use topic::{topics, TopicPattern};

#[cfg(feature = "amqp")]
pub use amqp::AmqpBus;

/// A message received from the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Concrete topic the message was published on.
    pub topic: String,
    /// Raw payload (JSON).
    pub payload: Vec<u8>,
}

impl Delivery {
    /// Decode the JSON payload.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T, BusError> {
        serde_json::from_slice(&self.payload).map_err(BusError::from)
    }
}

/// Stream of deliveries matching one pattern, in publish order per topic.
#[derive(Debug)]
pub struct Subscription {
    pattern: String,
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Subscription {
    /// Wrap a receiver fed by a broker.
    pub fn new(pattern: impl Into<String>, rx: mpsc::UnboundedReceiver<Delivery>) -> Self {
        Self {
            pattern: pattern.into(),
            rx,
        }
    }

    /// Pattern this subscription was created with.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Next delivery, or `None` once the broker side is gone.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }
}

/// Topic-addressed publish/subscribe channel.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Deliver `payload` to every current subscriber whose pattern matches `topic`.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Subscribe to all topics matching `pattern`.
    async fn subscribe(&self, pattern: &str) -> Result<Subscription, BusError>;
}

/// Serialize `value` as JSON and publish it.
pub async fn publish_json<T>(bus: &dyn MessageBus, topic: &str, value: &T) -> Result<(), BusError>
where
    T: Serialize + ?Sized,
{
    let payload = serde_json::to_vec(value)?;
    bus.publish(topic, payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        seq: u32,
    }

    #[tokio::test]
    async fn test_publish_json_roundtrip() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe("health.*").await.unwrap();

        publish_json(&bus, "health.quiz-worker", &Ping { seq: 7 })
            .await
            .unwrap();

        let delivery = sub.recv().await.unwrap();
        assert_eq!(delivery.topic, "health.quiz-worker");
        assert_eq!(delivery.decode_json::<Ping>().unwrap(), Ping { seq: 7 });
    }

    #[tokio::test]
    async fn test_decode_malformed_payload() {
        let delivery = Delivery {
            topic: "health.x".to_string(),
            payload: b"not json".to_vec(),
        };
        assert!(matches!(
            delivery.decode_json::<Ping>(),
            Err(BusError::Codec(_))
        ));
    }
}
