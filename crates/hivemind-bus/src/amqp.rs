//! RabbitMQ broker.
//!
//! All topics share one durable topic exchange; the topic is the routing key.
//! Messages are published persistent (`delivery_mode = 2`) on a channel in
//! confirm mode, and subscriptions consume from durable queues bound with the
//! subscription pattern.

use async_trait::async_trait;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
    ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::{BusError, Delivery, MessageBus, Subscription, TopicPattern};

/// Default exchange name.
pub const DEFAULT_EXCHANGE: &str = "hivemind.events";

/// Bus backed by a RabbitMQ topic exchange.
pub struct AmqpBus {
    connection: Connection,
    channel: Channel,
    exchange: String,
    queue_prefix: String,
}

impl AmqpBus {
    /// Connect and declare the exchange. Any failure here is a startup failure.
    pub async fn connect(url: &str, exchange: &str) -> Result<Self, BusError> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| BusError::Connect(format!("failed to reach broker: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BusError::Connect(format!("failed to open channel: {e}")))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| BusError::Connect(format!("failed to enable publisher confirms: {e}")))?;

        channel
            .exchange_declare(
                exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                BusError::Connect(format!("failed to declare exchange {exchange}: {e}"))
            })?;

        info!(exchange = %exchange, "Connected to RabbitMQ");

        Ok(Self {
            connection,
            channel,
            exchange: exchange.to_string(),
            queue_prefix: exchange.to_string(),
        })
    }

    /// Builder method to change the prefix of subscription queue names.
    pub fn with_queue_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.queue_prefix = prefix.into();
        self
    }

    /// Whether the underlying connection is still up.
    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    /// Close the connection.
    pub async fn close(&self) -> Result<(), BusError> {
        self.connection
            .close(200, "shutdown")
            .await
            .map_err(|e| BusError::Connect(format!("failed to close connection: {e}")))?;
        info!("RabbitMQ connection closed");
        Ok(())
    }

    fn queue_name(&self, pattern: &str) -> String {
        let pattern = pattern.replace('*', "star").replace('#', "hash");
        format!("{}.{}", self.queue_prefix, pattern)
    }
}

/// Only a broker nack fails the publish.
fn check_confirmation(topic: &str, confirmation: &Confirmation) -> Result<(), BusError> {
    if confirmation.is_nack() {
        return Err(BusError::Publish {
            topic: topic.to_string(),
            reason: "broker nacked the message".to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl MessageBus for AmqpBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let publish_err = |e: lapin::Error| BusError::Publish {
            topic: topic.to_string(),
            reason: e.to_string(),
        };

        let confirm = self
            .channel
            .basic_publish(
                &self.exchange,
                topic,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(2),
            )
            .await
            .map_err(publish_err)?;

        let confirmation = confirm.await.map_err(publish_err)?;
        check_confirmation(topic, &confirmation)?;

        debug!(topic = %topic, bytes = payload.len(), "Published");
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<Subscription, BusError> {
        TopicPattern::parse(pattern)?;
        let subscribe_err = |e: lapin::Error| BusError::Subscribe {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        };

        let queue_name = self.queue_name(pattern);
        self.channel
            .queue_declare(
                &queue_name,
                QueueDeclareOptions {
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(subscribe_err)?;

        self.channel
            .queue_bind(
                &queue_name,
                &self.exchange,
                pattern,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(subscribe_err)?;

        let mut consumer = self
            .channel
            .basic_consume(
                &queue_name,
                "",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(subscribe_err)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let queue = queue_name.clone();
        tokio::spawn(async move {
            while let Some(next) = consumer.next().await {
                match next {
                    Ok(delivery) => {
                        let forwarded = Delivery {
                            topic: delivery.routing_key.as_str().to_string(),
                            payload: delivery.data.clone(),
                        };
                        if tx.send(forwarded).is_err() {
                            // Subscriber gone: hand the message back to the broker.
                            let requeue = BasicNackOptions {
                                requeue: true,
                                ..Default::default()
                            };
                            if let Err(e) = delivery.nack(requeue).await {
                                warn!(queue = %queue, error = %e, "Failed to nack delivery");
                            }
                            debug!(queue = %queue, "Subscriber dropped, stopping consumer");
                            break;
                        }

                        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                            warn!(queue = %queue, error = %e, "Failed to ack delivery");
                        }
                    }
                    Err(e) => {
                        error!(queue = %queue, error = %e, "Consumer error");
                        break;
                    }
                }
            }
        });

        info!(queue = %queue_name, pattern = %pattern, "Subscribed");
        Ok(Subscription::new(pattern, rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nack_fails_publish() {
        let err = check_confirmation("task.quiz", &Confirmation::Nack(None)).unwrap_err();
        assert!(matches!(err, BusError::Publish { topic, .. } if topic == "task.quiz"));
    }

    #[test]
    fn test_ack_passes() {
        assert!(check_confirmation("task.quiz", &Confirmation::Ack(None)).is_ok());
    }
}
