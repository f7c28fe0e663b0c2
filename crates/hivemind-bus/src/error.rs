//! Bus errors.

use thiserror::Error;

/// Errors raised by bus implementations.
#[derive(Debug, Error)]
pub enum BusError {
    /// Broker unreachable or handshake failed.
    #[error("Failed to connect to broker: {0}")]
    Connect(String),

    /// Publish was rejected or not confirmed.
    #[error("Failed to publish on '{topic}': {reason}")]
    Publish { topic: String, reason: String },

    /// Subscription could not be set up.
    #[error("Failed to subscribe to '{pattern}': {reason}")]
    Subscribe { pattern: String, reason: String },

    /// Pattern or topic is not a valid dotted name.
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    /// Payload could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(String),
}

impl From<serde_json::Error> for BusError {
    fn from(e: serde_json::Error) -> Self {
        Self::Codec(e.to_string())
    }
}
