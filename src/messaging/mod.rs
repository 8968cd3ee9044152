// ============================================================================
// Broker Boundary
// ============================================================================
//
// The core publishes through the EventBroker contract and never sees rdkafka
// types. The Kafka implementation lives in kafka.rs; the notification
// consumer half in consumer.rs.
//
// ============================================================================

pub mod consumer;
pub mod kafka;

use async_trait::async_trait;

pub use consumer::NotificationConsumer;
pub use kafka::KafkaBroker;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    #[error("failed to connect to broker: {0}")]
    Connect(String),

    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("subscribe to {topic} failed: {reason}")]
    Subscribe { topic: String, reason: String },
}

/// Publish-with-confirmation primitive. An `Ok` return means the broker
/// acknowledged durable receipt of the message; anything weaker must be
/// reported as an error so the outbox can retry.
#[async_trait]
pub trait EventBroker: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), BrokerError>;
}
