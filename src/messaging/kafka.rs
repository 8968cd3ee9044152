use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;

use super::{BrokerError, EventBroker};

// ============================================================================
// Kafka Producer Client
// ============================================================================

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub struct KafkaBroker {
    producer: FutureProducer,
}

impl KafkaBroker {
    /// Create a producer that waits for acknowledgement from all in-sync
    /// replicas before confirming delivery. Retry policy lives in the
    /// outbox publisher, not here.
    pub fn new(brokers: &str) -> Result<Self, BrokerError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("acks", "all")
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| BrokerError::Connect(e.to_string()))?;

        tracing::info!(brokers = %brokers, acks = "all", "Kafka producer created");

        Ok(Self { producer })
    }
}

#[async_trait]
impl EventBroker for KafkaBroker {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        self.producer
            .send(record, Timeout::After(SEND_TIMEOUT))
            .await
            .map(|confirmation| {
                tracing::debug!(
                    topic = %topic,
                    key = %key,
                    confirmation = ?confirmation,
                    "Broker confirmed delivery"
                );
            })
            .map_err(|(error, _message)| BrokerError::Publish {
                topic: topic.to_string(),
                reason: error.to_string(),
            })
    }
}
