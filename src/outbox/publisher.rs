use std::sync::Arc;

use chrono::Utc;

use crate::domain::OrderCreatedEvent;
use crate::messaging::EventBroker;
use crate::metrics::Metrics;
use crate::store::dead_letters::{DeadLetterStore, FailedPublish};
use crate::utils::{with_retries, RetryPolicy};

// ============================================================================
// Outbox Publisher
// ============================================================================

/// What happened to an event after its owning transaction committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Broker confirmed delivery.
    Delivered,
    /// Retries exhausted; the event was recorded in failed_publishes for
    /// out-of-band recovery. The order itself stands committed.
    DeadLettered,
    /// Nothing was staged on the transaction.
    NothingStaged,
}

/// Serializes events to the wire format and sends them to the broker with
/// bounded exponential-backoff retries. Terminal failures are logged,
/// counted, and dead-lettered; they are never propagated to the caller of
/// the order creation path.
pub struct OutboxPublisher {
    broker: Arc<dyn EventBroker>,
    topic: String,
    retry: RetryPolicy,
    metrics: Arc<Metrics>,
    dead_letters: Arc<dyn DeadLetterStore>,
}

impl OutboxPublisher {
    pub fn new(
        broker: Arc<dyn EventBroker>,
        topic: String,
        retry: RetryPolicy,
        metrics: Arc<Metrics>,
        dead_letters: Arc<dyn DeadLetterStore>,
    ) -> Self {
        Self {
            broker,
            topic,
            retry,
            metrics,
            dead_letters,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish one committed event. The order number doubles as the
    /// partition key so redeliveries for the same order stay ordered.
    pub async fn publish(&self, event: &OrderCreatedEvent) -> PublishOutcome {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(error) => {
                // Serialization of a plain struct failing means a bug, but
                // the order is already committed; record what we can.
                tracing::error!(
                    order_id = event.order_id,
                    error = %error,
                    "Failed to serialize order created event"
                );
                self.metrics.event_publish_failures.inc();
                self.dead_letter(event, format!("serialization failed: {error}"), 0)
                    .await;
                return PublishOutcome::DeadLettered;
            }
        };

        let send = with_retries(&self.retry, "publish_order_created", |attempt| {
            if attempt > 1 {
                self.metrics.event_publish_retries.inc();
            }
            let payload = payload.as_bytes();
            async move {
                self.broker
                    .publish(&self.topic, &event.order_number, payload)
                    .await
            }
        })
        .await;

        match send {
            Ok(()) => {
                self.metrics.events_published.inc();
                tracing::info!(
                    order_id = event.order_id,
                    order_number = %event.order_number,
                    topic = %self.topic,
                    "✅ Order created event published"
                );
                PublishOutcome::Delivered
            }
            Err(error) => {
                self.metrics.event_publish_failures.inc();
                tracing::error!(
                    order_id = event.order_id,
                    order_number = %event.order_number,
                    topic = %self.topic,
                    error = %error,
                    "Order committed but its event could not be delivered"
                );
                self.dead_letter_payload(event, payload, error.to_string())
                    .await;
                PublishOutcome::DeadLettered
            }
        }
    }

    async fn dead_letter(&self, event: &OrderCreatedEvent, error: String, attempts: u32) {
        let failure = FailedPublish {
            order_id: event.order_id,
            topic: self.topic.clone(),
            payload: format!("{event:?}"),
            error_message: error,
            attempts,
            failed_at: Utc::now(),
        };
        self.record(failure).await;
    }

    async fn dead_letter_payload(&self, event: &OrderCreatedEvent, payload: String, error: String) {
        let failure = FailedPublish {
            order_id: event.order_id,
            topic: self.topic.clone(),
            payload,
            error_message: error,
            attempts: self.retry.max_attempts,
            failed_at: Utc::now(),
        };
        self.record(failure).await;
    }

    async fn record(&self, failure: FailedPublish) {
        self.metrics.events_dead_lettered.inc();
        if let Err(error) = self.dead_letters.record(failure).await {
            // Both the broker and the dead letter store are down; the log
            // line is the last remaining trace of this event.
            tracing::error!(error = %error, "Failed to record dead-lettered event");
        }
    }
}
