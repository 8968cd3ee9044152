use std::sync::Arc;

use futures_util::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;

use crate::domain::OrderCreatedEvent;
use crate::metrics::Metrics;
use crate::service::NotificationService;

use super::BrokerError;

// ============================================================================
// Notification Consumer
// ============================================================================
//
// Subscribes to the order events topic and dispatches email/SMS sends for
// each OrderCreatedEvent. Offsets are committed manually AFTER handling, so
// delivery is at-least-once; the handler tolerates duplicate events.
// Undecodable payloads are counted and skipped rather than wedging the
// partition.
//
// ============================================================================

pub struct NotificationConsumer {
    consumer: StreamConsumer,
    notifications: Arc<NotificationService>,
    metrics: Arc<Metrics>,
}

impl NotificationConsumer {
    pub fn new(
        brokers: &str,
        group_id: &str,
        topic: &str,
        notifications: Arc<NotificationService>,
        metrics: Arc<Metrics>,
    ) -> Result<Self, BrokerError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| BrokerError::Subscribe {
                topic: topic.to_string(),
                reason: format!("failed to create consumer: {e}"),
            })?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| BrokerError::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            topic = %topic,
            consumer_group = %group_id,
            manual_commit = true,
            "Notification consumer subscribed"
        );

        Ok(Self {
            consumer,
            notifications,
            metrics,
        })
    }

    /// Consume until the stream ends or the task is aborted.
    pub async fn run(self) {
        let mut stream = self.consumer.stream();

        while let Some(result) = stream.next().await {
            match result {
                Ok(message) => {
                    match message.payload() {
                        Some(payload) => {
                            handle_order_created(payload, &self.notifications, &self.metrics)
                                .await;
                        }
                        None => {
                            tracing::warn!("Skipping order event with empty payload");
                            self.metrics.events_invalid.inc();
                        }
                    }

                    // Commit after handling; a crash before this line means
                    // redelivery, never loss.
                    if let Err(error) = self.consumer.commit_message(&message, CommitMode::Async) {
                        tracing::error!(error = %error, "Failed to commit consumer offset");
                    }
                }
                Err(error) => {
                    tracing::error!(error = %error, "Kafka consumer error");
                }
            }
        }
    }
}

/// Decode and dispatch one order event payload.
pub(crate) async fn handle_order_created(
    payload: &[u8],
    notifications: &NotificationService,
    metrics: &Metrics,
) {
    let event: OrderCreatedEvent = match serde_json::from_slice(payload) {
        Ok(event) => event,
        Err(error) => {
            tracing::error!(error = %error, "Discarding undecodable order event");
            metrics.events_invalid.inc();
            return;
        }
    };

    if event.user_id <= 0 {
        tracing::error!(
            order_id = event.order_id,
            user_id = event.user_id,
            "Discarding order event with invalid user id"
        );
        metrics.events_invalid.inc();
        return;
    }

    tracing::info!(
        order_id = event.order_id,
        order_number = %event.order_number,
        user_id = event.user_id,
        "Received order created event"
    );

    match notifications.notify_order_created(&event).await {
        Ok(()) => {
            metrics.events_consumed.inc();
        }
        Err(error) => {
            metrics.event_handling_failures.inc();
            tracing::error!(
                order_id = event.order_id,
                error = %error,
                "Failed to dispatch notifications for order event"
            );
        }
    }
}
