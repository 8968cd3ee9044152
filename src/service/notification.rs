use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::OrderCreatedEvent;
use crate::metrics::Metrics;
use crate::utils::{with_retries, RetryPolicy};

// ============================================================================
// Notification Service
// ============================================================================
//
// Dispatches the customer-facing sends for a consumed order event. Senders
// are simulated; swapping in a real provider means implementing
// NotificationSender against its API. Each channel is attempted
// independently with bounded retries so a failing SMS gateway does not
// block email delivery.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    #[error("{channel} delivery to user {user_id} failed: {reason}")]
    Delivery {
        channel: &'static str,
        user_id: i64,
        reason: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Channel {
    Email,
    Sms,
}

impl Channel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
        }
    }
}

/// Outbound delivery boundary. Implementations talk to a provider; the
/// service owns retries and metrics.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send_email(&self, user_id: i64, message: &str) -> Result<(), NotificationError>;

    async fn send_sms(&self, user_id: i64, message: &str) -> Result<(), NotificationError>;
}

/// Stand-in for a real provider integration (SendGrid, SES, Twilio, ...).
/// Logs the send and reports success.
pub struct SimulatedSender;

#[async_trait]
impl NotificationSender for SimulatedSender {
    async fn send_email(&self, user_id: i64, message: &str) -> Result<(), NotificationError> {
        tracing::info!(
            user_id = user_id,
            message_len = message.len(),
            "Sending email notification"
        );
        Ok(())
    }

    async fn send_sms(&self, user_id: i64, message: &str) -> Result<(), NotificationError> {
        tracing::info!(
            user_id = user_id,
            message = %message,
            "Sending SMS notification"
        );
        Ok(())
    }
}

pub struct NotificationService {
    sender: Arc<dyn NotificationSender>,
    retry: RetryPolicy,
    metrics: Arc<Metrics>,
}

impl NotificationService {
    pub fn new(
        sender: Arc<dyn NotificationSender>,
        retry: RetryPolicy,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            sender,
            retry,
            metrics,
        }
    }

    /// Send the order-created notifications over every channel. Both
    /// channels are always attempted; the first failure (if any) is
    /// returned after the second channel had its chance.
    pub async fn notify_order_created(
        &self,
        event: &OrderCreatedEvent,
    ) -> Result<(), NotificationError> {
        let message = format!(
            "Your order {} has been created! Order ID: {}",
            event.order_number, event.order_id
        );

        let email = self.dispatch(Channel::Email, event.user_id, &message).await;
        let sms = self.dispatch(Channel::Sms, event.user_id, &message).await;

        email.and(sms)
    }

    async fn dispatch(
        &self,
        channel: Channel,
        user_id: i64,
        message: &str,
    ) -> Result<(), NotificationError> {
        let label = channel.as_str();
        let timer = self
            .metrics
            .notification_duration
            .with_label_values(&[label])
            .start_timer();

        let result = with_retries(&self.retry, label, |_attempt| async move {
            match channel {
                Channel::Email => self.sender.send_email(user_id, message).await,
                Channel::Sms => self.sender.send_sms(user_id, message).await,
            }
        })
        .await;

        timer.observe_duration();

        match &result {
            Ok(()) => {
                self.metrics
                    .notifications_sent
                    .with_label_values(&[label])
                    .inc();
                tracing::info!(
                    user_id = user_id,
                    channel = label,
                    "Notification sent"
                );
            }
            Err(error) => {
                self.metrics
                    .notification_failures
                    .with_label_values(&[label])
                    .inc();
                tracing::error!(
                    user_id = user_id,
                    channel = label,
                    error = %error,
                    "Notification delivery failed after retries"
                );
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderStatus;
    use crate::testsupport::RecordingSender;
    use chrono::Utc;
    use std::time::Duration;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
            multiplier: 2.0,
            max_delay: Duration::from_millis(20),
        }
    }

    fn sample_event() -> OrderCreatedEvent {
        OrderCreatedEvent {
            order_id: 3,
            user_id: 42,
            order_number: "ORD-3".to_string(),
            status: OrderStatus::Created,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_notifies_both_channels() {
        let sender = Arc::new(RecordingSender::default());
        let metrics = Arc::new(Metrics::new().unwrap());
        let service = NotificationService::new(sender.clone(), fast_policy(), metrics.clone());

        service.notify_order_created(&sample_event()).await.unwrap();

        let sent = sender.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, "email");
        assert_eq!(sent[1].0, "sms");
        assert!(sent[0].2.contains("ORD-3"));
        assert!(sent[0].2.contains("Order ID: 3"));
        assert_eq!(metrics.notifications_sent.with_label_values(&["email"]).get(), 1);
        assert_eq!(metrics.notifications_sent.with_label_values(&["sms"]).get(), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_sender_failure() {
        let sender = Arc::new(RecordingSender::default());
        sender.fail_email_times(2);
        let metrics = Arc::new(Metrics::new().unwrap());
        let service = NotificationService::new(sender.clone(), fast_policy(), metrics.clone());

        service.notify_order_created(&sample_event()).await.unwrap();

        // 2 failed email attempts + 1 success + 1 sms
        assert_eq!(sender.attempts(), 4);
        assert_eq!(sender.sent().len(), 2);
        assert_eq!(
            metrics.notification_failures.with_label_values(&["email"]).get(),
            0
        );
    }

    #[tokio::test]
    async fn test_sms_still_attempted_when_email_exhausts_retries() {
        let sender = Arc::new(RecordingSender::default());
        sender.fail_email_times(5);
        let metrics = Arc::new(Metrics::new().unwrap());
        let service = NotificationService::new(sender.clone(), fast_policy(), metrics.clone());

        let err = service
            .notify_order_created(&sample_event())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            NotificationError::Delivery { channel: "email", .. }
        ));
        // SMS went out despite the email failure.
        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "sms");
        assert_eq!(
            metrics.notification_failures.with_label_values(&["email"]).get(),
            1
        );
        assert_eq!(metrics.notifications_sent.with_label_values(&["sms"]).get(), 1);
    }
}
