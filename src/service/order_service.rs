use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{NewOrder, Order, OrderCreatedEvent, OrderServiceError};
use crate::metrics::Metrics;
use crate::outbox::{OutboxPublisher, OutboxTransaction, PublishOutcome};
use crate::store::{OrderStore, StoreError};

// ============================================================================
// Order Creation Service
// ============================================================================
//
// Single entry point for creating orders. Guarantees:
// - idempotency: one row per (user, idempotency key), however often retried
// - commit-then-publish: the event goes to the broker only after the row
//   durably committed; a publish failure never rolls the order back
//
// Correctness under concurrent same-key creates rests entirely on the
// store's unique index; the loser of an insert race re-queries and returns
// the winner's row.
//
// ============================================================================

const DEFAULT_DB_TIMEOUT: Duration = Duration::from_secs(5);

pub struct OrderService {
    store: Arc<dyn OrderStore>,
    publisher: Arc<OutboxPublisher>,
    metrics: Arc<Metrics>,
    db_timeout: Duration,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        publisher: Arc<OutboxPublisher>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            publisher,
            metrics,
            db_timeout: DEFAULT_DB_TIMEOUT,
        }
    }

    pub fn with_db_timeout(mut self, db_timeout: Duration) -> Self {
        self.db_timeout = db_timeout;
        self
    }

    /// Create an order, or return the existing one for this
    /// (user, idempotency key) pair. Safe to call any number of times with
    /// the same arguments.
    pub async fn create_order(
        &self,
        user_id: i64,
        idempotency_key: &str,
    ) -> Result<Order, OrderServiceError> {
        if user_id <= 0 {
            return Err(OrderServiceError::InvalidArgument(
                "user id must be positive",
            ));
        }
        if idempotency_key.trim().is_empty() {
            return Err(OrderServiceError::InvalidArgument(
                "idempotency key must not be blank",
            ));
        }

        let timer = self.metrics.create_order_duration.start_timer();
        let result = self.create_order_inner(user_id, idempotency_key).await;
        timer.observe_duration();

        if matches!(result, Err(ref e) if e.retryable()) {
            self.metrics.order_creation_failures.inc();
        }

        result
    }

    async fn create_order_inner(
        &self,
        user_id: i64,
        idempotency_key: &str,
    ) -> Result<Order, OrderServiceError> {
        // Fast path: a retry of an already-committed create.
        if let Some(existing) = self
            .bounded(self.store.find_by_user_and_key(user_id, idempotency_key))
            .await
            .map_err(creation_failed)?
        {
            self.metrics.idempotent_hits.inc();
            tracing::info!(
                order_id = existing.id,
                order_number = %existing.order_number,
                user_id = user_id,
                "Returning existing order for idempotency key"
            );
            return Ok(existing);
        }

        let tx = self
            .bounded(self.store.begin())
            .await
            .map_err(creation_failed)?;
        let mut outbox = OutboxTransaction::new(tx);

        let new_order = NewOrder::create(user_id, idempotency_key);
        let inserted = self
            .bounded(outbox.store_tx()?.insert_order(new_order))
            .await;

        let order = match inserted {
            Ok(order) => order,
            Err(StoreError::DuplicateIdempotencyKey) => {
                // Lost the insert race against a concurrent create with the
                // same key; the winner's row is committed by now.
                let _ = outbox.rollback().await;
                return self.resolve_idempotency_conflict(user_id, idempotency_key).await;
            }
            Err(error) => {
                let _ = outbox.rollback().await;
                tracing::error!(
                    user_id = user_id,
                    error = %error,
                    "Failed to persist order"
                );
                return Err(creation_failed(error));
            }
        };

        let event = OrderCreatedEvent::from_order(&order);
        outbox.stage(event)?;

        // Point of no return. After this the order exists regardless of
        // what the broker does.
        let outcome = outbox
            .commit(self.publisher.as_ref())
            .await
            .map_err(|error| match error {
                crate::outbox::OutboxError::Store(store_error) => creation_failed(store_error),
                other => OrderServiceError::Outbox(other),
            })?;

        self.metrics.orders_created.inc();
        tracing::info!(
            order_id = order.id,
            order_number = %order.order_number,
            user_id = user_id,
            "Order created"
        );

        if outcome == PublishOutcome::DeadLettered {
            tracing::warn!(
                order_id = order.id,
                "Order stands committed with undelivered event; see failed_publishes"
            );
        }

        Ok(order)
    }

    async fn resolve_idempotency_conflict(
        &self,
        user_id: i64,
        idempotency_key: &str,
    ) -> Result<Order, OrderServiceError> {
        self.metrics.idempotency_conflicts_resolved.inc();
        tracing::info!(
            user_id = user_id,
            "Idempotency key conflict detected, resolving by re-query"
        );

        match self
            .bounded(self.store.find_by_user_and_key(user_id, idempotency_key))
            .await
            .map_err(creation_failed)?
        {
            Some(existing) => Ok(existing),
            // The winner rolled back after we lost to it. The caller can
            // retry and will take the normal create path.
            None => Err(OrderServiceError::CreationFailed(
                "idempotency conflict detected but no committed order found".to_string(),
            )),
        }
    }

    pub async fn get_order(&self, id: i64) -> Result<Order, OrderServiceError> {
        self.bounded(self.store.find_by_id(id))
            .await
            .map_err(creation_failed)?
            .ok_or_else(|| OrderServiceError::NotFound(format!("order {id}")))
    }

    pub async fn get_order_by_number(&self, order_number: &str) -> Result<Order, OrderServiceError> {
        self.bounded(self.store.find_by_order_number(order_number))
            .await
            .map_err(creation_failed)?
            .ok_or_else(|| OrderServiceError::NotFound(format!("order number {order_number}")))
    }

    pub async fn count_orders(&self, user_id: i64) -> Result<i64, OrderServiceError> {
        self.bounded(self.store.count_by_user(user_id))
            .await
            .map_err(creation_failed)
    }

    /// Bound a store call so a hung database fails the request as
    /// retryable instead of hanging the caller. Only pre-commit work runs
    /// under this; the post-commit publish has its own timeout.
    async fn bounded<T>(
        &self,
        operation: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.db_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        }
    }
}

fn creation_failed(error: StoreError) -> OrderServiceError {
    OrderServiceError::CreationFailed(error.to_string())
}
