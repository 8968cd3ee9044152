// ============================================================================
// Persistence Boundary
// ============================================================================
//
// The service depends on these narrow contracts, not on a storage engine.
// The Postgres implementations live in postgres.rs / dead_letters.rs; tests
// run against in-memory fakes with the same constraint semantics.
//
// ============================================================================

pub mod dead_letters;
pub mod postgres;

use async_trait::async_trait;

use crate::domain::{NewOrder, Order};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Another order already holds this (user, idempotency key) pair. The
    /// expected signal of a concurrent retry racing the idempotency check.
    #[error("duplicate idempotency key for user")]
    DuplicateIdempotencyKey,

    /// Order number collision. UUID-based, so astronomically unlikely; a
    /// hard failure rather than a race to resolve.
    #[error("duplicate order number")]
    DuplicateOrderNumber,

    #[error("database error: {0}")]
    Database(String),

    #[error("database operation timed out")]
    Timeout,
}

/// Lookup half of the order repository. Point lookups use the same unique
/// index the insert path relies on, so a lookup racing an insert sees the
/// index's own consistency guarantee and nothing weaker.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_by_user_and_key(
        &self,
        user_id: i64,
        idempotency_key: &str,
    ) -> Result<Option<Order>, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Order>, StoreError>;

    async fn find_by_order_number(&self, order_number: &str) -> Result<Option<Order>, StoreError>;

    async fn count_by_user(&self, user_id: i64) -> Result<i64, StoreError>;

    /// Open a transaction. Dropping the returned handle without committing
    /// rolls it back.
    async fn begin(&self) -> Result<Box<dyn OrderTransaction>, StoreError>;
}

/// Write half, scoped to one open transaction.
#[async_trait]
pub trait OrderTransaction: Send {
    /// Insert the order and return the persisted row with its
    /// server-assigned id. Unique-constraint violations are reported
    /// distinctly so the caller can tell an idempotency race from an order
    /// number collision.
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
