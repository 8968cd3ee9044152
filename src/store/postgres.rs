use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::domain::{NewOrder, Order, OrderStatus};

use super::{OrderStore, OrderTransaction, StoreError};

// ============================================================================
// Postgres Order Store
// ============================================================================
//
// The unique indexes declared in migrations/0001_create_orders.sql are the
// sole arbiter for concurrent same-key creates. Constraint names are part
// of the contract here: insert errors are classified by them.
//
// ============================================================================

const UQ_USER_IDEMPOTENCY_KEY: &str = "uq_orders_user_idempotency_key";
const UQ_ORDER_NUMBER: &str = "uq_orders_order_number";

const ORDER_COLUMNS: &str =
    "id, user_id, status, order_number, idempotency_key, created_at, updated_at";

#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn find_by_user_and_key(
        &self,
        user_id: i64,
        idempotency_key: &str,
    ) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 AND idempotency_key = $2"
        ))
        .bind(user_id)
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        row.as_ref().map(row_to_order).transpose()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        row.as_ref().map(row_to_order).transpose()
    }

    async fn find_by_order_number(&self, order_number: &str) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1"
        ))
        .bind(order_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        row.as_ref().map(row_to_order).transpose()
    }

    async fn count_by_user(&self, user_id: i64) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(count)
    }

    async fn begin(&self) -> Result<Box<dyn OrderTransaction>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Box::new(PgOrderTransaction { tx }))
    }
}

pub struct PgOrderTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl OrderTransaction for PgOrderTransaction {
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO orders (user_id, status, order_number, idempotency_key, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $5) \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order.user_id)
        .bind(order.status.as_str())
        .bind(&order.order_number)
        .bind(&order.idempotency_key)
        .bind(order.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_insert_error)?;

        let order = row_to_order(&row)?;

        tracing::debug!(
            order_id = order.id,
            order_number = %order.order_number,
            user_id = order.user_id,
            "Inserted order row"
        );

        Ok(order)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

/// Classify a unique violation (SQLSTATE 23505) by constraint name.
fn classify_unique_violation(constraint: Option<&str>) -> Option<StoreError> {
    match constraint {
        Some(UQ_USER_IDEMPOTENCY_KEY) => Some(StoreError::DuplicateIdempotencyKey),
        Some(UQ_ORDER_NUMBER) => Some(StoreError::DuplicateOrderNumber),
        _ => None,
    }
}

fn map_insert_error(error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_error) = &error {
        if db_error.code().as_deref() == Some("23505") {
            if let Some(classified) = classify_unique_violation(db_error.constraint()) {
                return classified;
            }
        }
    }
    StoreError::Database(error.to_string())
}

fn row_to_order(row: &PgRow) -> Result<Order, StoreError> {
    let status_text: String = row.get("status");
    let status = OrderStatus::parse(&status_text).map_err(StoreError::Database)?;

    Ok(Order {
        id: row.get("id"),
        user_id: row.get("user_id"),
        status,
        order_number: row.get("order_number"),
        idempotency_key: row.get("idempotency_key"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
