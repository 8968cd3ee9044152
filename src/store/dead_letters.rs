use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use super::StoreError;

// ============================================================================
// Failed Publish Dead Letters
// ============================================================================
//
// Events that exhausted publish retries land here. The owning order is
// already committed at that point, so this table is the durable record an
// operator (or a reconciliation job) reads to re-deliver events out of
// band. Nothing in this process consumes it.
//
// ============================================================================

/// An event that could not be delivered to the broker after retries.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedPublish {
    pub order_id: i64,
    pub topic: String,
    pub payload: String,
    pub error_message: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

/// Sink for terminal publish failures.
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    async fn record(&self, failure: FailedPublish) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgDeadLetterStore {
    pool: PgPool,
}

impl PgDeadLetterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Most recent failures first, for operator inspection.
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<FailedPublish>, StoreError> {
        let rows = sqlx::query(
            "SELECT order_id, topic, payload, error_message, attempts, failed_at \
             FROM failed_publishes ORDER BY failed_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| FailedPublish {
                order_id: row.get("order_id"),
                topic: row.get("topic"),
                payload: row.get("payload"),
                error_message: row.get("error_message"),
                attempts: row.get::<i32, _>("attempts").max(0) as u32,
                failed_at: row.get("failed_at"),
            })
            .collect())
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM failed_publishes")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(count)
    }
}

#[async_trait]
impl DeadLetterStore for PgDeadLetterStore {
    async fn record(&self, failure: FailedPublish) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO failed_publishes (order_id, topic, payload, error_message, attempts, failed_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(failure.order_id)
        .bind(&failure.topic)
        .bind(&failure.payload)
        .bind(&failure.error_message)
        .bind(failure.attempts as i32)
        .bind(failure.failed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::warn!(
            order_id = failure.order_id,
            topic = %failure.topic,
            attempts = failure.attempts,
            error = %failure.error_message,
            "Recorded failed publish for out-of-band recovery"
        );

        Ok(())
    }
}
