use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::order::{Order, OrderStatus};

// ============================================================================
// Order Created Event
// ============================================================================
//
// Immutable event published after an order transaction commits. The JSON
// field names and formats are a stable contract with downstream notification
// consumers; do not rename fields without versioning the topic.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedEvent {
    pub order_id: i64,
    pub user_id: i64,
    pub order_number: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl OrderCreatedEvent {
    /// Snapshot the persisted order. Carries enough context for downstream
    /// consumers to act without a database lookup.
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id,
            user_id: order.user_id,
            order_number: order.order_number.clone(),
            status: order.status,
            created_at: order.created_at,
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
