use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Order Model
// ============================================================================

/// A persisted order row. The id is server-assigned by the store and the
/// order number is immutable once assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub status: OrderStatus,
    pub order_number: String,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Field values for an order that has not been persisted yet.
/// The store assigns the id on insert.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: i64,
    pub status: OrderStatus,
    pub order_number: String,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    /// Build a fresh order in the initial status with a newly generated
    /// order number. Timestamps are taken here so the published event
    /// matches the persisted row without a re-read.
    pub fn create(user_id: i64, idempotency_key: &str) -> Self {
        Self {
            user_id,
            status: OrderStatus::Created,
            order_number: generate_order_number(),
            idempotency_key: idempotency_key.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Globally unique, human-readable order number.
pub fn generate_order_number() -> String {
    format!("ORD-{}", Uuid::new_v4())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Database text representation. Matches the wire spelling so the
    /// stored value and the published value never diverge.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Shipped => "SHIPPED",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "CREATED" => Ok(Self::Created),
            "PENDING" => Ok(Self::Pending),
            "CONFIRMED" => Ok(Self::Confirmed),
            "SHIPPED" => Ok(Self::Shipped),
            "DELIVERED" => Ok(Self::Delivered),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(format!("unknown order status: {s}")),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            OrderStatus::Created,
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            let parsed = OrderStatus::parse(status.as_str()).unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn test_status_parse_rejects_unknown() {
        assert!(OrderStatus::parse("SHINY").is_err());
        assert!(OrderStatus::parse("created").is_err());
    }

    #[test]
    fn test_status_wire_spelling() {
        let json = serde_json::to_string(&OrderStatus::Created).unwrap();
        assert_eq!(json, "\"CREATED\"");
    }

    #[test]
    fn test_order_number_format() {
        let number = generate_order_number();
        let suffix = number.strip_prefix("ORD-").expect("ORD- prefix");
        assert!(Uuid::parse_str(suffix).is_ok());
    }

    #[test]
    fn test_order_numbers_are_distinct() {
        let a = generate_order_number();
        let b = generate_order_number();
        assert_ne!(a, b);
    }

    #[test]
    fn test_new_order_defaults() {
        let new_order = NewOrder::create(42, "key-A");
        assert_eq!(new_order.user_id, 42);
        assert_eq!(new_order.status, OrderStatus::Created);
        assert_eq!(new_order.idempotency_key, "key-A");
        assert!(new_order.order_number.starts_with("ORD-"));
    }
}
