// ============================================================================
// Services
// ============================================================================

pub mod notification;
pub mod order_service;

pub use notification::{NotificationError, NotificationSender, NotificationService, SimulatedSender};
pub use order_service::OrderService;
