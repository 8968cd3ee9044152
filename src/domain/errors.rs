// ============================================================================
// Order Service Errors
// ============================================================================

/// Caller-facing errors for the order creation service.
///
/// Publishing failures are deliberately absent: an order whose event could
/// not be delivered is still a successfully created order. Those failures
/// surface through logs, metrics, and the failed_publishes dead-letter
/// table instead.
#[derive(Debug, thiserror::Error)]
pub enum OrderServiceError {
    /// Malformed input. The caller must fix the request; retrying the same
    /// arguments can never succeed.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Persistence failed for a reason other than an idempotency-key race.
    /// Safe to retry with backoff.
    #[error("order creation failed: {0}")]
    CreationFailed(String),

    #[error("order not found: {0}")]
    NotFound(String),

    /// Outbox misuse, e.g. staging against a finished transaction. This is
    /// a wiring bug, not a runtime condition to retry.
    #[error(transparent)]
    Outbox(#[from] crate::outbox::OutboxError),
}

impl OrderServiceError {
    /// Whether the caller may retry the same request and expect it to
    /// eventually succeed.
    pub fn retryable(&self) -> bool {
        matches!(self, Self::CreationFailed(_))
    }
}
