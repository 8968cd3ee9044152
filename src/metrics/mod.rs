mod server;

use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
};

pub use server::start_metrics_server;

// ============================================================================
// Metrics - Prometheus observability for the order pipeline
// ============================================================================
//
// Counters and histograms for:
// - Order creation (created, idempotent hits, resolved races, failures)
// - Event publication (published, retries, terminal failures, dead letters)
// - Event consumption and notification dispatch per channel
//
// All metrics register against one Registry scraped via /metrics.
//
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Order creation
    pub orders_created: IntCounter,
    pub idempotent_hits: IntCounter,
    pub idempotency_conflicts_resolved: IntCounter,
    pub order_creation_failures: IntCounter,
    pub create_order_duration: Histogram,

    // Event publication
    pub events_published: IntCounter,
    pub event_publish_retries: IntCounter,
    pub event_publish_failures: IntCounter,
    pub events_dead_lettered: IntCounter,

    // Event consumption
    pub events_consumed: IntCounter,
    pub events_invalid: IntCounter,
    pub event_handling_failures: IntCounter,

    // Notification dispatch
    pub notifications_sent: IntCounterVec,
    pub notification_failures: IntCounterVec,
    pub notification_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let orders_created =
            IntCounter::new("orders_created_total", "Total orders created")?;
        registry.register(Box::new(orders_created.clone()))?;

        let idempotent_hits = IntCounter::new(
            "orders_idempotent_hits_total",
            "Create requests answered from an existing idempotency key",
        )?;
        registry.register(Box::new(idempotent_hits.clone()))?;

        let idempotency_conflicts_resolved = IntCounter::new(
            "orders_idempotency_conflicts_resolved_total",
            "Insert races lost and resolved by re-query",
        )?;
        registry.register(Box::new(idempotency_conflicts_resolved.clone()))?;

        let order_creation_failures = IntCounter::new(
            "orders_creation_failures_total",
            "Order creation attempts that failed with a retryable error",
        )?;
        registry.register(Box::new(order_creation_failures.clone()))?;

        let create_order_duration = Histogram::with_opts(
            HistogramOpts::new(
                "orders_create_duration_seconds",
                "End-to-end create order duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(create_order_duration.clone()))?;

        let events_published = IntCounter::new(
            "order_events_published_total",
            "Order events confirmed by the broker",
        )?;
        registry.register(Box::new(events_published.clone()))?;

        let event_publish_retries = IntCounter::new(
            "order_events_publish_retries_total",
            "Publish attempts beyond the first",
        )?;
        registry.register(Box::new(event_publish_retries.clone()))?;

        let event_publish_failures = IntCounter::new(
            "order_events_publish_failures_total",
            "Events that could not be delivered after all retries",
        )?;
        registry.register(Box::new(event_publish_failures.clone()))?;

        let events_dead_lettered = IntCounter::new(
            "order_events_dead_lettered_total",
            "Undeliverable events recorded in failed_publishes",
        )?;
        registry.register(Box::new(events_dead_lettered.clone()))?;

        let events_consumed = IntCounter::new(
            "order_events_consumed_total",
            "Order events handled by the notification consumer",
        )?;
        registry.register(Box::new(events_consumed.clone()))?;

        let events_invalid = IntCounter::new(
            "order_events_invalid_total",
            "Order events discarded as undecodable or malformed",
        )?;
        registry.register(Box::new(events_invalid.clone()))?;

        let event_handling_failures = IntCounter::new(
            "order_events_handling_failures_total",
            "Order events whose notification dispatch failed",
        )?;
        registry.register(Box::new(event_handling_failures.clone()))?;

        let notifications_sent = IntCounterVec::new(
            Opts::new("notifications_sent_total", "Notifications delivered"),
            &["channel"],
        )?;
        registry.register(Box::new(notifications_sent.clone()))?;

        let notification_failures = IntCounterVec::new(
            Opts::new(
                "notification_failures_total",
                "Notifications that failed after all retries",
            ),
            &["channel"],
        )?;
        registry.register(Box::new(notification_failures.clone()))?;

        let notification_duration = HistogramVec::new(
            HistogramOpts::new(
                "notification_duration_seconds",
                "Notification dispatch duration including retries",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["channel"],
        )?;
        registry.register(Box::new(notification_duration.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            idempotent_hits,
            idempotency_conflicts_resolved,
            order_creation_failures,
            create_order_duration,
            events_published,
            event_publish_retries,
            event_publish_failures,
            events_dead_lettered,
            events_consumed,
            events_invalid,
            event_handling_failures,
            notifications_sent,
            notification_failures,
            notification_duration,
        })
    }

    /// Registry handle for the /metrics endpoint.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
