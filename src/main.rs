use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod domain;
mod messaging;
mod metrics;
mod outbox;
mod service;
mod store;
#[cfg(test)]
mod testsupport;
mod utils;

use config::Config;
use messaging::{KafkaBroker, NotificationConsumer};
use metrics::Metrics;
use outbox::OutboxPublisher;
use service::{NotificationService, OrderService, SimulatedSender};
use store::dead_letters::PgDeadLetterStore;
use store::postgres::PgOrderStore;
use utils::RetryPolicy;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging with environment-based filtering; override with
    // RUST_LOG, e.g. RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_notify=debug")),
        )
        .init();

    tracing::info!("🚀 Starting order-notify");

    let config = Config::from_env()?;

    // === 1. Postgres pool + schema ===
    tracing::info!("Connecting to Postgres...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!().run(&pool).await?;

    // === 2. Prometheus metrics + scrape endpoint ===
    let metrics = Arc::new(Metrics::new()?);
    let registry = Arc::new(metrics.registry().clone());
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime.block_on(async {
            if let Err(error) = metrics::start_metrics_server(registry, metrics_port).await {
                tracing::error!(error = %error, "Metrics server error");
            }
        }),
        Err(error) => tracing::error!(error = %error, "Failed to start metrics runtime"),
    });

    // === 3. Kafka producer behind the outbox publisher ===
    let broker = Arc::new(KafkaBroker::new(&config.kafka_brokers)?);
    let dead_letters = Arc::new(PgDeadLetterStore::new(pool.clone()));
    let publisher = Arc::new(OutboxPublisher::new(
        broker,
        config.order_events_topic.clone(),
        RetryPolicy::default(),
        metrics.clone(),
        dead_letters.clone(),
    ));

    tracing::info!(topic = publisher.topic(), "Outbox publisher ready");

    // === 4. Order creation service ===
    let store = Arc::new(PgOrderStore::new(pool.clone()));
    let orders = OrderService::new(store, publisher, metrics.clone())
        .with_db_timeout(Duration::from_secs(5));

    // === 5. Notification consumer ===
    let sender = Arc::new(SimulatedSender);
    let notifications = Arc::new(NotificationService::new(
        sender,
        RetryPolicy::default(),
        metrics.clone(),
    ));
    let consumer = NotificationConsumer::new(
        &config.kafka_brokers,
        &config.consumer_group,
        &config.order_events_topic,
        notifications,
        metrics.clone(),
    )?;
    let consumer_task = tokio::spawn(consumer.run());

    // === 6. Exercise the creation path ===
    tracing::info!("📝 Demonstrating idempotent order creation with post-commit publish");

    let order = orders.create_order(42, "demo-key-A").await?;
    tracing::info!(
        order_id = order.id,
        order_number = %order.order_number,
        "✅ Order created"
    );

    let retried = orders.create_order(42, "demo-key-A").await?;
    tracing::info!(
        order_id = retried.id,
        same_order = retried.id == order.id,
        "✅ Retry with same idempotency key resolved to the same order"
    );

    let second = orders.create_order(42, "demo-key-B").await?;
    tracing::info!(
        order_id = second.id,
        order_number = %second.order_number,
        "✅ Distinct key produced a distinct order"
    );

    let fetched = orders.get_order(order.id).await?;
    tracing::info!(
        order_id = fetched.id,
        status = fetched.status.as_str(),
        "Order lookup by id"
    );

    let by_number = orders.get_order_by_number(&second.order_number).await?;
    let total = orders.count_orders(by_number.user_id).await?;
    tracing::info!(
        order_id = by_number.id,
        user_orders = total,
        "Order lookup by number"
    );

    tracing::info!("⏳ Waiting for notification consumer to drain...");
    tokio::time::sleep(Duration::from_secs(5)).await;

    let undelivered = dead_letters.count().await?;
    if undelivered > 0 {
        for failure in dead_letters.list_recent(10).await? {
            tracing::warn!(
                order_id = failure.order_id,
                attempts = failure.attempts,
                error = %failure.error_message,
                "Undelivered order event awaiting recovery"
            );
        }
    }
    tracing::info!(failed_publishes = undelivered, "🎉 Demo complete");

    consumer_task.abort();

    Ok(())
}
