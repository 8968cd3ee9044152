// ============================================================================
// Test Support - In-Memory Fakes
// ============================================================================
//
// Fakes for the store, broker, dead-letter sink, and notification sender.
// The memory store reproduces the constraint semantics the service relies
// on: an insert against a key held by another open transaction waits until
// that transaction resolves, then fails with DuplicateIdempotencyKey if it
// committed. Failure injection knobs drive the unhappy paths.
//
// ============================================================================

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{NewOrder, Order};
use crate::messaging::{BrokerError, EventBroker};
use crate::metrics::Metrics;
use crate::outbox::OutboxPublisher;
use crate::service::{NotificationError, NotificationSender};
use crate::store::dead_letters::{DeadLetterStore, FailedPublish};
use crate::store::{OrderStore, OrderTransaction, StoreError};
use crate::utils::RetryPolicy;

// ============================================================================
// Memory Order Store
// ============================================================================

#[derive(Default)]
pub struct MemoryOrderStore {
    inner: Arc<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    state: Mutex<StoreState>,
    fail_next_insert: AtomicBool,
    fail_commits: AtomicBool,
    find_delay: Mutex<Option<Duration>>,
    insert_delay: Mutex<Option<Duration>>,
}

#[derive(Default)]
struct StoreState {
    rows: Vec<Order>,
    next_id: i64,
    // claims held by open transactions, released on commit/rollback/drop
    pending_keys: HashSet<(i64, String)>,
    pending_numbers: HashSet<String>,
}

impl MemoryOrderStore {
    pub fn rows(&self) -> Vec<Order> {
        self.inner.state.lock().unwrap().rows.clone()
    }

    /// Make every commit fail, leaving the store untouched.
    pub fn fail_commits(&self, fail: bool) {
        self.inner.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Make the next insert fail with a generic database error.
    pub fn fail_next_insert(&self) {
        self.inner.fail_next_insert.store(true, Ordering::SeqCst);
    }

    /// Delay idempotency lookups, widening the window in which concurrent
    /// creates race each other to the insert.
    pub fn delay_finds(&self, delay: Duration) {
        *self.inner.find_delay.lock().unwrap() = Some(delay);
    }

    /// Delay inserts so concurrent creates both pass the idempotency check
    /// before either claims the unique index.
    pub fn delay_inserts(&self, delay: Duration) {
        *self.inner.insert_delay.lock().unwrap() = Some(delay);
    }

    async fn apply_find_delay(&self) {
        let delay = *self.inner.find_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn find_by_user_and_key(
        &self,
        user_id: i64,
        idempotency_key: &str,
    ) -> Result<Option<Order>, StoreError> {
        self.apply_find_delay().await;
        let state = self.inner.state.lock().unwrap();
        Ok(state
            .rows
            .iter()
            .find(|row| row.user_id == user_id && row.idempotency_key == idempotency_key)
            .cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Order>, StoreError> {
        let state = self.inner.state.lock().unwrap();
        Ok(state.rows.iter().find(|row| row.id == id).cloned())
    }

    async fn find_by_order_number(&self, order_number: &str) -> Result<Option<Order>, StoreError> {
        let state = self.inner.state.lock().unwrap();
        Ok(state
            .rows
            .iter()
            .find(|row| row.order_number == order_number)
            .cloned())
    }

    async fn count_by_user(&self, user_id: i64) -> Result<i64, StoreError> {
        let state = self.inner.state.lock().unwrap();
        Ok(state.rows.iter().filter(|row| row.user_id == user_id).count() as i64)
    }

    async fn begin(&self) -> Result<Box<dyn OrderTransaction>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            inner: self.inner.clone(),
            staged: Vec::new(),
            claimed_keys: Vec::new(),
            claimed_numbers: Vec::new(),
        }))
    }
}

pub struct MemoryTransaction {
    inner: Arc<StoreInner>,
    staged: Vec<Order>,
    claimed_keys: Vec<(i64, String)>,
    claimed_numbers: Vec<String>,
}

impl MemoryTransaction {
    fn release_claims(&mut self) {
        let mut state = self.inner.state.lock().unwrap();
        for key in self.claimed_keys.drain(..) {
            state.pending_keys.remove(&key);
        }
        for number in self.claimed_numbers.drain(..) {
            state.pending_numbers.remove(&number);
        }
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.release_claims();
    }
}

#[async_trait]
impl OrderTransaction for MemoryTransaction {
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order, StoreError> {
        if self.inner.fail_next_insert.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Database("injected insert failure".to_string()));
        }

        let delay = *self.inner.insert_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let key = (order.user_id, order.idempotency_key.clone());

        loop {
            {
                let mut state = self.inner.state.lock().unwrap();

                if state
                    .rows
                    .iter()
                    .any(|row| row.user_id == key.0 && row.idempotency_key == key.1)
                {
                    return Err(StoreError::DuplicateIdempotencyKey);
                }
                if state
                    .rows
                    .iter()
                    .any(|row| row.order_number == order.order_number)
                {
                    return Err(StoreError::DuplicateOrderNumber);
                }

                let contended = state.pending_keys.contains(&key)
                    || state.pending_numbers.contains(&order.order_number);

                if !contended {
                    state.next_id += 1;
                    let row = Order {
                        id: state.next_id,
                        user_id: order.user_id,
                        status: order.status,
                        order_number: order.order_number.clone(),
                        idempotency_key: order.idempotency_key.clone(),
                        created_at: order.created_at,
                        updated_at: order.created_at,
                    };
                    state.pending_keys.insert(key.clone());
                    state.pending_numbers.insert(order.order_number.clone());
                    self.claimed_keys.push(key);
                    self.claimed_numbers.push(order.order_number.clone());
                    self.staged.push(row.clone());
                    return Ok(row);
                }
            }

            // Another open transaction holds this key; wait for it to
            // resolve, exactly like blocking on the real unique index.
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        if this.inner.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Database("injected commit failure".to_string()));
        }

        let mut state = this.inner.state.lock().unwrap();
        state.rows.append(&mut this.staged);
        Ok(())
        // claims released when `this` drops
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

// ============================================================================
// Recording Broker
// ============================================================================

#[derive(Default)]
pub struct RecordingBroker {
    published: Mutex<Vec<(String, String, String)>>,
    attempts: AtomicU32,
    fail_remaining: AtomicU32,
    always_fail: AtomicBool,
}

impl RecordingBroker {
    pub fn published(&self) -> Vec<(String, String, String)> {
        self.published.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Reject the next `n` publish attempts.
    pub fn fail_times(&self, n: u32) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    pub fn fail_always(&self, fail: bool) {
        self.always_fail.store(fail, Ordering::SeqCst);
    }

    fn should_fail(&self) -> bool {
        if self.always_fail.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }
}

#[async_trait]
impl EventBroker for RecordingBroker {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), BrokerError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.should_fail() {
            return Err(BrokerError::Publish {
                topic: topic.to_string(),
                reason: "broker rejected message".to_string(),
            });
        }

        self.published.lock().unwrap().push((
            topic.to_string(),
            key.to_string(),
            String::from_utf8_lossy(payload).to_string(),
        ));
        Ok(())
    }
}

// ============================================================================
// Memory Dead Letters
// ============================================================================

#[derive(Default)]
pub struct MemoryDeadLetters {
    recorded: Mutex<Vec<FailedPublish>>,
}

impl MemoryDeadLetters {
    pub fn recorded(&self) -> Vec<FailedPublish> {
        self.recorded.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeadLetterStore for MemoryDeadLetters {
    async fn record(&self, failure: FailedPublish) -> Result<(), StoreError> {
        self.recorded.lock().unwrap().push(failure);
        Ok(())
    }
}

// ============================================================================
// Recording Sender
// ============================================================================

#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(String, i64, String)>>,
    attempts: AtomicU32,
    email_failures: AtomicU32,
    sms_failures: AtomicU32,
}

impl RecordingSender {
    pub fn sent(&self) -> Vec<(String, i64, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn fail_email_times(&self, n: u32) {
        self.email_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_sms_times(&self, n: u32) {
        self.sms_failures.store(n, Ordering::SeqCst);
    }

    fn try_send(
        &self,
        channel: &'static str,
        failures: &AtomicU32,
        user_id: i64,
        message: &str,
    ) -> Result<(), NotificationError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let failing = failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();
        if failing {
            return Err(NotificationError::Delivery {
                channel,
                user_id,
                reason: format!("injected {channel} failure"),
            });
        }

        self.sent
            .lock()
            .unwrap()
            .push((channel.to_string(), user_id, message.to_string()));
        Ok(())
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send_email(&self, user_id: i64, message: &str) -> Result<(), NotificationError> {
        self.try_send("email", &self.email_failures, user_id, message)
    }

    async fn send_sms(&self, user_id: i64, message: &str) -> Result<(), NotificationError> {
        self.try_send("sms", &self.sms_failures, user_id, message)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Publisher wired to fakes with millisecond backoff so retry paths run
/// fast under test.
pub fn fast_publisher(
    broker: Arc<dyn EventBroker>,
    dead_letters: Arc<dyn DeadLetterStore>,
) -> OutboxPublisher {
    let policy = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(5),
        multiplier: 2.0,
        max_delay: Duration::from_millis(20),
    };
    OutboxPublisher::new(
        broker,
        "order-events-test".to_string(),
        policy,
        Arc::new(Metrics::new().expect("metrics registry")),
        dead_letters,
    )
}
