use crate::domain::OrderCreatedEvent;
use crate::store::{OrderTransaction, StoreError};

use super::publisher::{OutboxPublisher, PublishOutcome};
use super::OutboxError;

// ============================================================================
// Outbox Transaction
// ============================================================================

/// A store transaction plus the event staged against it.
///
/// Dropping this without calling `commit` rolls the transaction back and
/// discards the staged event, so an event can never outlive a failed
/// transaction.
pub struct OutboxTransaction {
    tx: Option<Box<dyn OrderTransaction>>,
    staged: Option<OrderCreatedEvent>,
}

impl OutboxTransaction {
    pub fn new(tx: Box<dyn OrderTransaction>) -> Self {
        Self {
            tx: Some(tx),
            staged: None,
        }
    }

    /// Access the underlying store transaction for writes.
    pub fn store_tx(&mut self) -> Result<&mut (dyn OrderTransaction + 'static), OutboxError> {
        self.tx.as_deref_mut().ok_or(OutboxError::NoActiveTransaction)
    }

    /// Register an event for publication after commit. At most one event
    /// per transaction; staging after the transaction finished is a bug.
    pub fn stage(&mut self, event: OrderCreatedEvent) -> Result<(), OutboxError> {
        if self.tx.is_none() {
            return Err(OutboxError::NoActiveTransaction);
        }
        if let Some(already) = &self.staged {
            return Err(OutboxError::AlreadyStaged(already.order_id));
        }

        tracing::debug!(
            order_id = event.order_id,
            order_number = %event.order_number,
            "Staged order created event for post-commit publish"
        );

        self.staged = Some(event);
        Ok(())
    }

    /// Roll back the transaction, discarding any staged event.
    pub async fn rollback(mut self) -> Result<(), StoreError> {
        self.staged = None;
        match self.tx.take() {
            Some(tx) => tx.rollback().await,
            None => Ok(()),
        }
    }

    /// Commit the transaction, then publish the staged event.
    ///
    /// The commit is the point of no return: a commit failure surfaces as
    /// an error and the event is never sent, while a publish failure after
    /// a successful commit is reported in the returned outcome and does
    /// not undo the commit.
    pub async fn commit(
        mut self,
        publisher: &OutboxPublisher,
    ) -> Result<PublishOutcome, OutboxError> {
        let tx = self.tx.take().ok_or(OutboxError::NoActiveTransaction)?;
        tx.commit().await.map_err(OutboxError::Store)?;

        match self.staged.take() {
            Some(event) => Ok(publisher.publish(&event).await),
            None => Ok(PublishOutcome::NothingStaged),
        }
    }
}


#[cfg(test)]
impl OutboxTransaction {
    /// Finish the transaction while keeping the wrapper alive, for tests
    /// that exercise use-after-finish misuse.
    pub(crate) async fn rollback_in_place(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.rollback().await;
        }
    }
}
