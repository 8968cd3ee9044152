// ============================================================================
// Transactional Outbox
// ============================================================================
//
// Decouples "event exists" from "event sent". An OrderCreatedEvent is
// staged against an open store transaction and handed to the publisher only
// after that transaction's commit returns successfully; rollback or drop
// discards it. Publishing happens strictly outside the transaction, so a
// slow broker never holds a database lock open.
//
// ============================================================================

pub mod publisher;
pub mod transaction;

pub use publisher::{OutboxPublisher, PublishOutcome};
pub use transaction::OutboxTransaction;

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    /// Staging or inserting was attempted against a transaction that has
    /// already been committed or rolled back. A composition bug, not a
    /// runtime condition to retry.
    #[error("no active transaction")]
    NoActiveTransaction,

    /// A second event was staged for the same order. Each order gets at
    /// most one publish attempt sequence.
    #[error("event already staged for order {0}")]
    AlreadyStaged(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}
