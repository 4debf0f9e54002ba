//! Store error types.

use common::OrderId;
use thiserror::Error;

/// Errors that can occur in the order and idempotency stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Order does not exist.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// Finalize was called on a record that is already finalized.
    ///
    /// Finalized idempotency records are immutable; callers treat this as
    /// a logged warning, not a fatal condition.
    #[error("idempotency record already finalized: {0}")]
    AlreadyFinalized(String),

    /// Finalize was called for a key that was never acquired.
    #[error("idempotency record not found: {0}")]
    RecordNotFound(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;
