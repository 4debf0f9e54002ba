//! Inventory error types.

use common::ProductId;
use thiserror::Error;

/// Errors raised by the inventory engine and its stores.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The reserve request carried no items.
    #[error("reserve request must contain at least one item")]
    EmptyItems,

    /// An item carried a zero quantity.
    #[error("invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: ProductId, quantity: i64 },

    /// The idempotency key was already used and none of its reservations
    /// are still active.
    #[error("duplicate idempotency key: {key}")]
    DuplicateIdempotencyKey { key: String },

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Convenience type alias for inventory results.
pub type Result<T> = std::result::Result<T, InventoryError>;
