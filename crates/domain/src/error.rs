//! Domain error types.

use common::ProductId;
use thiserror::Error;

/// Errors raised by order validation and construction.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The order request carried no items.
    #[error("order must contain at least one item")]
    EmptyItems,

    /// An item carried a zero or negative quantity.
    #[error("invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: ProductId, quantity: i64 },
}
