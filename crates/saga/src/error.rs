//! Saga error types and their wire mapping.

use common::OrderId;
use domain::DomainError;
use order_store::{RecordState, StoreError};
use thiserror::Error;

use crate::services::catalog::CatalogError;

/// Errors that can occur during the create-order saga.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Request validation failed; nothing was written.
    #[error(transparent)]
    Validation(#[from] DomainError),

    /// The idempotency key belongs to a pending or failed request.
    #[error("idempotency key already used ({state} request)")]
    IdempotencyConflict { state: RecordState },

    /// Catalog lookup failed; nothing was written.
    #[error("pricing failed: {0}")]
    Pricing(#[from] CatalogError),

    /// Inventory could not reserve the order; the order was cancelled.
    #[error("inventory reservation failed: {reason}")]
    Reservation { order_id: OrderId, reason: String },

    /// Payment was declined or unusable; the order was cancelled and its
    /// reservations released.
    #[error("payment failed: {reason}")]
    Payment { order_id: OrderId, reason: String },

    /// The stored totals signature no longer matches the recomputed one.
    #[error("totals signature mismatch for order {order_id}")]
    SignatureMismatch { order_id: OrderId },

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl SagaError {
    /// Stable error code carried in the wire envelope.
    pub fn code(&self) -> &'static str {
        match self {
            SagaError::Validation(_) => "VALIDATION_ERROR",
            SagaError::IdempotencyConflict { .. } => "IDEMPOTENCY_CONFLICT",
            SagaError::Pricing(_) => "PRICING_FAILED",
            SagaError::Reservation { .. } | SagaError::Payment { .. } => "ORDER_CREATION_FAILED",
            SagaError::SignatureMismatch { .. } | SagaError::Store(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for the wire envelope.
    pub fn status(&self) -> u16 {
        match self {
            SagaError::Validation(_) => 400,
            SagaError::IdempotencyConflict { .. } => 409,
            _ => 500,
        }
    }

    /// The order this failure refers to, when the order record exists.
    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            SagaError::Reservation { order_id, .. }
            | SagaError::Payment { order_id, .. }
            | SagaError::SignatureMismatch { order_id } => Some(*order_id),
            _ => None,
        }
    }

    /// The JSON error envelope: `{error, message, orderId?}`.
    pub fn envelope(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        if let Some(order_id) = self.order_id() {
            body["orderId"] = serde_json::json!(order_id);
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_400() {
        let err = SagaError::Validation(DomainError::EmptyItems);
        assert_eq!(err.status(), 400);
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(err.order_id().is_none());
    }

    #[test]
    fn test_conflict_maps_to_409() {
        let err = SagaError::IdempotencyConflict {
            state: RecordState::Pending,
        };
        assert_eq!(err.status(), 409);
        assert_eq!(err.code(), "IDEMPOTENCY_CONFLICT");
    }

    #[test]
    fn test_failure_envelope_carries_order_id() {
        let order_id = OrderId::new();
        let err = SagaError::Payment {
            order_id,
            reason: "declined".to_string(),
        };
        assert_eq!(err.status(), 500);
        assert_eq!(err.code(), "ORDER_CREATION_FAILED");

        let envelope = err.envelope();
        assert_eq!(envelope["error"], "ORDER_CREATION_FAILED");
        assert_eq!(envelope["orderId"], serde_json::json!(order_id));
    }
}
