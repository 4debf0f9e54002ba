//! API error types with HTTP response mapping.
//!
//! Everything surfaces as the JSON envelope
//! `{error, message, orderId?, details?}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use inventory::InventoryError;
use saga::SagaError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// The `Idempotency-Key` header is missing or empty.
    MissingIdempotencyKey,
    /// Malformed request payload.
    BadRequest(String),
    /// Resource not found.
    NotFound(String),
    /// Saga execution error.
    Saga(SagaError),
    /// Inventory engine error.
    Inventory(InventoryError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::MissingIdempotencyKey => (
                StatusCode::BAD_REQUEST,
                envelope("VALIDATION_ERROR", "missing Idempotency-Key header"),
            ),
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, envelope("VALIDATION_ERROR", &msg))
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, envelope("NOT_FOUND", &msg)),
            ApiError::Saga(err) => (
                StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                err.envelope(),
            ),
            ApiError::Inventory(err) => inventory_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    envelope("INTERNAL_ERROR", &msg),
                )
            }
        };

        (status, axum::Json(body)).into_response()
    }
}

fn envelope(code: &str, message: &str) -> serde_json::Value {
    serde_json::json!({ "error": code, "message": message })
}

fn inventory_error_to_response(err: InventoryError) -> (StatusCode, serde_json::Value) {
    match &err {
        InventoryError::DuplicateIdempotencyKey { .. } => (
            StatusCode::CONFLICT,
            envelope("DUPLICATE_IDEMPOTENCY_KEY", &err.to_string()),
        ),
        InventoryError::EmptyItems | InventoryError::InvalidQuantity { .. } => (
            StatusCode::BAD_REQUEST,
            envelope("VALIDATION_ERROR", &err.to_string()),
        ),
        InventoryError::Database(_) => {
            tracing::error!(error = %err, "inventory backend error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                envelope("INTERNAL_ERROR", &err.to_string()),
            )
        }
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        ApiError::Inventory(err)
    }
}

impl From<order_store::StoreError> for ApiError {
    fn from(err: order_store::StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
