//! Store traits for orders and idempotency records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, PaymentRef};
use domain::{Order, OrderItem, PaymentStatus};

use crate::error::Result;

/// Persistence operations for orders and their line items.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order together with its line items.
    ///
    /// The write is atomic: either the order and every item land, or
    /// nothing does.
    async fn insert_order(&self, order: &Order, items: &[OrderItem]) -> Result<()>;

    /// Loads an order and its items by ID.
    async fn get_order(&self, id: OrderId) -> Result<Option<(Order, Vec<OrderItem>)>>;

    /// Returns the most recent orders, newest first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<(Order, Vec<OrderItem>)>>;

    /// Records the payment outcome on an order.
    async fn record_payment(
        &self,
        id: OrderId,
        status: PaymentStatus,
        reference: Option<PaymentRef>,
    ) -> Result<()>;

    /// Cancels an order: status CANCELLED, payment FAILED, all lines
    /// CANCELLED. Used by saga compensation.
    async fn cancel_order(&self, id: OrderId) -> Result<()>;
}

/// State of a non-replayable idempotency record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// The original request is still in flight.
    Pending,
    /// The original request finalized with a non-2xx status.
    Failed,
}

impl RecordState {
    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordState::Pending => "PENDING",
            RecordState::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for RecordState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of attempting to acquire an idempotency key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// No record existed; a pending record has been stored and the caller
    /// owns the request.
    Created,
    /// A record finalized with a 2xx status exists; the stored body must be
    /// replayed verbatim.
    Replay {
        status: u16,
        body: serde_json::Value,
    },
    /// A pending or failed record exists; the request must be rejected.
    Conflict { state: RecordState },
}

/// A stored idempotency record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyRecord {
    pub key: String,
    pub resource_path: String,
    /// SHA-256 hex of the request body, stored for auditing only; replay is
    /// never gated on it.
    pub body_hash: String,
    pub response_status: Option<u16>,
    pub response_body: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// Returns true once a response has been recorded.
    pub fn is_finalized(&self) -> bool {
        self.response_status.is_some()
    }
}

/// Persistence operations for idempotency records.
///
/// Records have no TTL; retention is an operator concern.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Claims the key for a new request, or reports the existing record.
    ///
    /// Atomic with respect to concurrent acquires for the same key: exactly
    /// one caller observes [`AcquireOutcome::Created`].
    async fn acquire(&self, key: &str, resource_path: &str, body_hash: &str)
    -> Result<AcquireOutcome>;

    /// Finalizes a pending record with the response to replay.
    ///
    /// Fails with [`crate::StoreError::AlreadyFinalized`] if the record has
    /// already been finalized; finalized records are immutable.
    async fn finalize(&self, key: &str, status: u16, body: &serde_json::Value) -> Result<()>;

    /// Loads a record by key.
    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>>;
}
