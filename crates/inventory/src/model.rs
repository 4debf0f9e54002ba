//! Inventory data model: stock rows, reservations, and the movement ledger.

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, ReservationId};
use serde::{Deserialize, Serialize};

/// Per-(product, warehouse) stock counters.
///
/// Invariant: `0 ≤ reserved ≤ on_hand` after every committed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRow {
    pub product_id: ProductId,
    pub warehouse: String,
    pub on_hand: i64,
    pub reserved: i64,
    pub updated_at: DateTime<Utc>,
}

impl InventoryRow {
    /// Stock not claimed by any active reservation.
    pub fn available(&self) -> i64 {
        self.on_hand - self.reserved
    }
}

/// Lifecycle state of a reservation.
///
/// State transitions:
/// ```text
/// Active ──┬──► Confirmed
///          ├──► Released
///          └──► Expired
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    /// Hold is live and counted in the row's `reserved` field.
    #[default]
    Active,

    /// Hold survived payment (or shipment); immune to the reaper.
    Confirmed,

    /// Hold was given back by compensation or client cancel.
    Released,

    /// Hold was garbage-collected by the reaper after its TTL.
    Expired,
}

impl ReservationStatus {
    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "ACTIVE",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Released => "RELEASED",
            ReservationStatus::Expired => "EXPIRED",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A time-bounded hold on stock at one warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub sku: String,
    pub warehouse: String,
    pub quantity: u32,
    pub idempotency_key: String,
    pub reserved_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: ReservationStatus,
}

impl Reservation {
    /// Creates a new ACTIVE reservation.
    pub fn active(
        order_id: OrderId,
        product_id: ProductId,
        sku: impl Into<String>,
        warehouse: impl Into<String>,
        quantity: u32,
        idempotency_key: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ReservationId::new(),
            order_id,
            product_id,
            sku: sku.into(),
            warehouse: warehouse.into(),
            quantity,
            idempotency_key: idempotency_key.into(),
            reserved_at: Utc::now(),
            expires_at,
            status: ReservationStatus::Active,
        }
    }
}

/// Kind of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    Reserve,
    Release,
    Ship,
}

impl MovementKind {
    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Reserve => "RESERVE",
            MovementKind::Release => "RELEASE",
            MovementKind::Ship => "SHIP",
        }
    }
}

impl std::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry in the append-only movement ledger.
///
/// Movements are never mutated or deleted; they are the audit truth for
/// stock changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub product_id: ProductId,
    pub sku: String,
    pub warehouse: String,
    pub kind: MovementKind,
    pub quantity: u32,
    pub order_id: OrderId,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

impl Movement {
    /// Creates a ledger entry stamped with the current time.
    pub fn new(
        kind: MovementKind,
        product_id: ProductId,
        sku: impl Into<String>,
        warehouse: impl Into<String>,
        quantity: u32,
        order_id: OrderId,
        note: impl Into<String>,
    ) -> Self {
        Self {
            product_id,
            sku: sku.into(),
            warehouse: warehouse.into(),
            kind,
            quantity,
            order_id,
            note: note.into(),
            created_at: Utc::now(),
        }
    }
}
