//! Inventory store trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, ReservationId};

use crate::error::Result;
use crate::model::{InventoryRow, Movement, Reservation, ReservationStatus};

/// Outcome of inserting a reservation under the
/// `(idempotency_key, order, product)` unique constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The reservation was stored.
    Inserted,
    /// A reservation for the same key, order, and product already exists;
    /// the committed row is returned so the caller can reuse it.
    Duplicate(Reservation),
}

/// Storage primitives for the inventory engine.
///
/// Every method is individually atomic. Counter changes are conditional
/// (`try_reserve`) or clamped (`release_reserved`, `consume_stock`), and
/// status changes are compare-and-swap, so the engine's invariants hold
/// even when operations interleave — a lost race reads as `false` or zero
/// affected rows, never as a lost update.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Creates or resets the on-hand count for a (product, warehouse) row.
    async fn upsert_stock(&self, product_id: &ProductId, warehouse: &str, on_hand: i64)
    -> Result<()>;

    /// Returns all rows for the given products.
    async fn rows_for_products(&self, products: &[ProductId]) -> Result<Vec<InventoryRow>>;

    /// Atomically adds `quantity` to `reserved` if and only if
    /// `on_hand - reserved ≥ quantity`. Returns false when the guard fails
    /// (including when the row does not exist).
    async fn try_reserve(
        &self,
        product_id: &ProductId,
        warehouse: &str,
        quantity: u32,
    ) -> Result<bool>;

    /// Decrements `reserved` by `quantity`, clamped at zero.
    async fn release_reserved(
        &self,
        product_id: &ProductId,
        warehouse: &str,
        quantity: u32,
    ) -> Result<()>;

    /// Ships stock: decrements both `on_hand` and `reserved` by `quantity`,
    /// each clamped at zero.
    async fn consume_stock(
        &self,
        product_id: &ProductId,
        warehouse: &str,
        quantity: u32,
    ) -> Result<()>;

    /// Inserts a reservation, reporting the committed duplicate when the
    /// `(idempotency_key, order, product)` constraint fires.
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<InsertOutcome>;

    /// Returns all reservations carrying the given order and key.
    async fn reservations_for_key(&self, order_id: OrderId, key: &str)
    -> Result<Vec<Reservation>>;

    /// Returns all reservations for an order.
    async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<Reservation>>;

    /// Compare-and-swap on a reservation's status. Returns true when the
    /// reservation was in `from` and is now in `to`.
    async fn transition_reservation(
        &self,
        id: ReservationId,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> Result<bool>;

    /// Returns all ACTIVE reservations whose `expires_at` has passed.
    async fn expired_active(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>>;

    /// Appends an entry to the movement ledger.
    async fn append_movement(&self, movement: &Movement) -> Result<()>;

    /// Returns the ledger for a product, newest first.
    async fn movements_for_product(&self, product_id: &ProductId) -> Result<Vec<Movement>>;
}
