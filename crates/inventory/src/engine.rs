//! The reservation engine.
//!
//! Drives reserve, confirm, release, ship, and expiry over an
//! [`InventoryStore`]. Allocation is single-warehouse-first: if one
//! warehouse can satisfy every requested item it is used for all of them;
//! otherwise each item independently takes the first warehouse (by
//! descending availability) that can hold its full quantity. A single item
//! is never split across warehouses — an item no warehouse can hold in
//! full becomes a partial entry.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use common::{OrderId, ProductId, ReservationId};
use serde::{Deserialize, Serialize};

use crate::error::{InventoryError, Result};
use crate::model::{
    InventoryRow, Movement, MovementKind, Reservation, ReservationStatus,
};
use crate::store::{InsertOutcome, InventoryStore};

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a reservation holds stock before the reaper may take it.
    pub reservation_ttl: Duration,
    /// Post-reservation availability below this emits a low-stock warning.
    pub low_stock_threshold: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reservation_ttl: Duration::minutes(15),
            low_stock_threshold: 10,
        }
    }
}

/// One item of a reserve request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub sku: Option<String>,
}

impl ReserveItem {
    /// Creates a reserve item without a SKU hint.
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            sku: None,
        }
    }
}

/// One item of a ship request; the warehouse is explicit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub warehouse: String,
    pub sku: Option<String>,
}

/// How a fully-reserved request was allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationStrategy {
    /// Every item came from the same warehouse.
    SingleWarehouse,
    /// Items were filled from different warehouses.
    Split,
}

/// One successfully reserved line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedLine {
    pub reservation_id: ReservationId,
    pub product_id: ProductId,
    pub sku: String,
    pub warehouse: String,
    pub quantity: u32,
}

/// One line that could not be fully allocated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailableLine {
    pub product_id: ProductId,
    pub sku: Option<String>,
    pub qty_requested: u32,
    /// Best single-warehouse availability observed; zero when no warehouse
    /// holds any stock.
    pub qty_available: i64,
}

/// Hint carried on partial allocations.
pub const ACTION_BACKORDER_OR_REDUCE: &str = "BACKORDER_OR_REDUCE";

/// Result of a reserve call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// Every item was allocated.
    Reserved {
        lines: Vec<ReservedLine>,
        expires_at: DateTime<Utc>,
        /// True when this is a replay of an earlier reservation with the
        /// same key and order.
        idempotent: bool,
        strategy: AllocationStrategy,
    },
    /// Some items allocated, some not. Reserved items are NOT rolled back;
    /// the caller decides what to do with the mixed state.
    Partial {
        reserved: Vec<ReservedLine>,
        unavailable: Vec<UnavailableLine>,
        expires_at: Option<DateTime<Utc>>,
        action_required: &'static str,
    },
}

/// Result of a reaper pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaperOutcome {
    pub expired_count: usize,
    pub released: Vec<ReservedLine>,
}

/// The reservation engine over a store backend.
#[derive(Clone)]
pub struct ReservationEngine<S> {
    store: S,
    config: EngineConfig,
}

impl<S: InventoryStore> ReservationEngine<S> {
    /// Creates an engine with the given store and config.
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Gets a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates or resets stock for a (product, warehouse) row.
    pub async fn set_stock(
        &self,
        product_id: &ProductId,
        warehouse: &str,
        on_hand: i64,
    ) -> Result<()> {
        self.store.upsert_stock(product_id, warehouse, on_hand).await
    }

    /// Returns the stock rows for a product.
    pub async fn stock_levels(&self, product_id: &ProductId) -> Result<Vec<InventoryRow>> {
        self.store
            .rows_for_products(std::slice::from_ref(product_id))
            .await
    }

    /// Returns the movement ledger for a product, newest first.
    pub async fn movements(&self, product_id: &ProductId) -> Result<Vec<Movement>> {
        self.store.movements_for_product(product_id).await
    }

    /// Reserves stock for an order under an idempotency key.
    #[tracing::instrument(skip(self, items), fields(order_id = %order_id))]
    pub async fn reserve(
        &self,
        order_id: OrderId,
        items: &[ReserveItem],
        idempotency_key: &str,
    ) -> Result<ReserveOutcome> {
        validate_items(items)?;

        // Idempotency gate: an earlier reservation set for this key+order
        // is replayed; a fully dead one is a duplicate key.
        let existing = self
            .store
            .reservations_for_key(order_id, idempotency_key)
            .await?;
        if !existing.is_empty() {
            let active: Vec<&Reservation> = existing
                .iter()
                .filter(|r| r.status == ReservationStatus::Active)
                .collect();
            if active.is_empty() {
                return Err(InventoryError::DuplicateIdempotencyKey {
                    key: idempotency_key.to_string(),
                });
            }

            let lines: Vec<ReservedLine> = active.iter().map(|r| reserved_line(r)).collect();
            let expires_at = active
                .iter()
                .map(|r| r.expires_at)
                .max()
                .unwrap_or_else(Utc::now);
            let strategy = strategy_of(&lines);
            tracing::info!(%order_id, key = idempotency_key, "idempotent reserve replay");
            return Ok(ReserveOutcome::Reserved {
                lines,
                expires_at,
                idempotent: true,
                strategy,
            });
        }

        let product_ids: Vec<ProductId> =
            items.iter().map(|i| i.product_id.clone()).collect();
        let rows = self.store.rows_for_products(&product_ids).await?;

        // Availability snapshot, decremented locally as lines are taken so
        // candidate ordering and the low-stock signal track this request's
        // own allocations. The store guard still arbitrates races.
        let mut available: HashMap<(ProductId, String), i64> = rows
            .iter()
            .map(|r| ((r.product_id.clone(), r.warehouse.clone()), r.available()))
            .collect();
        let warehouses: Vec<String> = {
            let mut names: Vec<String> =
                rows.iter().map(|r| r.warehouse.clone()).collect();
            names.sort();
            names.dedup();
            names
        };

        // Single-warehouse-first: the first warehouse (by name) able to
        // hold every requested item in full.
        let single = warehouses
            .iter()
            .find(|w| {
                items.iter().all(|item| {
                    available
                        .get(&(item.product_id.clone(), (*w).clone()))
                        .is_some_and(|a| *a >= i64::from(item.quantity))
                })
            })
            .cloned();

        let expires_at = Utc::now() + self.config.reservation_ttl;
        let mut lines: Vec<ReservedLine> = Vec::new();
        let mut unavailable: Vec<UnavailableLine> = Vec::new();

        for item in items {
            let candidates = candidate_warehouses(&available, item, single.as_deref());

            let mut taken: Option<String> = None;
            for warehouse in candidates {
                if self
                    .store
                    .try_reserve(&item.product_id, &warehouse, item.quantity)
                    .await?
                {
                    taken = Some(warehouse);
                    break;
                }
                // Zero affected rows: a concurrent reserver won this row.
                // Fall through to the next candidate.
            }

            let Some(warehouse) = taken else {
                let best = warehouses
                    .iter()
                    .filter_map(|w| {
                        available.get(&(item.product_id.clone(), w.clone())).copied()
                    })
                    .max()
                    .unwrap_or(0)
                    .max(0);
                unavailable.push(UnavailableLine {
                    product_id: item.product_id.clone(),
                    sku: item.sku.clone(),
                    qty_requested: item.quantity,
                    qty_available: best,
                });
                continue;
            };

            let sku = item
                .sku
                .clone()
                .unwrap_or_else(|| item.product_id.to_string());
            let reservation = Reservation::active(
                order_id,
                item.product_id.clone(),
                sku.clone(),
                warehouse.clone(),
                item.quantity,
                idempotency_key,
                expires_at,
            );

            match self.store.insert_reservation(&reservation).await? {
                InsertOutcome::Inserted => {
                    self.store
                        .append_movement(&Movement::new(
                            MovementKind::Reserve,
                            item.product_id.clone(),
                            sku,
                            warehouse.clone(),
                            item.quantity,
                            order_id,
                            "order reservation",
                        ))
                        .await?;
                    metrics::counter!("inventory_reservations_total").increment(1);
                    lines.push(reserved_line(&reservation));
                }
                InsertOutcome::Duplicate(committed) => {
                    // A concurrent duplicate request committed this product
                    // first; give back our counter increment and reuse its
                    // row so the two callers observe one reservation set.
                    self.store
                        .release_reserved(&item.product_id, &warehouse, item.quantity)
                        .await?;
                    lines.push(reserved_line(&committed));
                }
            }

            let key = (item.product_id.clone(), warehouse);
            if let Some(a) = available.get_mut(&key) {
                *a -= i64::from(item.quantity);
                if *a < self.config.low_stock_threshold {
                    metrics::counter!("inventory_low_stock_warnings_total").increment(1);
                    tracing::warn!(
                        product_id = %item.product_id,
                        warehouse = %key.1,
                        available = *a,
                        threshold = self.config.low_stock_threshold,
                        "low stock after reservation"
                    );
                }
            }
        }

        if unavailable.is_empty() {
            let strategy = strategy_of(&lines);
            Ok(ReserveOutcome::Reserved {
                lines,
                expires_at,
                idempotent: false,
                strategy,
            })
        } else {
            // Reserved lines stay committed; the caller owns the decision.
            Ok(ReserveOutcome::Partial {
                expires_at: (!lines.is_empty()).then_some(expires_at),
                reserved: lines,
                unavailable,
                action_required: ACTION_BACKORDER_OR_REDUCE,
            })
        }
    }

    /// Confirms reservations: ACTIVE → CONFIRMED. Confirmed holds are no
    /// longer eligible for TTL expiry. Returns the number transitioned.
    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn confirm(
        &self,
        order_id: OrderId,
        reservation_ids: Option<&[ReservationId]>,
    ) -> Result<usize> {
        let reservations = self.store.reservations_for_order(order_id).await?;
        let mut confirmed = 0;
        for r in &reservations {
            if let Some(ids) = reservation_ids
                && !ids.contains(&r.id)
            {
                continue;
            }
            if self
                .store
                .transition_reservation(
                    r.id,
                    ReservationStatus::Active,
                    ReservationStatus::Confirmed,
                )
                .await?
            {
                confirmed += 1;
            }
        }
        Ok(confirmed)
    }

    /// Releases all ACTIVE reservations for an order, giving the held
    /// stock back. Idempotent: re-release is a no-op.
    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn release(&self, order_id: OrderId) -> Result<usize> {
        let reservations = self.store.reservations_for_order(order_id).await?;
        let mut released = 0;
        for r in &reservations {
            // The CAS decides the race against the reaper and against a
            // concurrent release: only the winner adjusts the counter.
            if self
                .store
                .transition_reservation(
                    r.id,
                    ReservationStatus::Active,
                    ReservationStatus::Released,
                )
                .await?
            {
                self.store
                    .release_reserved(&r.product_id, &r.warehouse, r.quantity)
                    .await?;
                self.store
                    .append_movement(&Movement::new(
                        MovementKind::Release,
                        r.product_id.clone(),
                        r.sku.clone(),
                        r.warehouse.clone(),
                        r.quantity,
                        order_id,
                        "reservation released",
                    ))
                    .await?;
                released += 1;
            }
        }
        if released > 0 {
            tracing::info!(%order_id, released, "reservations released");
        }
        Ok(released)
    }

    /// Ships stock for an order, consuming previously reserved quantities.
    #[tracing::instrument(skip(self, items), fields(order_id = %order_id))]
    pub async fn ship(&self, order_id: OrderId, items: &[ShipItem]) -> Result<()> {
        for item in items {
            if item.quantity == 0 {
                return Err(InventoryError::InvalidQuantity {
                    product_id: item.product_id.clone(),
                    quantity: 0,
                });
            }
        }

        let reservations = self.store.reservations_for_order(order_id).await?;
        for item in items {
            self.store
                .consume_stock(&item.product_id, &item.warehouse, item.quantity)
                .await?;
            let sku = item
                .sku
                .clone()
                .unwrap_or_else(|| item.product_id.to_string());
            self.store
                .append_movement(&Movement::new(
                    MovementKind::Ship,
                    item.product_id.clone(),
                    sku,
                    item.warehouse.clone(),
                    item.quantity,
                    order_id,
                    "order shipment",
                ))
                .await?;

            // Fence the reaper off holds whose stock just left the
            // building: an expiry after shipment must not release again.
            for r in reservations.iter().filter(|r| {
                r.product_id == item.product_id && r.warehouse == item.warehouse
            }) {
                self.store
                    .transition_reservation(
                        r.id,
                        ReservationStatus::Active,
                        ReservationStatus::Confirmed,
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Expires overdue ACTIVE reservations and releases their stock.
    ///
    /// Safe to run concurrently with user operations: the status CAS makes
    /// every expiry exclusive with release and confirm.
    #[tracing::instrument(skip(self))]
    pub async fn expire_due(&self, now: DateTime<Utc>) -> Result<ReaperOutcome> {
        let due = self.store.expired_active(now).await?;
        let mut released = Vec::new();
        for r in &due {
            if self
                .store
                .transition_reservation(
                    r.id,
                    ReservationStatus::Active,
                    ReservationStatus::Expired,
                )
                .await?
            {
                self.store
                    .release_reserved(&r.product_id, &r.warehouse, r.quantity)
                    .await?;
                self.store
                    .append_movement(&Movement::new(
                        MovementKind::Release,
                        r.product_id.clone(),
                        r.sku.clone(),
                        r.warehouse.clone(),
                        r.quantity,
                        r.order_id,
                        "auto-release: reservation expired",
                    ))
                    .await?;
                metrics::counter!("inventory_reservations_expired_total").increment(1);
                released.push(reserved_line(r));
            }
        }
        if !released.is_empty() {
            tracing::info!(expired = released.len(), "reaper released expired reservations");
        }
        Ok(ReaperOutcome {
            expired_count: released.len(),
            released,
        })
    }
}

fn validate_items(items: &[ReserveItem]) -> Result<()> {
    if items.is_empty() {
        return Err(InventoryError::EmptyItems);
    }
    for item in items {
        if item.quantity == 0 {
            return Err(InventoryError::InvalidQuantity {
                product_id: item.product_id.clone(),
                quantity: 0,
            });
        }
    }
    Ok(())
}

fn reserved_line(r: &Reservation) -> ReservedLine {
    ReservedLine {
        reservation_id: r.id,
        product_id: r.product_id.clone(),
        sku: r.sku.clone(),
        warehouse: r.warehouse.clone(),
        quantity: r.quantity,
    }
}

fn strategy_of(lines: &[ReservedLine]) -> AllocationStrategy {
    let mut warehouses = lines.iter().map(|l| l.warehouse.as_str());
    match warehouses.next() {
        Some(first) if warehouses.all(|w| w == first) => AllocationStrategy::SingleWarehouse,
        Some(_) => AllocationStrategy::Split,
        None => AllocationStrategy::SingleWarehouse,
    }
}

/// Candidate warehouses for one item: the chosen single warehouse first
/// when there is one, then the rest sorted by descending availability for
/// this product (ties broken by name for determinism).
fn candidate_warehouses(
    available: &HashMap<(ProductId, String), i64>,
    item: &ReserveItem,
    single: Option<&str>,
) -> Vec<String> {
    let mut with_stock: Vec<(String, i64)> = available
        .iter()
        .filter(|((p, _), _)| p == &item.product_id)
        .map(|((_, w), a)| (w.clone(), *a))
        .filter(|(_, a)| *a >= i64::from(item.quantity))
        .collect();
    with_stock.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut candidates: Vec<String> = Vec::with_capacity(with_stock.len() + 1);
    if let Some(w) = single {
        candidates.push(w.to_string());
    }
    for (w, _) in with_stock {
        if Some(w.as_str()) != single {
            candidates.push(w);
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryInventoryStore;

    fn product(id: &str) -> ProductId {
        ProductId::new(id)
    }

    async fn engine_with_stock(
        stock: &[(&str, &str, i64)],
    ) -> ReservationEngine<InMemoryInventoryStore> {
        let engine =
            ReservationEngine::new(InMemoryInventoryStore::new(), EngineConfig::default());
        for (p, w, q) in stock {
            engine.set_stock(&product(p), w, *q).await.unwrap();
        }
        engine
    }

    async fn row(
        engine: &ReservationEngine<InMemoryInventoryStore>,
        p: &str,
        w: &str,
    ) -> InventoryRow {
        engine
            .stock_levels(&product(p))
            .await
            .unwrap()
            .into_iter()
            .find(|r| r.warehouse == w)
            .unwrap()
    }

    #[tokio::test]
    async fn test_reserve_single_warehouse_strategy() {
        let engine = engine_with_stock(&[("1", "WH1", 10), ("2", "WH1", 5)]).await;
        let order = OrderId::new();

        let outcome = engine
            .reserve(
                order,
                &[ReserveItem::new("1", 2), ReserveItem::new("2", 1)],
                "k1",
            )
            .await
            .unwrap();

        match outcome {
            ReserveOutcome::Reserved {
                lines,
                idempotent,
                strategy,
                ..
            } => {
                assert_eq!(lines.len(), 2);
                assert!(!idempotent);
                assert_eq!(strategy, AllocationStrategy::SingleWarehouse);
                assert!(lines.iter().all(|l| l.warehouse == "WH1"));
            }
            other => panic!("expected reserved, got {other:?}"),
        }

        assert_eq!(row(&engine, "1", "WH1").await.reserved, 2);
        assert_eq!(row(&engine, "2", "WH1").await.reserved, 1);

        let movements = engine.movements(&product("1")).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].kind, MovementKind::Reserve);
    }

    #[tokio::test]
    async fn test_reserve_split_strategy_across_warehouses() {
        // Product 1 only in WH1, product 2 only in WH2: no single warehouse.
        let engine = engine_with_stock(&[("1", "WH1", 5), ("2", "WH2", 5)]).await;

        let outcome = engine
            .reserve(
                OrderId::new(),
                &[ReserveItem::new("1", 1), ReserveItem::new("2", 1)],
                "k1",
            )
            .await
            .unwrap();

        match outcome {
            ReserveOutcome::Reserved { lines, strategy, .. } => {
                assert_eq!(strategy, AllocationStrategy::Split);
                assert_eq!(lines[0].warehouse, "WH1");
                assert_eq!(lines[1].warehouse, "WH2");
            }
            other => panic!("expected reserved, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_split_picks_highest_availability_first() {
        let engine =
            engine_with_stock(&[("1", "WH1", 2), ("1", "WH2", 8), ("2", "WH3", 1)]).await;

        // No single warehouse fits both items; product 1 should land in
        // WH2, the deepest pool that satisfies it.
        let outcome = engine
            .reserve(
                OrderId::new(),
                &[ReserveItem::new("1", 3), ReserveItem::new("2", 1)],
                "k1",
            )
            .await
            .unwrap();

        match outcome {
            ReserveOutcome::Reserved { lines, .. } => {
                assert_eq!(lines[0].warehouse, "WH2");
                assert_eq!(lines[1].warehouse, "WH3");
            }
            other => panic!("expected reserved, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_item_never_split_across_warehouses() {
        // 2 + 3 across warehouses could cover qty 4, but a single item is
        // never split: the request goes partial.
        let engine = engine_with_stock(&[("1", "WH1", 2), ("1", "WH2", 3)]).await;

        let outcome = engine
            .reserve(OrderId::new(), &[ReserveItem::new("1", 4)], "k1")
            .await
            .unwrap();

        match outcome {
            ReserveOutcome::Partial {
                reserved,
                unavailable,
                action_required,
                expires_at,
            } => {
                assert!(reserved.is_empty());
                assert!(expires_at.is_none());
                assert_eq!(unavailable.len(), 1);
                assert_eq!(unavailable[0].qty_requested, 4);
                assert_eq!(unavailable[0].qty_available, 3);
                assert_eq!(action_required, ACTION_BACKORDER_OR_REDUCE);
            }
            other => panic!("expected partial, got {other:?}"),
        }

        // Nothing was decremented.
        assert_eq!(row(&engine, "1", "WH1").await.reserved, 0);
        assert_eq!(row(&engine, "1", "WH2").await.reserved, 0);
    }

    #[tokio::test]
    async fn test_partial_keeps_allocated_items() {
        let engine = engine_with_stock(&[("1", "WH1", 10)]).await;

        let outcome = engine
            .reserve(
                OrderId::new(),
                &[ReserveItem::new("1", 2), ReserveItem::new("2", 1)],
                "k1",
            )
            .await
            .unwrap();

        match outcome {
            ReserveOutcome::Partial {
                reserved,
                unavailable,
                ..
            } => {
                assert_eq!(reserved.len(), 1);
                assert_eq!(unavailable.len(), 1);
                assert_eq!(unavailable[0].qty_available, 0);
            }
            other => panic!("expected partial, got {other:?}"),
        }

        // The allocated line stays committed.
        assert_eq!(row(&engine, "1", "WH1").await.reserved, 2);
    }

    #[tokio::test]
    async fn test_idempotent_replay_returns_same_reservations() {
        let engine = engine_with_stock(&[("1", "WH1", 10)]).await;
        let order = OrderId::new();
        let items = [ReserveItem::new("1", 2)];

        let first = engine.reserve(order, &items, "k2").await.unwrap();
        let second = engine.reserve(order, &items, "k2").await.unwrap();

        let (first_lines, second_lines, idempotent) = match (first, second) {
            (
                ReserveOutcome::Reserved { lines: a, .. },
                ReserveOutcome::Reserved {
                    lines: b,
                    idempotent,
                    ..
                },
            ) => (a, b, idempotent),
            other => panic!("expected two reserved outcomes, got {other:?}"),
        };

        assert!(idempotent);
        assert_eq!(first_lines, second_lines);
        // The counter moved exactly once.
        assert_eq!(row(&engine, "1", "WH1").await.reserved, 2);
    }

    #[tokio::test]
    async fn test_duplicate_key_after_release_is_rejected() {
        let engine = engine_with_stock(&[("1", "WH1", 10)]).await;
        let order = OrderId::new();

        engine
            .reserve(order, &[ReserveItem::new("1", 2)], "k3")
            .await
            .unwrap();
        engine.release(order).await.unwrap();

        let err = engine
            .reserve(order, &[ReserveItem::new("1", 2)], "k3")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InventoryError::DuplicateIdempotencyKey { .. }
        ));
    }

    #[tokio::test]
    async fn test_reserve_validation() {
        let engine = engine_with_stock(&[("1", "WH1", 10)]).await;

        let empty = engine.reserve(OrderId::new(), &[], "k").await.unwrap_err();
        assert!(matches!(empty, InventoryError::EmptyItems));

        let zero = engine
            .reserve(OrderId::new(), &[ReserveItem::new("1", 0)], "k")
            .await
            .unwrap_err();
        assert!(matches!(zero, InventoryError::InvalidQuantity { .. }));

        // No writes happened.
        assert_eq!(row(&engine, "1", "WH1").await.reserved, 0);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let engine = engine_with_stock(&[("1", "WH1", 10)]).await;
        let order = OrderId::new();
        engine
            .reserve(order, &[ReserveItem::new("1", 4)], "k1")
            .await
            .unwrap();

        assert_eq!(engine.release(order).await.unwrap(), 1);
        assert_eq!(engine.release(order).await.unwrap(), 0);

        assert_eq!(row(&engine, "1", "WH1").await.reserved, 0);
        // One RESERVE + one RELEASE, not two releases.
        let movements = engine.movements(&product("1")).await.unwrap();
        assert_eq!(movements.len(), 2);
    }

    #[tokio::test]
    async fn test_confirm_fences_reaper() {
        let engine = ReservationEngine::new(
            InMemoryInventoryStore::new(),
            EngineConfig {
                reservation_ttl: Duration::seconds(0),
                ..EngineConfig::default()
            },
        );
        engine.set_stock(&product("1"), "WH1", 10).await.unwrap();
        let order = OrderId::new();
        engine
            .reserve(order, &[ReserveItem::new("1", 2)], "k1")
            .await
            .unwrap();

        assert_eq!(engine.confirm(order, None).await.unwrap(), 1);

        // Even though the TTL has passed, the confirmed hold survives.
        let outcome = engine
            .expire_due(Utc::now() + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(outcome.expired_count, 0);
        assert_eq!(row(&engine, "1", "WH1").await.reserved, 2);
    }

    #[tokio::test]
    async fn test_reaper_expires_and_releases() {
        let engine = ReservationEngine::new(
            InMemoryInventoryStore::new(),
            EngineConfig {
                reservation_ttl: Duration::seconds(0),
                ..EngineConfig::default()
            },
        );
        engine.set_stock(&product("1"), "WH1", 10).await.unwrap();
        let order = OrderId::new();
        engine
            .reserve(order, &[ReserveItem::new("1", 3)], "k1")
            .await
            .unwrap();
        assert_eq!(row(&engine, "1", "WH1").await.reserved, 3);

        let outcome = engine
            .expire_due(Utc::now() + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(outcome.expired_count, 1);
        assert_eq!(row(&engine, "1", "WH1").await.reserved, 0);

        let movements = engine.movements(&product("1")).await.unwrap();
        assert_eq!(movements[0].kind, MovementKind::Release);
        assert!(movements[0].note.contains("auto-release"));
    }

    #[tokio::test]
    async fn test_reaper_then_release_is_noop_on_inventory() {
        let engine = ReservationEngine::new(
            InMemoryInventoryStore::new(),
            EngineConfig {
                reservation_ttl: Duration::seconds(0),
                ..EngineConfig::default()
            },
        );
        engine.set_stock(&product("1"), "WH1", 10).await.unwrap();
        let order = OrderId::new();
        engine
            .reserve(order, &[ReserveItem::new("1", 3)], "k1")
            .await
            .unwrap();

        engine
            .expire_due(Utc::now() + Duration::minutes(1))
            .await
            .unwrap();
        // The hold is already EXPIRED; release must not touch counters.
        assert_eq!(engine.release(order).await.unwrap(), 0);
        assert_eq!(row(&engine, "1", "WH1").await.reserved, 0);
        assert_eq!(row(&engine, "1", "WH1").await.on_hand, 10);
    }

    #[tokio::test]
    async fn test_ship_consumes_stock_and_fences_reaper() {
        let engine = ReservationEngine::new(
            InMemoryInventoryStore::new(),
            EngineConfig {
                reservation_ttl: Duration::seconds(0),
                ..EngineConfig::default()
            },
        );
        engine.set_stock(&product("1"), "WH1", 10).await.unwrap();
        let order = OrderId::new();
        engine
            .reserve(order, &[ReserveItem::new("1", 2)], "k1")
            .await
            .unwrap();

        engine
            .ship(
                order,
                &[ShipItem {
                    product_id: product("1"),
                    quantity: 2,
                    warehouse: "WH1".to_string(),
                    sku: None,
                }],
            )
            .await
            .unwrap();

        let after = row(&engine, "1", "WH1").await;
        assert_eq!(after.on_hand, 8);
        assert_eq!(after.reserved, 0);

        // An expiry pass after shipment must not release again.
        let outcome = engine
            .expire_due(Utc::now() + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(outcome.expired_count, 0);
        assert_eq!(row(&engine, "1", "WH1").await.on_hand, 8);
    }

    #[tokio::test]
    async fn test_ship_rejects_zero_quantity() {
        let engine = engine_with_stock(&[("1", "WH1", 10)]).await;
        let err = engine
            .ship(
                OrderId::new(),
                &[ShipItem {
                    product_id: product("1"),
                    quantity: 0,
                    warehouse: "WH1".to_string(),
                    sku: None,
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::InvalidQuantity { .. }));
    }
}
