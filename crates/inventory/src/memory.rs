//! In-memory inventory store.
//!
//! Default backend and test backend. A single lock over the whole state
//! makes each primitive atomic, matching the guarded-update semantics of
//! the PostgreSQL implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, ReservationId};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::model::{InventoryRow, Movement, Reservation, ReservationStatus};
use crate::store::{InsertOutcome, InventoryStore};

#[derive(Default)]
struct State {
    rows: HashMap<(ProductId, String), InventoryRow>,
    reservations: HashMap<ReservationId, Reservation>,
    // (idempotency_key, order, product) → reservation, mirroring the
    // composite unique index on the PostgreSQL side.
    unique_index: HashMap<(String, OrderId, ProductId), ReservationId>,
    movements: Vec<Movement>,
}

/// In-memory inventory store.
#[derive(Clone, Default)]
pub struct InMemoryInventoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryInventoryStore {
    /// Creates a new empty in-memory inventory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of ledger entries.
    pub async fn movement_count(&self) -> usize {
        self.state.read().await.movements.len()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn upsert_stock(
        &self,
        product_id: &ProductId,
        warehouse: &str,
        on_hand: i64,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let key = (product_id.clone(), warehouse.to_string());
        state
            .rows
            .entry(key)
            .and_modify(|row| {
                row.on_hand = on_hand;
                row.updated_at = Utc::now();
            })
            .or_insert_with(|| InventoryRow {
                product_id: product_id.clone(),
                warehouse: warehouse.to_string(),
                on_hand,
                reserved: 0,
                updated_at: Utc::now(),
            });
        Ok(())
    }

    async fn rows_for_products(&self, products: &[ProductId]) -> Result<Vec<InventoryRow>> {
        let state = self.state.read().await;
        let mut rows: Vec<InventoryRow> = state
            .rows
            .values()
            .filter(|row| products.contains(&row.product_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.product_id
                .cmp(&b.product_id)
                .then_with(|| a.warehouse.cmp(&b.warehouse))
        });
        Ok(rows)
    }

    async fn try_reserve(
        &self,
        product_id: &ProductId,
        warehouse: &str,
        quantity: u32,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let key = (product_id.clone(), warehouse.to_string());
        match state.rows.get_mut(&key) {
            Some(row) if row.available() >= i64::from(quantity) => {
                row.reserved += i64::from(quantity);
                row.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_reserved(
        &self,
        product_id: &ProductId,
        warehouse: &str,
        quantity: u32,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let key = (product_id.clone(), warehouse.to_string());
        if let Some(row) = state.rows.get_mut(&key) {
            row.reserved = (row.reserved - i64::from(quantity)).max(0);
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn consume_stock(
        &self,
        product_id: &ProductId,
        warehouse: &str,
        quantity: u32,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let key = (product_id.clone(), warehouse.to_string());
        if let Some(row) = state.rows.get_mut(&key) {
            row.on_hand = (row.on_hand - i64::from(quantity)).max(0);
            row.reserved = (row.reserved - i64::from(quantity)).max(0);
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn insert_reservation(&self, reservation: &Reservation) -> Result<InsertOutcome> {
        let mut state = self.state.write().await;
        let unique_key = (
            reservation.idempotency_key.clone(),
            reservation.order_id,
            reservation.product_id.clone(),
        );

        if let Some(existing_id) = state.unique_index.get(&unique_key) {
            let existing = state.reservations[existing_id].clone();
            return Ok(InsertOutcome::Duplicate(existing));
        }

        state.unique_index.insert(unique_key, reservation.id);
        state
            .reservations
            .insert(reservation.id, reservation.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn reservations_for_key(
        &self,
        order_id: OrderId,
        key: &str,
    ) -> Result<Vec<Reservation>> {
        let state = self.state.read().await;
        let mut matches: Vec<Reservation> = state
            .reservations
            .values()
            .filter(|r| r.order_id == order_id && r.idempotency_key == key)
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        Ok(matches)
    }

    async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<Reservation>> {
        let state = self.state.read().await;
        let mut matches: Vec<Reservation> = state
            .reservations
            .values()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.reserved_at.cmp(&b.reserved_at));
        Ok(matches)
    }

    async fn transition_reservation(
        &self,
        id: ReservationId,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.reservations.get_mut(&id) {
            Some(r) if r.status == from => {
                r.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expired_active(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>> {
        let state = self.state.read().await;
        Ok(state
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Active && r.expires_at < now)
            .cloned()
            .collect())
    }

    async fn append_movement(&self, movement: &Movement) -> Result<()> {
        let mut state = self.state.write().await;
        state.movements.push(movement.clone());
        Ok(())
    }

    async fn movements_for_product(&self, product_id: &ProductId) -> Result<Vec<Movement>> {
        let state = self.state.read().await;
        let mut matches: Vec<Movement> = state
            .movements
            .iter()
            .filter(|m| &m.product_id == product_id)
            .cloned()
            .collect();
        matches.reverse();
        Ok(matches)
    }
}
