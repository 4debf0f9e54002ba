//! In-memory store implementations.
//!
//! Default backend when no database is configured, and the backend used by
//! the test suites. Provides the same interface and atomicity guarantees as
//! the PostgreSQL implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, PaymentRef};
use domain::{LineStatus, Order, OrderItem, OrderStatus, PaymentStatus};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::store::{
    AcquireOutcome, IdempotencyRecord, IdempotencyStore, OrderStore, RecordState,
};

/// In-memory order store.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderId, (Order, Vec<OrderItem>)>>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert_order(&self, order: &Order, items: &[OrderItem]) -> Result<()> {
        let mut orders = self.orders.write().await;
        orders.insert(order.id, (order.clone(), items.to_vec()));
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<(Order, Vec<OrderItem>)>> {
        let orders = self.orders.read().await;
        Ok(orders.get(&id).cloned())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<(Order, Vec<OrderItem>)>> {
        let orders = self.orders.read().await;
        let mut all: Vec<_> = orders.values().cloned().collect();
        all.sort_by(|a, b| b.0.created_at.cmp(&a.0.created_at));
        all.truncate(limit);
        Ok(all)
    }

    async fn record_payment(
        &self,
        id: OrderId,
        status: PaymentStatus,
        reference: Option<PaymentRef>,
    ) -> Result<()> {
        let mut orders = self.orders.write().await;
        let (order, _) = orders.get_mut(&id).ok_or(StoreError::OrderNotFound(id))?;
        order.payment_status = status;
        order.payment_ref = reference;
        Ok(())
    }

    async fn cancel_order(&self, id: OrderId) -> Result<()> {
        let mut orders = self.orders.write().await;
        let (order, items) = orders.get_mut(&id).ok_or(StoreError::OrderNotFound(id))?;
        order.status = OrderStatus::Cancelled;
        order.payment_status = PaymentStatus::Failed;
        for item in items.iter_mut() {
            item.status = LineStatus::Cancelled;
        }
        Ok(())
    }
}

/// In-memory idempotency store.
#[derive(Clone, Default)]
pub struct InMemoryIdempotencyStore {
    records: Arc<RwLock<HashMap<String, IdempotencyRecord>>>,
}

impl InMemoryIdempotencyStore {
    /// Creates a new empty in-memory idempotency store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn acquire(
        &self,
        key: &str,
        resource_path: &str,
        body_hash: &str,
    ) -> Result<AcquireOutcome> {
        // Single write lock makes check-then-insert atomic, matching the
        // unique-key insert on the PostgreSQL side.
        let mut records = self.records.write().await;

        if let Some(existing) = records.get(key) {
            return Ok(match (existing.response_status, &existing.response_body) {
                (Some(status), Some(body)) if (200..300).contains(&status) => {
                    AcquireOutcome::Replay {
                        status,
                        body: body.clone(),
                    }
                }
                (Some(_), _) => AcquireOutcome::Conflict {
                    state: RecordState::Failed,
                },
                (None, _) => AcquireOutcome::Conflict {
                    state: RecordState::Pending,
                },
            });
        }

        records.insert(
            key.to_string(),
            IdempotencyRecord {
                key: key.to_string(),
                resource_path: resource_path.to_string(),
                body_hash: body_hash.to_string(),
                response_status: None,
                response_body: None,
                created_at: Utc::now(),
            },
        );
        Ok(AcquireOutcome::Created)
    }

    async fn finalize(&self, key: &str, status: u16, body: &serde_json::Value) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(key)
            .ok_or_else(|| StoreError::RecordNotFound(key.to_string()))?;

        if record.is_finalized() {
            return Err(StoreError::AlreadyFinalized(key.to_string()));
        }

        record.response_status = Some(status);
        record.response_body = Some(body.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        let records = self.records.read().await;
        Ok(records.get(key).cloned())
    }
}
