//! Inventory service seam for the orchestrator.
//!
//! The engine usually runs in-process ([`LocalInventoryService`]); the HTTP
//! adapter covers deployments where inventory is a separate service.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, ReservationId};
use inventory::{
    AllocationStrategy, InventoryError, InventoryStore, ReservationEngine, ReserveItem,
    ReserveOutcome, ReservedLine, UnavailableLine,
};
use serde::Deserialize;
use thiserror::Error;

/// Errors surfaced by the inventory gateway.
#[derive(Debug, Error)]
pub enum InventoryGatewayError {
    /// The idempotency key was already consumed by dead reservations.
    #[error("duplicate idempotency key: {key}")]
    Duplicate { key: String },

    /// The engine rejected the request before writing anything.
    #[error("invalid reserve request: {0}")]
    Rejected(String),

    /// The inventory service answered with an unexpected HTTP status.
    #[error("inventory returned status {0}")]
    UnexpectedStatus(u16),

    /// The inventory service could not be reached.
    #[error("inventory transport error: {0}")]
    Transport(String),

    /// Backend failure inside the engine.
    #[error("inventory error: {0}")]
    Internal(String),
}

/// Client against the inventory engine.
#[async_trait]
pub trait InventoryService: Send + Sync {
    /// Reserves stock for the order under the client's idempotency key.
    async fn reserve(
        &self,
        order_id: OrderId,
        items: &[ReserveItem],
        idempotency_key: &str,
    ) -> Result<ReserveOutcome, InventoryGatewayError>;

    /// Releases all active reservations for the order.
    async fn release(&self, order_id: OrderId) -> Result<(), InventoryGatewayError>;
}

/// In-process gateway wrapping a [`ReservationEngine`].
#[derive(Clone)]
pub struct LocalInventoryService<S> {
    engine: Arc<ReservationEngine<S>>,
}

impl<S> LocalInventoryService<S> {
    /// Creates a gateway over a shared engine.
    pub fn new(engine: Arc<ReservationEngine<S>>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl<S: InventoryStore> InventoryService for LocalInventoryService<S> {
    async fn reserve(
        &self,
        order_id: OrderId,
        items: &[ReserveItem],
        idempotency_key: &str,
    ) -> Result<ReserveOutcome, InventoryGatewayError> {
        self.engine
            .reserve(order_id, items, idempotency_key)
            .await
            .map_err(map_engine_error)
    }

    async fn release(&self, order_id: OrderId) -> Result<(), InventoryGatewayError> {
        self.engine
            .release(order_id)
            .await
            .map(|_| ())
            .map_err(map_engine_error)
    }
}

fn map_engine_error(err: InventoryError) -> InventoryGatewayError {
    match err {
        InventoryError::DuplicateIdempotencyKey { key } => {
            InventoryGatewayError::Duplicate { key }
        }
        e @ (InventoryError::EmptyItems | InventoryError::InvalidQuantity { .. }) => {
            InventoryGatewayError::Rejected(e.to_string())
        }
        InventoryError::Database(e) => InventoryGatewayError::Internal(e.to_string()),
    }
}

/// HTTP inventory adapter.
#[derive(Clone)]
pub struct HttpInventoryService {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReserveResponse {
    status: String,
    #[serde(default)]
    items: Vec<ReservedLineWire>,
    #[serde(default)]
    unavailable: Vec<UnavailableLineWire>,
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    idempotent: bool,
    allocation_strategy: Option<AllocationStrategy>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReservedLineWire {
    reservation_id: ReservationId,
    product_id: ProductId,
    sku: String,
    warehouse: String,
    qty_reserved: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnavailableLineWire {
    product_id: ProductId,
    sku: Option<String>,
    qty_requested: u32,
    qty_available: i64,
}

impl HttpInventoryService {
    /// Creates an adapter against the given base URL with a per-call
    /// timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client");
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl InventoryService for HttpInventoryService {
    async fn reserve(
        &self,
        order_id: OrderId,
        items: &[ReserveItem],
        idempotency_key: &str,
    ) -> Result<ReserveOutcome, InventoryGatewayError> {
        let body = serde_json::json!({
            "orderId": order_id,
            "items": items
                .iter()
                .map(|i| {
                    serde_json::json!({
                        "productId": i.product_id,
                        "qty": i.quantity,
                        "sku": i.sku,
                    })
                })
                .collect::<Vec<_>>(),
        });

        let response = self
            .client
            .post(format!("{}/v1/inventory/reserve", self.base_url))
            .header("Idempotency-Key", idempotency_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| InventoryGatewayError::Transport(e.to_string()))?;

        match response.status().as_u16() {
            200 => {}
            409 => {
                return Err(InventoryGatewayError::Duplicate {
                    key: idempotency_key.to_string(),
                });
            }
            status => return Err(InventoryGatewayError::UnexpectedStatus(status)),
        }

        let reply: ReserveResponse = response
            .json()
            .await
            .map_err(|e| InventoryGatewayError::Transport(e.to_string()))?;

        let lines: Vec<ReservedLine> = reply
            .items
            .into_iter()
            .map(|l| ReservedLine {
                reservation_id: l.reservation_id,
                product_id: l.product_id,
                sku: l.sku,
                warehouse: l.warehouse,
                quantity: l.qty_reserved,
            })
            .collect();

        match reply.status.as_str() {
            "RESERVED" => Ok(ReserveOutcome::Reserved {
                lines,
                expires_at: reply.expires_at.unwrap_or_else(Utc::now),
                idempotent: reply.idempotent,
                strategy: reply
                    .allocation_strategy
                    .unwrap_or(AllocationStrategy::SingleWarehouse),
            }),
            "PARTIAL" => Ok(ReserveOutcome::Partial {
                reserved: lines,
                unavailable: reply
                    .unavailable
                    .into_iter()
                    .map(|u| UnavailableLine {
                        product_id: u.product_id,
                        sku: u.sku,
                        qty_requested: u.qty_requested,
                        qty_available: u.qty_available,
                    })
                    .collect(),
                expires_at: reply.expires_at,
                action_required: inventory::ACTION_BACKORDER_OR_REDUCE,
            }),
            other => Err(InventoryGatewayError::Internal(format!(
                "unexpected reserve status: {other}"
            ))),
        }
    }

    async fn release(&self, order_id: OrderId) -> Result<(), InventoryGatewayError> {
        let response = self
            .client
            .post(format!("{}/v1/inventory/release", self.base_url))
            .json(&serde_json::json!({ "orderId": order_id }))
            .send()
            .await
            .map_err(|e| InventoryGatewayError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(InventoryGatewayError::UnexpectedStatus(
                response.status().as_u16(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inventory::{EngineConfig, InMemoryInventoryStore};

    #[tokio::test]
    async fn test_local_gateway_reserves_and_releases() {
        let engine = Arc::new(ReservationEngine::new(
            InMemoryInventoryStore::new(),
            EngineConfig::default(),
        ));
        let product = ProductId::new("1");
        engine.set_stock(&product, "WH1", 10).await.unwrap();

        let gateway = LocalInventoryService::new(engine.clone());
        let order = OrderId::new();

        let outcome = gateway
            .reserve(order, &[ReserveItem::new("1", 2)], "k1")
            .await
            .unwrap();
        assert!(matches!(outcome, ReserveOutcome::Reserved { .. }));

        gateway.release(order).await.unwrap();
        let rows = engine.stock_levels(&product).await.unwrap();
        assert_eq!(rows[0].reserved, 0);
    }

    #[tokio::test]
    async fn test_local_gateway_maps_duplicate_key() {
        let engine = Arc::new(ReservationEngine::new(
            InMemoryInventoryStore::new(),
            EngineConfig::default(),
        ));
        engine
            .set_stock(&ProductId::new("1"), "WH1", 10)
            .await
            .unwrap();
        let gateway = LocalInventoryService::new(engine);
        let order = OrderId::new();

        gateway
            .reserve(order, &[ReserveItem::new("1", 2)], "k1")
            .await
            .unwrap();
        gateway.release(order).await.unwrap();

        let err = gateway
            .reserve(order, &[ReserveItem::new("1", 2)], "k1")
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryGatewayError::Duplicate { .. }));
    }
}
