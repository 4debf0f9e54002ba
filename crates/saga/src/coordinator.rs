//! The create-order saga coordinator.
//!
//! Phases: idempotency gate → pricing → totals & persistence → inventory
//! reservation → payment charge → finalize. Every failure after the order
//! record exists compensates by cancelling the order and, when stock was
//! held, releasing the reservations. The coordinator never retries remote
//! calls; clients retry with the same idempotency key and get a replay.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, PaymentRef, ProductId};
use domain::{
    Order, OrderItem, OrderLine, OrderStatus, PaymentStatus, PricedLine, TotalsBreakdown,
    TotalsConfig, validate_lines,
};
use inventory::{ReserveItem, ReserveOutcome};
use order_store::{AcquireOutcome, IdempotencyStore, OrderStore};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::SagaError;
use crate::services::catalog::{CatalogService, ProductDetails};
use crate::services::inventory::InventoryService;
use crate::services::payment::PaymentService;

/// Resource path recorded on idempotency records for order creation.
const ORDERS_RESOURCE: &str = "/v1/orders";

/// Saga tuning knobs.
#[derive(Debug, Clone, Default)]
pub struct SagaConfig {
    /// Tax and shipping configuration for the totals calculator.
    pub totals: TotalsConfig,
}

/// The create-order request after boundary normalization.
#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderCommand {
    pub customer_id: CustomerId,
    pub lines: Vec<OrderLine>,
    pub payment_method: Option<String>,
}

/// Wire response for a created (or fetched) order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReply {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_ref: Option<PaymentRef>,
    pub items: Vec<OrderItemReply>,
    pub totals: TotalsReply,
    pub totals_signature: String,
    pub created_at: DateTime<Utc>,
}

/// Wire shape of one order line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemReply {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub tax_rate: Decimal,
    pub status: domain::LineStatus,
}

/// Wire shape of the totals breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalsReply {
    pub subtotal: Money,
    pub tax_rate: Decimal,
    pub tax_amount: Money,
    pub shipping_cost: Money,
    pub total: Money,
}

impl From<&TotalsBreakdown> for TotalsReply {
    fn from(t: &TotalsBreakdown) -> Self {
        Self {
            subtotal: t.subtotal,
            tax_rate: t.tax_rate,
            tax_amount: t.tax_amount,
            shipping_cost: t.shipping_cost,
            total: t.total,
        }
    }
}

impl OrderReply {
    /// Builds the wire response from persisted parts. Item order matches
    /// the stored (request) order.
    pub fn from_parts(order: &Order, items: &[OrderItem], totals: &TotalsBreakdown) -> Self {
        Self {
            order_id: order.id,
            customer_id: order.customer_id.clone(),
            status: order.status,
            payment_status: order.payment_status,
            payment_ref: order.payment_ref.clone(),
            items: items
                .iter()
                .map(|i| OrderItemReply {
                    product_id: i.product_id.clone(),
                    sku: i.sku.clone(),
                    name: i.product_name.clone(),
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                    tax_rate: i.tax_rate,
                    status: i.status,
                })
                .collect(),
            totals: totals.into(),
            totals_signature: order.totals_signature.clone(),
            created_at: order.created_at,
        }
    }
}

/// Outcome of submitting a create-order request.
#[derive(Debug, Clone)]
pub enum CreateOrderOutcome {
    /// The saga ran to completion for this request.
    Created(OrderReply),
    /// An earlier run with the same key already succeeded; the stored
    /// response is replayed verbatim.
    Replayed {
        status: u16,
        body: serde_json::Value,
    },
}

/// SHA-256 hex digest of a raw request body, stored on the idempotency
/// record for auditing.
pub fn request_body_hash(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

/// Orchestrates the create-order workflow.
pub struct SagaCoordinator<S, K> {
    orders: S,
    idempotency: K,
    catalog: Arc<dyn CatalogService>,
    inventory: Arc<dyn InventoryService>,
    payment: Arc<dyn PaymentService>,
    config: SagaConfig,
}

impl<S, K> SagaCoordinator<S, K>
where
    S: OrderStore,
    K: IdempotencyStore,
{
    /// Creates a new coordinator.
    pub fn new(
        orders: S,
        idempotency: K,
        catalog: Arc<dyn CatalogService>,
        inventory: Arc<dyn InventoryService>,
        payment: Arc<dyn PaymentService>,
        config: SagaConfig,
    ) -> Self {
        Self {
            orders,
            idempotency,
            catalog,
            inventory,
            payment,
            config,
        }
    }

    /// The totals configuration in effect.
    pub fn totals_config(&self) -> &TotalsConfig {
        &self.config.totals
    }

    /// Executes the create-order saga.
    ///
    /// `body_hash` is the digest of the raw request body as received at the
    /// boundary; it is recorded for observability and never used to gate
    /// replay — the client owns key uniqueness.
    #[tracing::instrument(skip(self, cmd, body_hash), fields(customer_id = %cmd.customer_id))]
    pub async fn create_order(
        &self,
        cmd: CreateOrderCommand,
        idempotency_key: &str,
        body_hash: &str,
    ) -> Result<CreateOrderOutcome, SagaError> {
        metrics::counter!("saga_executions_total").increment(1);
        let started = std::time::Instant::now();

        // Fail-fast validation: no state is written for a bad request.
        validate_lines(&cmd.lines)?;

        // Phase 1: idempotency gate.
        match self
            .idempotency
            .acquire(idempotency_key, ORDERS_RESOURCE, body_hash)
            .await?
        {
            AcquireOutcome::Created => {}
            AcquireOutcome::Replay { status, body } => {
                tracing::info!(key = idempotency_key, "replaying finalized order response");
                metrics::counter!("saga_replays_total").increment(1);
                return Ok(CreateOrderOutcome::Replayed { status, body });
            }
            AcquireOutcome::Conflict { state } => {
                return Err(SagaError::IdempotencyConflict { state });
            }
        }

        // From here on, the idempotency record must be finalized whatever
        // happens, so a retry with the same key is deterministic.
        let result = self.run_phases(&cmd, idempotency_key).await;

        let duration = started.elapsed().as_secs_f64();
        metrics::histogram!("saga_duration_seconds").record(duration);

        match result {
            Ok(reply) => {
                let body = serde_json::to_value(&reply)
                    .map_err(order_store::StoreError::Serialization)?;
                self.finalize_record(idempotency_key, 201, &body).await;
                metrics::counter!("saga_completed_total").increment(1);
                tracing::info!(order_id = %reply.order_id, duration, "order saga completed");
                Ok(CreateOrderOutcome::Created(reply))
            }
            Err(err) => {
                self.finalize_record(idempotency_key, err.status(), &err.envelope())
                    .await;
                metrics::counter!("saga_failed_total").increment(1);
                tracing::warn!(error = %err, "order saga failed");
                Err(err)
            }
        }
    }

    /// Phases 2–6. Any error after the order insert has already run
    /// compensation by the time it is returned.
    async fn run_phases(
        &self,
        cmd: &CreateOrderCommand,
        idempotency_key: &str,
    ) -> Result<OrderReply, SagaError> {
        // Phase 2: one batch price call, then per-product detail lookups
        // in parallel. Any miss fails the saga before any write.
        let mut product_ids: Vec<ProductId> =
            cmd.lines.iter().map(|l| l.product_id.clone()).collect();
        product_ids.sort();
        product_ids.dedup();

        let prices = self.catalog.prices(&product_ids).await?;
        let details = futures_util::future::try_join_all(
            product_ids.iter().map(|id| self.catalog.details(id)),
        )
        .await?;
        let details: HashMap<ProductId, ProductDetails> =
            product_ids.iter().cloned().zip(details).collect();

        // Phase 3: totals, signature, and the PENDING order in one write.
        let priced: Vec<PricedLine> = cmd
            .lines
            .iter()
            .map(|line| {
                let unit_price = prices
                    .get(&line.product_id)
                    .copied()
                    .ok_or_else(|| crate::services::catalog::CatalogError::MissingProduct(
                        line.product_id.clone(),
                    ))?;
                Ok(PricedLine {
                    product_id: line.product_id.clone(),
                    quantity: line.quantity,
                    unit_price,
                })
            })
            .collect::<Result<_, crate::services::catalog::CatalogError>>()?;

        let totals = TotalsBreakdown::compute(&priced, &self.config.totals);
        let signature = totals.signature(&priced);

        let order = Order::pending(cmd.customer_id.clone(), totals.total, signature);
        let items: Vec<OrderItem> = cmd
            .lines
            .iter()
            .zip(&priced)
            .map(|(line, priced_line)| {
                let detail = &details[&line.product_id];
                OrderItem::new(
                    order.id,
                    line.product_id.clone(),
                    detail.sku.clone(),
                    detail.name.clone(),
                    line.quantity,
                    priced_line.unit_price,
                    self.config.totals.tax_rate,
                )
            })
            .collect();

        self.orders.insert_order(&order, &items).await?;

        // Phase 4: reserve stock. Anything but a full RESERVED answer is a
        // failure; partial allocations are compensated away.
        let reserve_items: Vec<ReserveItem> = items
            .iter()
            .map(|i| ReserveItem {
                product_id: i.product_id.clone(),
                quantity: i.quantity,
                sku: Some(i.sku.clone()),
            })
            .collect();

        match self
            .inventory
            .reserve(order.id, &reserve_items, idempotency_key)
            .await
        {
            Ok(ReserveOutcome::Reserved { .. }) => {}
            Ok(ReserveOutcome::Partial { unavailable, .. }) => {
                // The partial holds are committed on the inventory side;
                // release them along with cancelling the order.
                let err = SagaError::Reservation {
                    order_id: order.id,
                    reason: format!("{} item(s) not available", unavailable.len()),
                };
                self.compensate(order.id, true).await;
                return Err(err);
            }
            Err(e) => {
                let err = SagaError::Reservation {
                    order_id: order.id,
                    reason: e.to_string(),
                };
                self.compensate(order.id, false).await;
                return Err(err);
            }
        }

        // Phase 5: charge the authoritative total.
        let charge_key = format!("order-{}", order.id);
        let receipt = match self
            .payment
            .charge(
                order.id,
                totals.total,
                cmd.payment_method.as_deref(),
                &charge_key,
            )
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                let err = SagaError::Payment {
                    order_id: order.id,
                    reason: e.to_string(),
                };
                self.compensate(order.id, true).await;
                return Err(err);
            }
        };

        // Phase 6: re-verify the stored signature against the persisted
        // lines, then finalize the order.
        let stored = self.orders.get_order(order.id).await?;
        if let Some((stored_order, stored_items)) = stored {
            let stored_lines: Vec<PricedLine> = stored_items
                .iter()
                .map(|i| PricedLine {
                    product_id: i.product_id.clone(),
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                })
                .collect();
            let recomputed = TotalsBreakdown::compute(&stored_lines, &self.config.totals);
            if !recomputed.verify_signature(&stored_lines, &stored_order.totals_signature) {
                let err = SagaError::SignatureMismatch { order_id: order.id };
                self.compensate(order.id, true).await;
                return Err(err);
            }
        }

        self.orders
            .record_payment(
                order.id,
                PaymentStatus::Success,
                Some(receipt.payment_id.clone()),
            )
            .await?;

        let mut final_order = order;
        final_order.payment_status = PaymentStatus::Success;
        final_order.payment_ref = Some(receipt.payment_id);

        Ok(OrderReply::from_parts(&final_order, &items, &totals))
    }

    /// Compensation: cancel the order and, when stock was held, release it.
    ///
    /// A compensation failure is a reconciliation alert, never a new error
    /// surfaced to the client — the original failure stands.
    async fn compensate(&self, order_id: OrderId, release_inventory: bool) {
        metrics::counter!("saga_compensations_total").increment(1);
        tracing::warn!(%order_id, release_inventory, "compensating failed order saga");

        if let Err(e) = self.orders.cancel_order(order_id).await {
            tracing::error!(
                %order_id,
                error = %e,
                "reconciliation required: order cancel failed during compensation"
            );
        }

        if release_inventory
            && let Err(e) = self.inventory.release(order_id).await
        {
            tracing::error!(
                %order_id,
                error = %e,
                "reconciliation required: reservation release failed during compensation"
            );
        }
    }

    /// Finalizes the idempotency record; a repeat finalize is logged and
    /// swallowed because finalized records are immutable.
    async fn finalize_record(&self, key: &str, status: u16, body: &serde_json::Value) {
        if let Err(e) = self.idempotency.finalize(key, status, body).await {
            tracing::warn!(key, error = %e, "idempotency finalize skipped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::InMemoryCatalogService;
    use crate::services::inventory::LocalInventoryService;
    use crate::services::payment::InMemoryPaymentService;
    use inventory::{
        EngineConfig, InMemoryInventoryStore, InventoryStore, ReservationEngine,
        ReservationStatus,
    };
    use order_store::{InMemoryIdempotencyStore, InMemoryOrderStore};
    use std::str::FromStr;

    struct Harness {
        coordinator: SagaCoordinator<InMemoryOrderStore, InMemoryIdempotencyStore>,
        orders: InMemoryOrderStore,
        idempotency: InMemoryIdempotencyStore,
        catalog: InMemoryCatalogService,
        payment: InMemoryPaymentService,
        engine: Arc<ReservationEngine<InMemoryInventoryStore>>,
    }

    fn money(s: &str) -> Money {
        Money::new(Decimal::from_str(s).unwrap())
    }

    async fn harness() -> Harness {
        let orders = InMemoryOrderStore::new();
        let idempotency = InMemoryIdempotencyStore::new();
        let catalog = InMemoryCatalogService::new();
        let payment = InMemoryPaymentService::new();
        let engine = Arc::new(ReservationEngine::new(
            InMemoryInventoryStore::new(),
            EngineConfig::default(),
        ));

        catalog.add_product("1", money("10.00"), "SKU-1", "Widget");
        catalog.add_product("2", money("10.00"), "SKU-2", "Gadget");
        engine.set_stock(&ProductId::new("1"), "WH1", 10).await.unwrap();
        engine.set_stock(&ProductId::new("2"), "WH1", 5).await.unwrap();

        let coordinator = SagaCoordinator::new(
            orders.clone(),
            idempotency.clone(),
            Arc::new(catalog.clone()),
            Arc::new(LocalInventoryService::new(engine.clone())),
            Arc::new(payment.clone()),
            SagaConfig::default(),
        );

        Harness {
            coordinator,
            orders,
            idempotency,
            catalog,
            payment,
            engine,
        }
    }

    fn command(lines: Vec<OrderLine>) -> CreateOrderCommand {
        CreateOrderCommand {
            customer_id: CustomerId::new("1"),
            lines,
            payment_method: None,
        }
    }

    async fn reserved(engine: &ReservationEngine<InMemoryInventoryStore>, p: &str) -> i64 {
        engine
            .stock_levels(&ProductId::new(p))
            .await
            .unwrap()
            .iter()
            .map(|r| r.reserved)
            .sum()
    }

    #[tokio::test]
    async fn test_happy_path() {
        let h = harness().await;
        let cmd = command(vec![OrderLine::new("1", 2), OrderLine::new("2", 1)]);

        let outcome = h
            .coordinator
            .create_order(cmd, "k1", "hash")
            .await
            .unwrap();
        let reply = match outcome {
            CreateOrderOutcome::Created(reply) => reply,
            other => panic!("expected created, got {other:?}"),
        };

        // 30.00 + 1.50 tax + 16.00 shipping.
        assert_eq!(reply.totals.total, money("47.50"));
        assert_eq!(reply.payment_status, PaymentStatus::Success);
        assert!(reply.payment_ref.is_some());
        assert_eq!(reply.items.len(), 2);
        assert_eq!(reply.items[0].sku, "SKU-1");

        // Persisted order matches the reply.
        let (stored, items) = h.orders.get_order(reply.order_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
        assert_eq!(stored.payment_status, PaymentStatus::Success);
        assert_eq!(stored.total, money("47.50"));
        assert_eq!(items.len(), 2);

        // Inventory holds both lines.
        assert_eq!(reserved(&h.engine, "1").await, 2);
        assert_eq!(reserved(&h.engine, "2").await, 1);

        // Idempotency record finalized with 201.
        let record = h.idempotency.get("k1").await.unwrap().unwrap();
        assert_eq!(record.response_status, Some(201));
        assert_eq!(h.payment.charge_count(), 1);
    }

    #[tokio::test]
    async fn test_validation_writes_nothing() {
        let h = harness().await;

        let err = h
            .coordinator
            .create_order(command(vec![]), "k1", "hash")
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400);

        // Neither an order nor an idempotency record exists.
        assert_eq!(h.orders.order_count().await, 0);
        assert!(h.idempotency.get("k1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_product_fails_pricing_before_any_write() {
        let h = harness().await;
        let cmd = command(vec![OrderLine::new("404", 1)]);

        let err = h
            .coordinator
            .create_order(cmd, "k1", "hash")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PRICING_FAILED");
        assert!(err.order_id().is_none());
        assert_eq!(h.orders.order_count().await, 0);

        // The key is burned: the failure was finalized on the record.
        let record = h.idempotency.get("k1").await.unwrap().unwrap();
        assert_eq!(record.response_status, Some(500));
    }

    #[tokio::test]
    async fn test_catalog_outage_fails_pricing() {
        let h = harness().await;
        h.catalog.set_fail(true);

        let err = h
            .coordinator
            .create_order(command(vec![OrderLine::new("1", 1)]), "k1", "hash")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PRICING_FAILED");
        assert_eq!(h.orders.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_insufficient_stock_compensates() {
        let h = harness().await;
        // Only 5 of product 2 on hand.
        let cmd = command(vec![OrderLine::new("1", 2), OrderLine::new("2", 50)]);

        let err = h
            .coordinator
            .create_order(cmd, "k1", "hash")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ORDER_CREATION_FAILED");
        let order_id = err.order_id().expect("order id in failure");

        // Order cancelled, partial holds released, payment never attempted.
        let (order, items) = h.orders.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(
            items
                .iter()
                .all(|i| i.status == domain::LineStatus::Cancelled)
        );
        assert_eq!(reserved(&h.engine, "1").await, 0);
        assert_eq!(reserved(&h.engine, "2").await, 0);
        assert_eq!(h.payment.charge_count(), 0);
    }

    #[tokio::test]
    async fn test_payment_failure_compensates() {
        let h = harness().await;
        h.payment.set_fail_on_charge(true);
        let cmd = command(vec![OrderLine::new("1", 2)]);

        let err = h
            .coordinator
            .create_order(cmd, "k1", "hash")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ORDER_CREATION_FAILED");
        assert_eq!(err.status(), 500);
        let order_id = err.order_id().unwrap();

        let (order, _) = h.orders.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.payment_status, PaymentStatus::Failed);

        // Stock back, reservation RELEASED, RELEASE movement appended.
        assert_eq!(reserved(&h.engine, "1").await, 0);
        let holds = h
            .engine
            .store()
            .reservations_for_order(order_id)
            .await
            .unwrap();
        assert!(
            holds
                .iter()
                .all(|r| r.status == ReservationStatus::Released)
        );
        let movements = h.engine.movements(&ProductId::new("1")).await.unwrap();
        assert_eq!(movements[0].kind, inventory::MovementKind::Release);

        // The failure envelope is what a retry will conflict against.
        let record = h.idempotency.get("k1").await.unwrap().unwrap();
        assert_eq!(record.response_status, Some(500));
        assert_eq!(record.response_body.as_ref().unwrap()["error"], "ORDER_CREATION_FAILED");
    }

    #[tokio::test]
    async fn test_successful_key_replays_verbatim() {
        let h = harness().await;
        let cmd = command(vec![OrderLine::new("1", 2)]);

        let first = h
            .coordinator
            .create_order(cmd, "k6", "hash-a")
            .await
            .unwrap();
        let first_reply = match first {
            CreateOrderOutcome::Created(reply) => reply,
            other => panic!("expected created, got {other:?}"),
        };

        // Different body, same key: the stored response comes back.
        let different = command(vec![OrderLine::new("2", 1)]);
        let second = h
            .coordinator
            .create_order(different, "k6", "hash-b")
            .await
            .unwrap();
        match second {
            CreateOrderOutcome::Replayed { status, body } => {
                assert_eq!(status, 201);
                assert_eq!(body, serde_json::to_value(&first_reply).unwrap());
            }
            other => panic!("expected replay, got {other:?}"),
        }

        // No second charge, no extra stock movement.
        assert_eq!(h.payment.charge_count(), 1);
        assert_eq!(reserved(&h.engine, "1").await, 2);
        assert_eq!(reserved(&h.engine, "2").await, 0);
    }

    #[tokio::test]
    async fn test_failed_key_conflicts_on_retry() {
        let h = harness().await;
        h.payment.set_fail_on_charge(true);
        h.coordinator
            .create_order(command(vec![OrderLine::new("1", 1)]), "k7", "hash")
            .await
            .unwrap_err();

        h.payment.set_fail_on_charge(false);
        let err = h
            .coordinator
            .create_order(command(vec![OrderLine::new("1", 1)]), "k7", "hash")
            .await
            .unwrap_err();
        assert_eq!(err.status(), 409);
        assert_eq!(err.code(), "IDEMPOTENCY_CONFLICT");
    }
}
