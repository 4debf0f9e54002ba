//! End-to-end saga tests against the public crate API.

use std::str::FromStr;
use std::sync::Arc;

use common::{CustomerId, Money, ProductId};
use domain::{OrderLine, PricedLine, TotalsBreakdown};
use inventory::{EngineConfig, InMemoryInventoryStore, ReservationEngine};
use order_store::{InMemoryIdempotencyStore, InMemoryOrderStore, OrderStore};
use rust_decimal::Decimal;
use saga::{
    CreateOrderCommand, CreateOrderOutcome, InMemoryCatalogService, InMemoryPaymentService,
    LocalInventoryService, SagaConfig, SagaCoordinator,
};

fn money(s: &str) -> Money {
    Money::new(Decimal::from_str(s).unwrap())
}

struct World {
    coordinator: SagaCoordinator<InMemoryOrderStore, InMemoryIdempotencyStore>,
    orders: InMemoryOrderStore,
    engine: Arc<ReservationEngine<InMemoryInventoryStore>>,
    payment: InMemoryPaymentService,
}

async fn world() -> World {
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
    engine
        .set_stock(&ProductId::new("1"), "WH1", 10)
        .await
        .unwrap();
    engine
        .set_stock(&ProductId::new("2"), "WH1", 5)
        .await
        .unwrap();

    let coordinator = SagaCoordinator::new(
        orders.clone(),
        idempotency.clone(),
        Arc::new(catalog),
        Arc::new(LocalInventoryService::new(engine.clone())),
        Arc::new(payment.clone()),
        SagaConfig::default(),
    );

    World {
        coordinator,
        orders,
        engine,
        payment,
    }
}

fn command(lines: Vec<OrderLine>) -> CreateOrderCommand {
    CreateOrderCommand {
        customer_id: CustomerId::new("1"),
        lines,
        payment_method: Some("card".to_string()),
    }
}

#[tokio::test]
async fn stored_totals_are_recomputable_from_persisted_items() {
    let w = world().await;

    let outcome = w
        .coordinator
        .create_order(
            command(vec![OrderLine::new("1", 2), OrderLine::new("2", 1)]),
            "k-recompute",
            "hash",
        )
        .await
        .unwrap();
    let reply = match outcome {
        CreateOrderOutcome::Created(reply) => reply,
        other => panic!("expected created, got {other:?}"),
    };

    let (order, items) = w.orders.get_order(reply.order_id).await.unwrap().unwrap();

    let lines: Vec<PricedLine> = items
        .iter()
        .map(|i| PricedLine {
            product_id: i.product_id.clone(),
            quantity: i.quantity,
            unit_price: i.unit_price,
        })
        .collect();
    let recomputed = TotalsBreakdown::compute(&lines, w.coordinator.totals_config());

    assert_eq!(recomputed.total, order.total);
    assert!(recomputed.verify_signature(&lines, &order.totals_signature));
}

#[tokio::test]
async fn inventory_counters_line_up_after_mixed_outcomes() {
    let w = world().await;

    // One success, one payment failure.
    w.coordinator
        .create_order(command(vec![OrderLine::new("1", 2)]), "k-ok", "hash")
        .await
        .unwrap();

    w.payment.set_fail_on_charge(true);
    w.coordinator
        .create_order(command(vec![OrderLine::new("1", 3)]), "k-fail", "hash")
        .await
        .unwrap_err();

    // Only the successful order's hold remains.
    let rows = w.engine.stock_levels(&ProductId::new("1")).await.unwrap();
    assert_eq!(rows[0].reserved, 2);
    assert_eq!(rows[0].on_hand, 10);

    // Ledger shows the full history: two reserves and one release.
    let movements = w.engine.movements(&ProductId::new("1")).await.unwrap();
    assert_eq!(movements.len(), 3);
}

#[tokio::test]
async fn response_item_order_matches_request_order() {
    let w = world().await;

    let outcome = w
        .coordinator
        .create_order(
            command(vec![OrderLine::new("2", 1), OrderLine::new("1", 2)]),
            "k-order",
            "hash",
        )
        .await
        .unwrap();
    let reply = match outcome {
        CreateOrderOutcome::Created(reply) => reply,
        other => panic!("expected created, got {other:?}"),
    };

    assert_eq!(reply.items[0].product_id, ProductId::new("2"));
    assert_eq!(reply.items[1].product_id, ProductId::new("1"));
}

#[tokio::test]
async fn request_body_hash_is_sha256_hex() {
    let hash = saga::coordinator::request_body_hash(b"{}");
    assert_eq!(hash.len(), 64);
    assert_eq!(
        hash,
        "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
    );
}
