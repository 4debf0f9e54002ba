//! Order orchestrator.
//!
//! Drives the create-order saga — price, persist, reserve, charge,
//! finalize — exactly once per idempotency key, with compensating actions
//! (cancel order, release reservations) on any step failure after the
//! order record exists.

pub mod coordinator;
pub mod error;
pub mod services;

pub use coordinator::{
    CreateOrderCommand, CreateOrderOutcome, OrderItemReply, OrderReply, SagaConfig,
    SagaCoordinator, TotalsReply,
};
pub use error::SagaError;
pub use services::catalog::{
    CatalogError, CatalogService, HttpCatalogService, InMemoryCatalogService, ProductDetails,
};
pub use services::inventory::{
    HttpInventoryService, InventoryGatewayError, InventoryService, LocalInventoryService,
};
pub use services::payment::{
    ChargeReceipt, HttpPaymentService, InMemoryPaymentService, PaymentError, PaymentService,
};
