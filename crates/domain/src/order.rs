//! The order aggregate and its line items.

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, PaymentRef, ProductId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::status::{LineStatus, OrderStatus, PaymentStatus};

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    /// Authoritative total computed by the totals calculator.
    pub total: Money,
    /// SHA-256 hex digest over the canonical totals breakdown.
    pub totals_signature: String,
    pub payment_ref: Option<PaymentRef>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new PENDING order with a PENDING payment.
    pub fn pending(customer_id: CustomerId, total: Money, totals_signature: String) -> Self {
        Self {
            id: OrderId::new(),
            customer_id,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            total,
            totals_signature,
            payment_ref: None,
            created_at: Utc::now(),
        }
    }
}

/// A persisted order line with immutable catalog snapshots.
///
/// Unit price, name, SKU, and tax rate are captured at order time and
/// never updated afterwards, so later catalog changes cannot alter what
/// the customer was charged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub sku: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub tax_rate: Decimal,
    pub status: LineStatus,
}

impl OrderItem {
    /// Creates a new PENDING line for an order.
    pub fn new(
        order_id: OrderId,
        product_id: ProductId,
        sku: impl Into<String>,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
        tax_rate: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            product_id,
            sku: sku.into(),
            product_name: product_name.into(),
            quantity,
            unit_price,
            tax_rate,
            status: LineStatus::Pending,
        }
    }

    /// Returns the total price for this line (quantity × unit price).
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// One requested line of a new order, before pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub sku: Option<String>,
}

impl OrderLine {
    /// Creates a new order line request.
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            sku: None,
        }
    }
}

/// Validates requested order lines before any state is written.
///
/// Rejects empty orders and non-positive quantities.
pub fn validate_lines(lines: &[OrderLine]) -> Result<(), DomainError> {
    if lines.is_empty() {
        return Err(DomainError::EmptyItems);
    }
    for line in lines {
        if line.quantity == 0 {
            return Err(DomainError::InvalidQuantity {
                product_id: line.product_id.clone(),
                quantity: i64::from(line.quantity),
            });
        }
    }
    Ok(())
}
