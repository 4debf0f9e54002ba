//! Totals calculation and the tamper-evident signature.
//!
//! All four monetary outputs (subtotal, tax, shipping, total) are rounded
//! to two decimals with banker's rounding. The signature is a SHA-256
//! digest over a canonical JSON encoding of the breakdown, with items
//! sorted by product identifier so the digest is independent of request
//! ordering.

use common::{Money, ProductId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Tax and shipping knobs for totals computation.
#[derive(Debug, Clone)]
pub struct TotalsConfig {
    /// Tax rate applied to the subtotal.
    pub tax_rate: Decimal,
    /// Flat shipping override. When absent, shipping is
    /// `10.00 + total quantity × 2.00`.
    pub shipping_cost: Option<Money>,
}

impl Default for TotalsConfig {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(5, 2),
            shipping_cost: None,
        }
    }
}

/// One priced line feeding the totals calculator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

/// The computed totals breakdown attached to an order response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalsBreakdown {
    pub subtotal: Money,
    pub tax_rate: Decimal,
    pub tax_amount: Money,
    pub shipping_cost: Money,
    pub total: Money,
}

impl TotalsBreakdown {
    /// Computes the breakdown for the given priced lines.
    pub fn compute(lines: &[PricedLine], config: &TotalsConfig) -> Self {
        let subtotal: Money = lines
            .iter()
            .map(|l| l.unit_price.multiply(l.quantity))
            .sum::<Money>()
            .round2();

        let tax_amount = Money::new(subtotal.amount() * config.tax_rate).round2();

        let total_quantity: u32 = lines.iter().map(|l| l.quantity).sum();
        let shipping_cost = config
            .shipping_cost
            .unwrap_or_else(|| {
                Money::new(Decimal::new(1000, 2) + Decimal::from(total_quantity) * Decimal::TWO)
            })
            .round2();

        let total = (subtotal + tax_amount + shipping_cost).round2();

        Self {
            subtotal,
            tax_rate: config.tax_rate,
            tax_amount,
            shipping_cost,
            total,
        }
    }

    /// Computes the SHA-256 hex signature over the canonical breakdown.
    pub fn signature(&self, lines: &[PricedLine]) -> String {
        let mut items: Vec<&PricedLine> = lines.iter().collect();
        items.sort_by(|a, b| a.product_id.cmp(&b.product_id));

        let canonical = CanonicalTotals {
            items: items
                .into_iter()
                .map(|l| CanonicalItem {
                    product_id: l.product_id.as_str(),
                    quantity: l.quantity,
                    unit_price: l.unit_price.round2(),
                })
                .collect(),
            subtotal: self.subtotal.round2(),
            tax_rate: self.tax_rate,
            tax_amount: self.tax_amount.round2(),
            shipping_cost: self.shipping_cost.round2(),
            total: self.total.round2(),
        };

        // Struct serialization is field-ordered, so the encoding is stable.
        let encoded = serde_json::to_vec(&canonical).expect("canonical totals serialize");
        hex::encode(Sha256::digest(&encoded))
    }

    /// Re-verifies a stored signature against the same lines.
    pub fn verify_signature(&self, lines: &[PricedLine], expected: &str) -> bool {
        self.signature(lines) == expected
    }
}

#[derive(Serialize)]
struct CanonicalTotals<'a> {
    items: Vec<CanonicalItem<'a>>,
    subtotal: Money,
    tax_rate: Decimal,
    tax_amount: Money,
    shipping_cost: Money,
    total: Money,
}

#[derive(Serialize)]
struct CanonicalItem<'a> {
    product_id: &'a str,
    quantity: u32,
    unit_price: Money,
}
