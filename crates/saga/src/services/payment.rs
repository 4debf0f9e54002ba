//! Payment gateway seam.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::{Money, OrderId, PaymentRef};
use serde::Deserialize;
use thiserror::Error;

/// Errors surfaced by the payment adapter.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The gateway answered with a non-SUCCESS status.
    #[error("payment declined with status {status}")]
    Declined { status: String },

    /// The gateway reported success but returned no payment identifier.
    #[error("payment response missing payment id")]
    MissingPaymentId,

    /// The gateway answered with a non-2xx HTTP status.
    #[error("payment gateway returned status {0}")]
    UnexpectedStatus(u16),

    /// The gateway could not be reached.
    #[error("payment transport error: {0}")]
    Transport(String),
}

/// A successful charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeReceipt {
    pub payment_id: PaymentRef,
    pub reference: Option<String>,
}

/// Client against the payment gateway. A returned receipt always carries a
/// payment identifier and a SUCCESS gateway status; everything else is an
/// error.
#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Charges the order total under an idempotency key.
    async fn charge(
        &self,
        order_id: OrderId,
        amount: Money,
        method: Option<&str>,
        idempotency_key: &str,
    ) -> Result<ChargeReceipt, PaymentError>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    charges: HashMap<String, (OrderId, Money)>,
    next_id: u32,
    fail_on_charge: bool,
}

/// In-memory payment gateway for testing and databaseless runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentService {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentService {
    /// Creates a new in-memory payment gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to decline the next charge call.
    pub fn set_fail_on_charge(&self, fail: bool) {
        self.state.write().unwrap().fail_on_charge = fail;
    }

    /// Returns the number of accepted charges.
    pub fn charge_count(&self) -> usize {
        self.state.read().unwrap().charges.len()
    }
}

#[async_trait]
impl PaymentService for InMemoryPaymentService {
    async fn charge(
        &self,
        order_id: OrderId,
        amount: Money,
        _method: Option<&str>,
        idempotency_key: &str,
    ) -> Result<ChargeReceipt, PaymentError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_charge {
            return Err(PaymentError::Declined {
                status: "DECLINED".to_string(),
            });
        }

        // Same key twice returns the original payment id.
        if state.charges.contains_key(idempotency_key) {
            let existing_id = format!("PAY-{idempotency_key}");
            return Ok(ChargeReceipt {
                payment_id: PaymentRef::new(existing_id),
                reference: None,
            });
        }

        state.next_id += 1;
        state
            .charges
            .insert(idempotency_key.to_string(), (order_id, amount));
        Ok(ChargeReceipt {
            payment_id: PaymentRef::new(format!("PAY-{idempotency_key}")),
            reference: Some(format!("REF-{:04}", state.next_id)),
        })
    }
}

/// HTTP payment adapter.
#[derive(Clone)]
pub struct HttpPaymentService {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct PaymentResponse {
    payment_id: Option<String>,
    status: String,
    reference: Option<String>,
}

impl HttpPaymentService {
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
impl PaymentService for HttpPaymentService {
    async fn charge(
        &self,
        order_id: OrderId,
        amount: Money,
        method: Option<&str>,
        idempotency_key: &str,
    ) -> Result<ChargeReceipt, PaymentError> {
        let body = serde_json::json!({
            "orderId": order_id,
            "amount": amount,
            "method": method,
        });

        let response = self
            .client
            .post(format!("{}/v1/payments", self.base_url))
            .header("Idempotency-Key", idempotency_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PaymentError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PaymentError::UnexpectedStatus(response.status().as_u16()));
        }

        let payment: PaymentResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::Transport(e.to_string()))?;

        if payment.status != "SUCCESS" {
            return Err(PaymentError::Declined {
                status: payment.status,
            });
        }
        let payment_id = payment.payment_id.ok_or(PaymentError::MissingPaymentId)?;

        Ok(ChargeReceipt {
            payment_id: PaymentRef::new(payment_id),
            reference: payment.reference,
        })
    }
}
