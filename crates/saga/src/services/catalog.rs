//! Catalog service seam: price and product-detail lookup.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::{Money, ProductId};
use serde::Deserialize;
use thiserror::Error;

/// Errors surfaced by the catalog adapter. The adapter never retries;
/// every failure goes straight to the orchestrator.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog has no price or details for the product.
    #[error("product not found in catalog: {0}")]
    MissingProduct(ProductId),

    /// The catalog answered with a non-2xx status.
    #[error("catalog returned status {0}")]
    UnexpectedStatus(u16),

    /// The catalog could not be reached.
    #[error("catalog transport error: {0}")]
    Transport(String),
}

/// SKU and display name for a product.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProductDetails {
    pub sku: String,
    pub name: String,
}

/// Read-only client against the product catalog.
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Returns current unit prices for the given products in one call.
    async fn prices(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Money>, CatalogError>;

    /// Returns SKU and name for one product.
    async fn details(&self, id: &ProductId) -> Result<ProductDetails, CatalogError>;
}

#[derive(Debug, Default)]
struct InMemoryCatalogState {
    products: HashMap<ProductId, (Money, ProductDetails)>,
    fail: bool,
}

/// In-memory catalog for testing and databaseless runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalogService {
    state: Arc<RwLock<InMemoryCatalogState>>,
}

impl InMemoryCatalogService {
    /// Creates a new empty in-memory catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a product with its price, SKU, and name.
    pub fn add_product(&self, id: impl Into<ProductId>, price: Money, sku: &str, name: &str) {
        self.state.write().unwrap().products.insert(
            id.into(),
            (
                price,
                ProductDetails {
                    sku: sku.to_string(),
                    name: name.to_string(),
                },
            ),
        );
    }

    /// Configures the catalog to fail every call with a transport error.
    pub fn set_fail(&self, fail: bool) {
        self.state.write().unwrap().fail = fail;
    }
}

#[async_trait]
impl CatalogService for InMemoryCatalogService {
    async fn prices(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Money>, CatalogError> {
        let state = self.state.read().unwrap();
        if state.fail {
            return Err(CatalogError::Transport("catalog unavailable".to_string()));
        }
        let mut prices = HashMap::new();
        for id in ids {
            let (price, _) = state
                .products
                .get(id)
                .ok_or_else(|| CatalogError::MissingProduct(id.clone()))?;
            prices.insert(id.clone(), *price);
        }
        Ok(prices)
    }

    async fn details(&self, id: &ProductId) -> Result<ProductDetails, CatalogError> {
        let state = self.state.read().unwrap();
        if state.fail {
            return Err(CatalogError::Transport("catalog unavailable".to_string()));
        }
        state
            .products
            .get(id)
            .map(|(_, details)| details.clone())
            .ok_or_else(|| CatalogError::MissingProduct(id.clone()))
    }
}

/// HTTP catalog adapter.
#[derive(Clone)]
pub struct HttpCatalogService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCatalogService {
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
impl CatalogService for HttpCatalogService {
    async fn prices(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Money>, CatalogError> {
        let query: Vec<(&str, &str)> =
            ids.iter().map(|id| ("productIds", id.as_str())).collect();

        let response = self
            .client
            .get(format!("{}/v1/products/prices", self.base_url))
            .query(&query)
            .send()
            .await
            .map_err(|e| CatalogError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CatalogError::UnexpectedStatus(response.status().as_u16()));
        }

        let prices: HashMap<String, Money> = response
            .json()
            .await
            .map_err(|e| CatalogError::Transport(e.to_string()))?;
        let prices: HashMap<ProductId, Money> = prices
            .into_iter()
            .map(|(id, price)| (ProductId::new(id), price))
            .collect();

        // The catalog silently drops unknown IDs; a missing entry fails
        // the lookup here.
        for id in ids {
            if !prices.contains_key(id) {
                return Err(CatalogError::MissingProduct(id.clone()));
            }
        }
        Ok(prices)
    }

    async fn details(&self, id: &ProductId) -> Result<ProductDetails, CatalogError> {
        let response = self
            .client
            .get(format!("{}/v1/products/{}", self.base_url, id))
            .send()
            .await
            .map_err(|e| CatalogError::Transport(e.to_string()))?;

        match response.status().as_u16() {
            200 => response
                .json::<ProductDetails>()
                .await
                .map_err(|e| CatalogError::Transport(e.to_string())),
            404 => Err(CatalogError::MissingProduct(id.clone())),
            status => Err(CatalogError::UnexpectedStatus(status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn money(cents: i64) -> Money {
        Money::from_cents(cents)
    }

    #[tokio::test]
    async fn test_prices_for_known_products() {
        let catalog = InMemoryCatalogService::new();
        catalog.add_product("1", money(1000), "SKU-1", "Widget");
        catalog.add_product("2", money(2500), "SKU-2", "Gadget");

        let prices = catalog
            .prices(&[ProductId::new("1"), ProductId::new("2")])
            .await
            .unwrap();
        assert_eq!(prices[&ProductId::new("1")], money(1000));
        assert_eq!(prices[&ProductId::new("2")], money(2500));
    }

    #[tokio::test]
    async fn test_missing_product_fails_batch() {
        let catalog = InMemoryCatalogService::new();
        catalog.add_product("1", money(1000), "SKU-1", "Widget");

        let err = catalog
            .prices(&[ProductId::new("1"), ProductId::new("9")])
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::MissingProduct(_)));
    }

    #[tokio::test]
    async fn test_details_lookup() {
        let catalog = InMemoryCatalogService::new();
        catalog.add_product("1", money(1000), "SKU-1", "Widget");

        let details = catalog.details(&ProductId::new("1")).await.unwrap();
        assert_eq!(details.sku, "SKU-1");
        assert_eq!(details.name, "Widget");
    }

    #[tokio::test]
    async fn test_fail_flag_surfaces_transport_error() {
        let catalog = InMemoryCatalogService::new();
        catalog.add_product("1", money(1000), "SKU-1", "Widget");
        catalog.set_fail(true);

        let err = catalog.prices(&[ProductId::new("1")]).await.unwrap_err();
        assert!(matches!(err, CatalogError::Transport(_)));
    }
}
