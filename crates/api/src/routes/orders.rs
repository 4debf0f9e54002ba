//! Order creation and read endpoints.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::{CustomerId, OrderId};
use domain::{OrderLine, PricedLine, TotalsBreakdown};
use inventory::InventoryStore;
use order_store::{IdempotencyStore, OrderStore};
use saga::coordinator::request_body_hash;
use saga::{CreateOrderCommand, CreateOrderOutcome, OrderReply};
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;
use crate::routes::de_flexible_id;

/// How many orders the list endpoint returns.
const RECENT_ORDERS_LIMIT: usize = 50;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderRequest {
    #[serde(deserialize_with = "de_flexible_id")]
    customer_id: String,
    items: Vec<CreateOrderItemRequest>,
    payment_method: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderItemRequest {
    #[serde(deserialize_with = "de_flexible_id")]
    product_id: String,
    #[serde(alias = "qty")]
    quantity: u32,
    sku: Option<String>,
}

/// POST /v1/orders — run the create-order saga.
///
/// The raw body is hashed before parsing so the idempotency record stores
/// a digest of exactly what the client sent.
#[tracing::instrument(skip_all)]
pub async fn create<S, K, V>(
    State(state): State<Arc<AppState<S, K, V>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError>
where
    S: OrderStore + Clone + 'static,
    K: IdempotencyStore + 'static,
    V: InventoryStore + 'static,
{
    let key = headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(ApiError::MissingIdempotencyKey)?
        .to_string();

    let body_hash = request_body_hash(&body);
    let request: CreateOrderRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid order payload: {e}")))?;

    let cmd = CreateOrderCommand {
        customer_id: CustomerId::new(request.customer_id),
        lines: request
            .items
            .into_iter()
            .map(|i| OrderLine {
                product_id: i.product_id.into(),
                quantity: i.quantity,
                sku: i.sku,
            })
            .collect(),
        payment_method: request.payment_method,
    };

    match state.coordinator.create_order(cmd, &key, &body_hash).await? {
        CreateOrderOutcome::Created(reply) => {
            let body = serde_json::to_value(&reply)
                .map_err(|e| ApiError::Internal(e.to_string()))?;
            Ok((StatusCode::CREATED, Json(body)))
        }
        CreateOrderOutcome::Replayed { status, body } => Ok((
            StatusCode::from_u16(status).unwrap_or(StatusCode::CREATED),
            Json(body),
        )),
    }
}

/// GET /v1/orders/{id} — load one order with items and totals.
#[tracing::instrument(skip(state))]
pub async fn get<S, K, V>(
    State(state): State<Arc<AppState<S, K, V>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderReply>, ApiError>
where
    S: OrderStore + Clone + 'static,
    K: IdempotencyStore + 'static,
    V: InventoryStore + 'static,
{
    let order_id = parse_order_id(&id)?;
    let (order, items) = state
        .orders
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("order {id} not found")))?;

    Ok(Json(to_reply(&state, &order, &items)))
}

/// GET /v1/orders — the most recent orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list<S, K, V>(
    State(state): State<Arc<AppState<S, K, V>>>,
) -> Result<Json<Vec<OrderReply>>, ApiError>
where
    S: OrderStore + Clone + 'static,
    K: IdempotencyStore + 'static,
    V: InventoryStore + 'static,
{
    let orders = state.orders.list_recent(RECENT_ORDERS_LIMIT).await?;
    let replies = orders
        .iter()
        .map(|(order, items)| to_reply(&state, order, items))
        .collect();
    Ok(Json(replies))
}

/// Totals on read endpoints are recomputed from the persisted snapshots;
/// the stored signature guarantees they match what was charged.
fn to_reply<S, K, V>(
    state: &AppState<S, K, V>,
    order: &domain::Order,
    items: &[domain::OrderItem],
) -> OrderReply
where
    S: OrderStore + Clone + 'static,
    K: IdempotencyStore + 'static,
    V: InventoryStore + 'static,
{
    let lines: Vec<PricedLine> = items
        .iter()
        .map(|i| PricedLine {
            product_id: i.product_id.clone(),
            quantity: i.quantity,
            unit_price: i.unit_price,
        })
        .collect();
    let totals = TotalsBreakdown::compute(&lines, state.coordinator.totals_config());
    OrderReply::from_parts(order, items, &totals)
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("invalid order id: {e}")))?;
    Ok(OrderId::from_uuid(uuid))
}
