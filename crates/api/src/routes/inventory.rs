//! Inventory engine endpoints: reserve, confirm, release, ship, reaper,
//! and read-only stock/ledger views.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, ReservationId};
use inventory::{
    AllocationStrategy, InventoryStore, ReserveItem, ReserveOutcome, ReservedLine, ShipItem,
    UnavailableLine,
};
use order_store::{IdempotencyStore, OrderStore};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;
use crate::routes::de_flexible_id;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveRequest {
    #[serde(deserialize_with = "de_flexible_id")]
    order_id: String,
    items: Vec<ReserveItemRequest>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReserveItemRequest {
    #[serde(deserialize_with = "de_flexible_id")]
    product_id: String,
    #[serde(alias = "quantity")]
    qty: u32,
    sku: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveResponse {
    status: &'static str,
    order_id: OrderId,
    items: Vec<ReservedLineReply>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    unavailable: Vec<UnavailableLineReply>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    idempotent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    allocation_strategy: Option<AllocationStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    action_required: Option<&'static str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReservedLineReply {
    reservation_id: ReservationId,
    product_id: ProductId,
    sku: String,
    warehouse: String,
    qty_reserved: u32,
}

impl From<ReservedLine> for ReservedLineReply {
    fn from(line: ReservedLine) -> Self {
        Self {
            reservation_id: line.reservation_id,
            product_id: line.product_id,
            sku: line.sku,
            warehouse: line.warehouse,
            qty_reserved: line.quantity,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UnavailableLineReply {
    product_id: ProductId,
    #[serde(skip_serializing_if = "Option::is_none")]
    sku: Option<String>,
    qty_requested: u32,
    qty_available: i64,
}

impl From<UnavailableLine> for UnavailableLineReply {
    fn from(line: UnavailableLine) -> Self {
        Self {
            product_id: line.product_id,
            sku: line.sku,
            qty_requested: line.qty_requested,
            qty_available: line.qty_available,
        }
    }
}

/// POST /v1/inventory/reserve — allocate stock under an idempotency key.
#[tracing::instrument(skip_all)]
pub async fn reserve<S, K, V>(
    State(state): State<Arc<AppState<S, K, V>>>,
    headers: HeaderMap,
    Json(request): Json<ReserveRequest>,
) -> Result<Json<ReserveResponse>, ApiError>
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

    let order_id = parse_order_id(&request.order_id)?;
    let items: Vec<ReserveItem> = request
        .items
        .into_iter()
        .map(|i| ReserveItem {
            product_id: i.product_id.into(),
            quantity: i.qty,
            sku: i.sku,
        })
        .collect();

    let outcome = state.engine.reserve(order_id, &items, &key).await?;

    let response = match outcome {
        ReserveOutcome::Reserved {
            lines,
            expires_at,
            idempotent,
            strategy,
        } => ReserveResponse {
            status: "RESERVED",
            order_id,
            items: lines.into_iter().map(Into::into).collect(),
            unavailable: Vec::new(),
            expires_at: Some(expires_at),
            idempotent,
            allocation_strategy: Some(strategy),
            action_required: None,
        },
        ReserveOutcome::Partial {
            reserved,
            unavailable,
            expires_at,
            action_required,
        } => ReserveResponse {
            status: "PARTIAL",
            order_id,
            items: reserved.into_iter().map(Into::into).collect(),
            unavailable: unavailable.into_iter().map(Into::into).collect(),
            expires_at,
            idempotent: false,
            allocation_strategy: None,
            action_required: Some(action_required),
        },
    };

    Ok(Json(response))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    #[serde(deserialize_with = "de_flexible_id")]
    order_id: String,
    reservation_ids: Option<Vec<ReservationId>>,
}

/// POST /v1/inventory/reserve/confirm — ACTIVE → CONFIRMED.
#[tracing::instrument(skip_all)]
pub async fn confirm<S, K, V>(
    State(state): State<Arc<AppState<S, K, V>>>,
    Json(request): Json<ConfirmRequest>,
) -> Result<Json<serde_json::Value>, ApiError>
where
    S: OrderStore + Clone + 'static,
    K: IdempotencyStore + 'static,
    V: InventoryStore + 'static,
{
    let order_id = parse_order_id(&request.order_id)?;
    let confirmed = state
        .engine
        .confirm(order_id, request.reservation_ids.as_deref())
        .await?;

    Ok(Json(serde_json::json!({
        "status": "CONFIRMED",
        "orderId": order_id,
        "confirmed": confirmed,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseRequest {
    #[serde(deserialize_with = "de_flexible_id")]
    order_id: String,
}

/// POST /v1/inventory/release — release all active holds for an order.
#[tracing::instrument(skip_all)]
pub async fn release<S, K, V>(
    State(state): State<Arc<AppState<S, K, V>>>,
    Json(request): Json<ReleaseRequest>,
) -> Result<Json<serde_json::Value>, ApiError>
where
    S: OrderStore + Clone + 'static,
    K: IdempotencyStore + 'static,
    V: InventoryStore + 'static,
{
    let order_id = parse_order_id(&request.order_id)?;
    let released = state.engine.release(order_id).await?;

    Ok(Json(serde_json::json!({
        "status": "RELEASED",
        "orderId": order_id,
        "released": released,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipRequest {
    #[serde(deserialize_with = "de_flexible_id")]
    order_id: String,
    items: Vec<ShipItemRequest>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShipItemRequest {
    #[serde(deserialize_with = "de_flexible_id")]
    product_id: String,
    #[serde(alias = "quantity")]
    qty: u32,
    warehouse: String,
    sku: Option<String>,
}

/// POST /v1/inventory/ship — consume reserved stock.
#[tracing::instrument(skip_all)]
pub async fn ship<S, K, V>(
    State(state): State<Arc<AppState<S, K, V>>>,
    Json(request): Json<ShipRequest>,
) -> Result<Json<serde_json::Value>, ApiError>
where
    S: OrderStore + Clone + 'static,
    K: IdempotencyStore + 'static,
    V: InventoryStore + 'static,
{
    let order_id = parse_order_id(&request.order_id)?;
    let items: Vec<ShipItem> = request
        .items
        .into_iter()
        .map(|i| ShipItem {
            product_id: i.product_id.into(),
            quantity: i.qty,
            warehouse: i.warehouse,
            sku: i.sku,
        })
        .collect();

    state.engine.ship(order_id, &items).await?;

    Ok(Json(serde_json::json!({
        "status": "SHIPPED",
        "orderId": order_id,
    })))
}

/// POST /v1/inventory/reaper/expired — expire overdue reservations.
#[tracing::instrument(skip_all)]
pub async fn reap_expired<S, K, V>(
    State(state): State<Arc<AppState<S, K, V>>>,
) -> Result<Json<serde_json::Value>, ApiError>
where
    S: OrderStore + Clone + 'static,
    K: IdempotencyStore + 'static,
    V: InventoryStore + 'static,
{
    let outcome = state.engine.expire_due(Utc::now()).await?;
    let released: Vec<ReservedLineReply> =
        outcome.released.into_iter().map(Into::into).collect();

    Ok(Json(serde_json::json!({
        "status": "PROCESSED",
        "expiredCount": outcome.expired_count,
        "releasedReservations": released,
    })))
}

/// GET /v1/inventory/{productId} — per-warehouse stock rows.
#[tracing::instrument(skip(state))]
pub async fn stock<S, K, V>(
    State(state): State<Arc<AppState<S, K, V>>>,
    Path(product_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError>
where
    S: OrderStore + Clone + 'static,
    K: IdempotencyStore + 'static,
    V: InventoryStore + 'static,
{
    let product_id = ProductId::new(product_id);
    let rows = state.engine.stock_levels(&product_id).await?;
    if rows.is_empty() {
        return Err(ApiError::NotFound(format!(
            "no inventory for product {product_id}"
        )));
    }

    let warehouses: Vec<serde_json::Value> = rows
        .iter()
        .map(|r| {
            serde_json::json!({
                "warehouse": r.warehouse,
                "onHand": r.on_hand,
                "reserved": r.reserved,
                "available": r.available(),
                "updatedAt": r.updated_at,
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "productId": product_id,
        "warehouses": warehouses,
    })))
}

/// GET /v1/inventory/{productId}/movements — the ledger, newest first.
#[tracing::instrument(skip(state))]
pub async fn movements<S, K, V>(
    State(state): State<Arc<AppState<S, K, V>>>,
    Path(product_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError>
where
    S: OrderStore + Clone + 'static,
    K: IdempotencyStore + 'static,
    V: InventoryStore + 'static,
{
    let product_id = ProductId::new(product_id);
    let movements: Vec<serde_json::Value> = state
        .engine
        .movements(&product_id)
        .await?
        .iter()
        .map(|m| {
            serde_json::json!({
                "productId": m.product_id,
                "sku": m.sku,
                "warehouse": m.warehouse,
                "type": m.kind,
                "quantity": m.quantity,
                "orderId": m.order_id,
                "note": m.note,
                "createdAt": m.created_at,
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "productId": product_id,
        "movements": movements,
    })))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("invalid order id: {e}")))?;
    Ok(OrderId::from_uuid(uuid))
}
