//! PostgreSQL inventory store.
//!
//! Counter changes are guarded `UPDATE … WHERE` statements and status
//! changes are predicated on the current status, so concurrent reservers
//! contending for one row can never push `reserved` past `on_hand` even
//! when their snapshots are stale.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, ReservationId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::error::Result;
use crate::model::{InventoryRow, Movement, MovementKind, Reservation, ReservationStatus};
use crate::store::{InsertOutcome, InventoryStore};

/// PostgreSQL inventory store.
#[derive(Clone)]
pub struct PostgresInventoryStore {
    pool: PgPool,
}

impl PostgresInventoryStore {
    /// Creates a new PostgreSQL inventory store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_inventory(row: &PgRow) -> Result<InventoryRow> {
        Ok(InventoryRow {
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            warehouse: row.try_get("warehouse")?,
            on_hand: row.try_get("on_hand")?,
            reserved: row.try_get("reserved")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_reservation(row: &PgRow) -> Result<Reservation> {
        Ok(Reservation {
            id: ReservationId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            sku: row.try_get("sku")?,
            warehouse: row.try_get("warehouse")?,
            quantity: row.try_get::<i32, _>("quantity")? as u32,
            idempotency_key: row.try_get("idempotency_key")?,
            reserved_at: row.try_get("reserved_at")?,
            expires_at: row.try_get("expires_at")?,
            status: parse_reservation_status(&row.try_get::<String, _>("status")?)?,
        })
    }

    fn row_to_movement(row: &PgRow) -> Result<Movement> {
        Ok(Movement {
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            sku: row.try_get("sku")?,
            warehouse: row.try_get("warehouse")?,
            kind: parse_movement_kind(&row.try_get::<String, _>("kind")?)?,
            quantity: row.try_get::<i32, _>("quantity")? as u32,
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            note: row.try_get("note")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    async fn upsert_stock(
        &self,
        product_id: &ProductId,
        warehouse: &str,
        on_hand: i64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO inventory (product_id, warehouse, on_hand, reserved, updated_at) \
             VALUES ($1, $2, $3, 0, NOW()) \
             ON CONFLICT (product_id, warehouse) \
             DO UPDATE SET on_hand = EXCLUDED.on_hand, updated_at = NOW()",
        )
        .bind(product_id.as_str())
        .bind(warehouse)
        .bind(on_hand)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn rows_for_products(&self, products: &[ProductId]) -> Result<Vec<InventoryRow>> {
        let ids: Vec<String> = products.iter().map(|p| p.as_str().to_string()).collect();
        let rows = sqlx::query(
            "SELECT product_id, warehouse, on_hand, reserved, updated_at \
             FROM inventory WHERE product_id = ANY($1) \
             ORDER BY product_id, warehouse",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_inventory).collect()
    }

    async fn try_reserve(
        &self,
        product_id: &ProductId,
        warehouse: &str,
        quantity: u32,
    ) -> Result<bool> {
        // Zero affected rows means a concurrent reserver won the race or
        // the guard failed outright; the caller retries elsewhere.
        let result = sqlx::query(
            "UPDATE inventory SET reserved = reserved + $3, updated_at = NOW() \
             WHERE product_id = $1 AND warehouse = $2 AND on_hand - reserved >= $3",
        )
        .bind(product_id.as_str())
        .bind(warehouse)
        .bind(i64::from(quantity))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_reserved(
        &self,
        product_id: &ProductId,
        warehouse: &str,
        quantity: u32,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE inventory SET reserved = GREATEST(reserved - $3, 0), updated_at = NOW() \
             WHERE product_id = $1 AND warehouse = $2",
        )
        .bind(product_id.as_str())
        .bind(warehouse)
        .bind(i64::from(quantity))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume_stock(
        &self,
        product_id: &ProductId,
        warehouse: &str,
        quantity: u32,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE inventory SET on_hand = GREATEST(on_hand - $3, 0), \
             reserved = GREATEST(reserved - $3, 0), updated_at = NOW() \
             WHERE product_id = $1 AND warehouse = $2",
        )
        .bind(product_id.as_str())
        .bind(warehouse)
        .bind(i64::from(quantity))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_reservation(&self, reservation: &Reservation) -> Result<InsertOutcome> {
        let inserted = sqlx::query(
            "INSERT INTO reservations \
             (id, order_id, product_id, sku, warehouse, quantity, idempotency_key, \
              reserved_at, expires_at, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (idempotency_key, order_id, product_id) DO NOTHING",
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.order_id.as_uuid())
        .bind(reservation.product_id.as_str())
        .bind(&reservation.sku)
        .bind(&reservation.warehouse)
        .bind(reservation.quantity as i32)
        .bind(&reservation.idempotency_key)
        .bind(reservation.reserved_at)
        .bind(reservation.expires_at)
        .bind(reservation.status.as_str())
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 1 {
            return Ok(InsertOutcome::Inserted);
        }

        let row = sqlx::query(
            "SELECT id, order_id, product_id, sku, warehouse, quantity, idempotency_key, \
             reserved_at, expires_at, status FROM reservations \
             WHERE idempotency_key = $1 AND order_id = $2 AND product_id = $3",
        )
        .bind(&reservation.idempotency_key)
        .bind(reservation.order_id.as_uuid())
        .bind(reservation.product_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(InsertOutcome::Duplicate(Self::row_to_reservation(&row)?))
    }

    async fn reservations_for_key(
        &self,
        order_id: OrderId,
        key: &str,
    ) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(
            "SELECT id, order_id, product_id, sku, warehouse, quantity, idempotency_key, \
             reserved_at, expires_at, status FROM reservations \
             WHERE order_id = $1 AND idempotency_key = $2 ORDER BY product_id",
        )
        .bind(order_id.as_uuid())
        .bind(key)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_reservation).collect()
    }

    async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(
            "SELECT id, order_id, product_id, sku, warehouse, quantity, idempotency_key, \
             reserved_at, expires_at, status FROM reservations \
             WHERE order_id = $1 ORDER BY reserved_at",
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_reservation).collect()
    }

    async fn transition_reservation(
        &self,
        id: ReservationId,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE reservations SET status = $3 WHERE id = $1 AND status = $2",
        )
        .bind(id.as_uuid())
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn expired_active(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(
            "SELECT id, order_id, product_id, sku, warehouse, quantity, idempotency_key, \
             reserved_at, expires_at, status FROM reservations \
             WHERE status = 'ACTIVE' AND expires_at < $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_reservation).collect()
    }

    async fn append_movement(&self, movement: &Movement) -> Result<()> {
        sqlx::query(
            "INSERT INTO movements \
             (product_id, sku, warehouse, kind, quantity, order_id, note, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(movement.product_id.as_str())
        .bind(&movement.sku)
        .bind(&movement.warehouse)
        .bind(movement.kind.as_str())
        .bind(movement.quantity as i32)
        .bind(movement.order_id.as_uuid())
        .bind(&movement.note)
        .bind(movement.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn movements_for_product(&self, product_id: &ProductId) -> Result<Vec<Movement>> {
        let rows = sqlx::query(
            "SELECT product_id, sku, warehouse, kind, quantity, order_id, note, created_at \
             FROM movements WHERE product_id = $1 ORDER BY created_at DESC",
        )
        .bind(product_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_movement).collect()
    }
}

fn parse_reservation_status(s: &str) -> Result<ReservationStatus> {
    match s {
        "ACTIVE" => Ok(ReservationStatus::Active),
        "CONFIRMED" => Ok(ReservationStatus::Confirmed),
        "RELEASED" => Ok(ReservationStatus::Released),
        "EXPIRED" => Ok(ReservationStatus::Expired),
        other => Err(crate::error::InventoryError::Database(sqlx::Error::Decode(
            format!("unknown reservation status: {other}").into(),
        ))),
    }
}

fn parse_movement_kind(s: &str) -> Result<MovementKind> {
    match s {
        "RESERVE" => Ok(MovementKind::Reserve),
        "RELEASE" => Ok(MovementKind::Release),
        "SHIP" => Ok(MovementKind::Ship),
        other => Err(crate::error::InventoryError::Database(sqlx::Error::Decode(
            format!("unknown movement kind: {other}").into(),
        ))),
    }
}
