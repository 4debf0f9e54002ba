//! PostgreSQL-backed store implementations.

use async_trait::async_trait;
use common::{CustomerId, Money, OrderId, PaymentRef, ProductId};
use domain::{LineStatus, Order, OrderItem, OrderStatus, PaymentStatus};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::store::{
    AcquireOutcome, IdempotencyRecord, IdempotencyStore, OrderStore, RecordState,
};

/// PostgreSQL order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_order(row: &PgRow) -> Result<Order> {
        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            customer_id: CustomerId::new(row.try_get::<String, _>("customer_id")?),
            status: parse_order_status(&row.try_get::<String, _>("status")?)?,
            payment_status: parse_payment_status(&row.try_get::<String, _>("payment_status")?)?,
            total: Money::new(row.try_get::<Decimal, _>("total")?),
            totals_signature: row.try_get("totals_signature")?,
            payment_ref: row
                .try_get::<Option<String>, _>("payment_ref")?
                .map(PaymentRef::new),
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_item(row: &PgRow) -> Result<OrderItem> {
        Ok(OrderItem {
            id: row.try_get("id")?,
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            sku: row.try_get("sku")?,
            product_name: row.try_get("product_name")?,
            quantity: row.try_get::<i32, _>("quantity")? as u32,
            unit_price: Money::new(row.try_get::<Decimal, _>("unit_price")?),
            tax_rate: row.try_get("tax_rate")?,
            status: parse_line_status(&row.try_get::<String, _>("status")?)?,
        })
    }

    async fn items_for_order(&self, id: OrderId) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query(
            "SELECT id, order_id, product_id, sku, product_name, quantity, unit_price, \
             tax_rate, status FROM order_items WHERE order_id = $1 ORDER BY position",
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_item).collect()
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn insert_order(&self, order: &Order, items: &[OrderItem]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO orders \
             (id, customer_id, status, payment_status, total, totals_signature, payment_ref, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(order.id.as_uuid())
        .bind(order.customer_id.as_str())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.total.amount())
        .bind(&order.totals_signature)
        .bind(order.payment_ref.as_ref().map(|r| r.as_str()))
        .bind(order.created_at)
        .execute(&mut *tx)
        .await?;

        for (position, item) in items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_items \
                 (id, order_id, product_id, sku, product_name, quantity, unit_price, tax_rate, status, position) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(item.id)
            .bind(item.order_id.as_uuid())
            .bind(item.product_id.as_str())
            .bind(&item.sku)
            .bind(&item.product_name)
            .bind(item.quantity as i32)
            .bind(item.unit_price.amount())
            .bind(item.tax_rate)
            .bind(item.status.as_str())
            .bind(position as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<(Order, Vec<OrderItem>)>> {
        let row = sqlx::query(
            "SELECT id, customer_id, status, payment_status, total, totals_signature, \
             payment_ref, created_at FROM orders WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let order = Self::row_to_order(&row)?;
                let items = self.items_for_order(id).await?;
                Ok(Some((order, items)))
            }
            None => Ok(None),
        }
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<(Order, Vec<OrderItem>)>> {
        let rows = sqlx::query(
            "SELECT id, customer_id, status, payment_status, total, totals_signature, \
             payment_ref, created_at FROM orders ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut result = Vec::with_capacity(rows.len());
        for row in &rows {
            let order = Self::row_to_order(row)?;
            let items = self.items_for_order(order.id).await?;
            result.push((order, items));
        }
        Ok(result)
    }

    async fn record_payment(
        &self,
        id: OrderId,
        status: PaymentStatus,
        reference: Option<PaymentRef>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE orders SET payment_status = $2, payment_ref = $3 WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(status.as_str())
        .bind(reference.as_ref().map(|r| r.as_str()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound(id));
        }
        Ok(())
    }

    async fn cancel_order(&self, id: OrderId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE orders SET status = $2, payment_status = $3 WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(OrderStatus::Cancelled.as_str())
        .bind(PaymentStatus::Failed.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound(id));
        }

        sqlx::query("UPDATE order_items SET status = $2 WHERE order_id = $1")
            .bind(id.as_uuid())
            .bind(LineStatus::Cancelled.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

/// PostgreSQL idempotency store.
#[derive(Clone)]
pub struct PostgresIdempotencyStore {
    pool: PgPool,
}

impl PostgresIdempotencyStore {
    /// Creates a new PostgreSQL idempotency store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &PgRow) -> Result<IdempotencyRecord> {
        Ok(IdempotencyRecord {
            key: row.try_get("key")?,
            resource_path: row.try_get("resource_path")?,
            body_hash: row.try_get("body_hash")?,
            response_status: row
                .try_get::<Option<i32>, _>("response_status")?
                .map(|s| s as u16),
            response_body: row.try_get("response_body")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl IdempotencyStore for PostgresIdempotencyStore {
    async fn acquire(
        &self,
        key: &str,
        resource_path: &str,
        body_hash: &str,
    ) -> Result<AcquireOutcome> {
        // The primary key on `key` arbitrates concurrent acquires: the loser
        // of the insert race falls through to reading the committed record.
        let inserted = sqlx::query(
            "INSERT INTO idempotency_records (key, resource_path, body_hash, created_at) \
             VALUES ($1, $2, $3, NOW()) ON CONFLICT (key) DO NOTHING",
        )
        .bind(key)
        .bind(resource_path)
        .bind(body_hash)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 1 {
            return Ok(AcquireOutcome::Created);
        }

        let row = sqlx::query(
            "SELECT key, resource_path, body_hash, response_status, response_body, created_at \
             FROM idempotency_records WHERE key = $1",
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await?;
        let record = Self::row_to_record(&row)?;

        Ok(match (record.response_status, record.response_body) {
            (Some(status), Some(body)) if (200..300).contains(&status) => {
                AcquireOutcome::Replay { status, body }
            }
            (Some(_), _) => AcquireOutcome::Conflict {
                state: RecordState::Failed,
            },
            (None, _) => AcquireOutcome::Conflict {
                state: RecordState::Pending,
            },
        })
    }

    async fn finalize(&self, key: &str, status: u16, body: &serde_json::Value) -> Result<()> {
        // Guarded update: only a pending record can be finalized, so the
        // record is immutable once a response status has been written.
        let result = sqlx::query(
            "UPDATE idempotency_records SET response_status = $2, response_body = $3 \
             WHERE key = $1 AND response_status IS NULL",
        )
        .bind(key)
        .bind(i32::from(status))
        .bind(body)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let exists: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM idempotency_records WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        match exists {
            Some(_) => Err(StoreError::AlreadyFinalized(key.to_string())),
            None => Err(StoreError::RecordNotFound(key.to_string())),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        let row = sqlx::query(
            "SELECT key, resource_path, body_hash, response_status, response_body, created_at \
             FROM idempotency_records WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }
}

fn parse_order_status(s: &str) -> Result<OrderStatus> {
    match s {
        "PENDING" => Ok(OrderStatus::Pending),
        "DELIVERED" => Ok(OrderStatus::Delivered),
        "CANCELLED" => Ok(OrderStatus::Cancelled),
        other => Err(StoreError::Database(sqlx::Error::Decode(
            format!("unknown order status: {other}").into(),
        ))),
    }
}

fn parse_payment_status(s: &str) -> Result<PaymentStatus> {
    match s {
        "PENDING" => Ok(PaymentStatus::Pending),
        "SUCCESS" => Ok(PaymentStatus::Success),
        "FAILED" => Ok(PaymentStatus::Failed),
        other => Err(StoreError::Database(sqlx::Error::Decode(
            format!("unknown payment status: {other}").into(),
        ))),
    }
}

fn parse_line_status(s: &str) -> Result<LineStatus> {
    match s {
        "PENDING" => Ok(LineStatus::Pending),
        "SHIPPED" => Ok(LineStatus::Shipped),
        "CANCELLED" => Ok(LineStatus::Cancelled),
        other => Err(StoreError::Database(sqlx::Error::Decode(
            format!("unknown line status: {other}").into(),
        ))),
    }
}
