use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use common::{GuestId, Money, OrderId, OrderStatus, Phone, ProductId};

use crate::{
    Order, PaymentLogEntry, PhoneVerification, Product, Result, StoreError, store::Store,
};

/// PostgreSQL-backed store implementation.
///
/// The full order record lives in a JSONB `data` column; the columns that
/// sweeps, lookups, and the status compare-and-swap filter on are
/// duplicated alongside it and written in the same statement.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
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

    fn row_to_order(row: PgRow) -> Result<Order> {
        let data: serde_json::Value = row.try_get("data")?;
        Ok(serde_json::from_value(data)?)
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        let id: String = row.try_get("id")?;
        let stock = u32::try_from(row.try_get::<i64, _>("stock")?)
            .map_err(|_| StoreError::Corrupt(format!("stock out of range for product {id}")))?;
        Ok(Product {
            id: ProductId::new(id),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            stock,
        })
    }

    fn row_to_log_entry(row: PgRow) -> Result<PaymentLogEntry> {
        let event: String = row.try_get("event")?;
        Ok(PaymentLogEntry {
            id: row.try_get("id")?,
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            provider: row.try_get("provider")?,
            event: serde_json::from_value(serde_json::Value::String(event))?,
            amount: Money::from_cents(row.try_get("amount_cents")?),
            currency: row.try_get("currency")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn write_order(
        &self,
        tx: &mut sqlx::PgConnection,
        order: &Order,
        expected: OrderStatus,
    ) -> Result<()> {
        // Two guards in the conditional write: the status compare-and-swap,
        // and a monotonicity check on cod_verified (it only ever moves
        // false -> true, so a write clearing it was read before delivery
        // verification landed).
        let data = serde_json::to_value(order)?;
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, payment_ref = $3, cod_verified = $4, data = $5
            WHERE id = $1 AND status = $6 AND (cod_verified = FALSE OR $4 = TRUE)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(&order.payment_ref)
        .bind(order.cod_verified)
        .bind(data)
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let current: Option<(String, bool)> = sqlx::query_as(
                "SELECT status, cod_verified FROM orders WHERE id = $1",
            )
            .bind(order.id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;
            return match current {
                None => Err(StoreError::OrderNotFound(order.id)),
                Some((status, _)) if status != expected.as_str() => {
                    Err(StoreError::StatusConflict {
                        order_id: order.id,
                        expected,
                        actual: serde_json::from_value(serde_json::Value::String(status))?,
                    })
                }
                Some(_) => Err(StoreError::StaleWrite { order_id: order.id }),
            };
        }
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn insert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, price_cents, stock)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                price_cents = EXCLUDED.price_cents,
                stock = EXCLUDED.stock
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(i64::from(product.stock))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT id, name, price_cents, stock FROM products WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_product).transpose()
    }

    async fn create_order(&self, order: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Conditional decrement per line item; zero rows means either an
        // unknown product or not enough stock. Dropping the transaction
        // rolls back every decrement already made.
        for item in &order.items {
            let result = sqlx::query(
                "UPDATE products SET stock = stock - $2 WHERE id = $1 AND stock >= $2",
            )
            .bind(item.product_id.as_str())
            .bind(i64::from(item.quantity))
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM products WHERE id = $1")
                    .bind(item.product_id.as_str())
                    .fetch_optional(&mut *tx)
                    .await?;
                return if exists.is_some() {
                    Err(StoreError::OutOfStock {
                        product_id: item.product_id.clone(),
                    })
                } else {
                    Err(StoreError::ProductNotFound(item.product_id.clone()))
                };
            }
        }

        let data = serde_json::to_value(order)?;
        sqlx::query(
            r#"
            INSERT INTO orders (id, guest_id, status, payment_method, payment_ref, cod_verified, created_at, data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.guest_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.payment_method.as_str())
        .bind(&order.payment_ref)
        .bind(order.cod_verified)
        .bind(order.created_at)
        .bind(data)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT data FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn find_order_by_payment_ref(&self, payment_ref: &str) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT data FROM orders WHERE payment_ref = $1")
            .bind(payment_ref)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn update_order(&self, order: &Order, expected: OrderStatus) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        self.write_order(&mut tx, order, expected).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_order_restocking(&self, order: &Order, expected: OrderStatus) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        self.write_order(&mut tx, order, expected).await?;

        for item in &order.items {
            sqlx::query("UPDATE products SET stock = stock + $2 WHERE id = $1")
                .bind(item.product_id.as_str())
                .bind(i64::from(item.quantity))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn orders_for_guest(&self, guest: GuestId) -> Result<Vec<Order>> {
        let rows =
            sqlx::query("SELECT data FROM orders WHERE guest_id = $1 ORDER BY created_at ASC")
                .bind(guest.as_uuid())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn pending_payment_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            "SELECT data FROM orders WHERE status = 'pending_payment' AND created_at < $1",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn unverified_cod_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT data FROM orders
            WHERE payment_method = 'cod'
              AND cod_verified = FALSE
              AND status = 'processing'
              AND created_at < $1
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn cod_orders_since(&self, guest: GuestId, since: DateTime<Utc>) -> Result<u32> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM orders
            WHERE guest_id = $1
              AND payment_method = 'cod'
              AND status <> 'cancelled'
              AND created_at >= $2
            "#,
        )
        .bind(guest.as_uuid())
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u32)
    }

    async fn has_unverified_cod_order(&self, guest: GuestId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM orders
                WHERE guest_id = $1
                  AND payment_method = 'cod'
                  AND cod_verified = FALSE
                  AND status NOT IN ('cancelled', 'refunded', 'delivered')
            )
            "#,
        )
        .bind(guest.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn append_payment_log(&self, entry: &PaymentLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_log (id, order_id, provider, event, amount_cents, currency, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id)
        .bind(entry.order_id.as_uuid())
        .bind(&entry.provider)
        .bind(entry.event.as_str())
        .bind(entry.amount.cents())
        .bind(&entry.currency)
        .bind(&entry.metadata)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn payment_log_for_order(&self, order_id: OrderId) -> Result<Vec<PaymentLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, provider, event, amount_cents, currency, metadata, created_at
            FROM payment_log
            WHERE order_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_log_entry).collect()
    }

    async fn upsert_phone_verification(&self, verification: &PhoneVerification) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO phone_verifications (phone, otp_hash, expires_at, verified)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (phone) DO UPDATE SET
                otp_hash = EXCLUDED.otp_hash,
                expires_at = EXCLUDED.expires_at,
                verified = EXCLUDED.verified
            "#,
        )
        .bind(verification.phone.as_str())
        .bind(&verification.otp_hash)
        .bind(verification.expires_at)
        .bind(verification.verified)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_phone_verification(&self, phone: &Phone) -> Result<Option<PhoneVerification>> {
        let row = sqlx::query(
            r#"
            SELECT phone, otp_hash, expires_at, verified
            FROM phone_verifications
            WHERE phone = $1 AND expires_at > NOW()
            "#,
        )
        .bind(phone.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let phone: String = row.try_get("phone")?;
                Ok(Some(PhoneVerification {
                    phone: serde_json::from_value(serde_json::Value::String(phone))?,
                    otp_hash: row.try_get("otp_hash")?,
                    expires_at: row.try_get("expires_at")?,
                    verified: row.try_get("verified")?,
                }))
            }
            None => Ok(None),
        }
    }
}
