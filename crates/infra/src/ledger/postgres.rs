//! Postgres-backed stock ledger.
//!
//! Reservation is a single conditional statement:
//!
//! ```sql
//! UPDATE product_stock
//!    SET quantity = quantity - $2, available = (quantity - $2) > 0
//!  WHERE product_id = $1 AND quantity >= $2
//! RETURNING quantity, unit_price
//! ```
//!
//! Postgres row locking serialises concurrent updates to the same row, so
//! two reservations can never both pass the `quantity >= $2` guard on the
//! same units. No row back means either the product is unknown or the guard
//! failed; a follow-up read tells the two apart for the error only.
//!
//! The decrement commits in one transaction with a `held` row in
//! `stock_reservations`. A release for a key with no row inserts a `voided`
//! row instead, and the primary key makes whichever of the two arrives
//! second see the first: a late reserve is refused, an early one is undone.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::field::Empty;
use tracing::{Span, instrument};

use storefront_core::{ProductId, ReservationId};
use storefront_inventory::{Reservation, StockEntry, StockError};

use super::r#trait::{LedgerError, Release, StockLedger};

const SCHEMA: [&str; 2] = [
    r#"
CREATE TABLE IF NOT EXISTS product_stock (
    product_id UUID PRIMARY KEY,
    quantity   BIGINT  NOT NULL CHECK (quantity >= 0),
    available  BOOLEAN NOT NULL,
    unit_price BIGINT  NOT NULL CHECK (unit_price >= 0)
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS stock_reservations (
    reservation_id UUID PRIMARY KEY,
    product_id     UUID   NOT NULL,
    quantity       BIGINT NOT NULL,
    state          TEXT   NOT NULL CHECK (state IN ('held', 'released', 'voided')),
    settled_at     TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#,
];

#[derive(Debug, Clone)]
pub struct PostgresStockLedger {
    pool: Arc<PgPool>,
}

impl PostgresStockLedger {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the `product_stock` and `stock_reservations` tables if they do
    /// not exist.
    pub async fn ensure_schema(&self) -> Result<(), LedgerError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    /// Insert or replace a product's stock record (catalog sync / seeding).
    #[instrument(skip(self, entry), fields(product_id = %entry.product_id(), operation = Empty), err)]
    pub async fn put(&self, entry: &StockEntry) -> Result<(), LedgerError> {
        Span::current().record("operation", "put");

        sqlx::query(
            r#"
            INSERT INTO product_stock (product_id, quantity, available, unit_price)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (product_id) DO UPDATE
               SET quantity = EXCLUDED.quantity,
                   available = EXCLUDED.available,
                   unit_price = EXCLUDED.unit_price
            "#,
        )
        .bind(*entry.product_id().as_uuid())
        .bind(i64::from(entry.quantity()))
        .bind(entry.available())
        .bind(to_i64(entry.unit_price())?)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("put", e))?;

        Ok(())
    }

    async fn current_quantity(&self, product_id: ProductId) -> Result<Option<u32>, LedgerError> {
        let row = sqlx::query("SELECT quantity FROM product_stock WHERE product_id = $1")
            .bind(*product_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("current_quantity", e))?;

        row.map(|r| {
            r.try_get::<i64, _>("quantity")
                .map_err(|e| map_sqlx_error("current_quantity", e))
                .and_then(to_u32)
        })
        .transpose()
    }
}

#[async_trait]
impl StockLedger for PostgresStockLedger {
    #[instrument(skip(self), fields(operation = Empty), err)]
    async fn product(&self, product_id: ProductId) -> Result<StockEntry, LedgerError> {
        Span::current().record("operation", "product");

        let row = sqlx::query(
            "SELECT quantity, unit_price FROM product_stock WHERE product_id = $1",
        )
        .bind(*product_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("product", e))?
        .ok_or(LedgerError::NotFound(product_id))?;

        let quantity: i64 = row
            .try_get("quantity")
            .map_err(|e| map_sqlx_error("product", e))?;
        let unit_price: i64 = row
            .try_get("unit_price")
            .map_err(|e| map_sqlx_error("product", e))?;

        Ok(StockEntry::from_parts(
            product_id,
            to_u32(quantity)?,
            to_u64(unit_price)?,
        ))
    }

    #[instrument(skip(self), fields(operation = Empty), err)]
    async fn reserve(
        &self,
        key: ReservationId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Reservation, LedgerError> {
        Span::current().record("operation", "reserve");

        if quantity == 0 {
            return Err(StockError::InvalidQuantity(
                "reservation quantity must be positive".to_string(),
            )
            .into());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let claimed = sqlx::query(
            r#"
            INSERT INTO stock_reservations (reservation_id, product_id, quantity, state)
            VALUES ($1, $2, $3, 'held')
            ON CONFLICT (reservation_id) DO NOTHING
            "#,
        )
        .bind(*key.as_uuid())
        .bind(*product_id.as_uuid())
        .bind(i64::from(quantity))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("reserve", e))?;

        if claimed.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(LedgerError::ReservationClosed(key));
        }

        let row = sqlx::query(
            r#"
            UPDATE product_stock
               SET quantity = quantity - $2,
                   available = (quantity - $2) > 0
             WHERE product_id = $1 AND quantity >= $2
            RETURNING quantity, unit_price
            "#,
        )
        .bind(*product_id.as_uuid())
        .bind(i64::from(quantity))
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("reserve", e))?;

        let Some(row) = row else {
            // Drops the `held` row with the failed decrement.
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return match self.current_quantity(product_id).await? {
                None => Err(LedgerError::NotFound(product_id)),
                Some(available) => Err(StockError::OutOfStock {
                    product_id,
                    requested: quantity,
                    available,
                }
                .into()),
            };
        };

        let remaining: i64 = row
            .try_get("quantity")
            .map_err(|e| map_sqlx_error("reserve", e))?;
        let unit_price: i64 = row
            .try_get("unit_price")
            .map_err(|e| map_sqlx_error("reserve", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(Reservation {
            product_id,
            quantity,
            unit_price: to_u64(unit_price)?,
            remaining: to_u32(remaining)?,
        })
    }

    #[instrument(skip(self), fields(operation = Empty), err)]
    async fn release(
        &self,
        key: ReservationId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Release, LedgerError> {
        Span::current().record("operation", "release");

        if quantity == 0 {
            return Err(StockError::InvalidQuantity(
                "release quantity must be positive".to_string(),
            )
            .into());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Waits on an in-flight reserve holding the same key.
        let voided = sqlx::query(
            r#"
            INSERT INTO stock_reservations (reservation_id, product_id, quantity, state)
            VALUES ($1, $2, $3, 'voided')
            ON CONFLICT (reservation_id) DO NOTHING
            "#,
        )
        .bind(*key.as_uuid())
        .bind(*product_id.as_uuid())
        .bind(i64::from(quantity))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("release", e))?;

        let outcome = if voided.rows_affected() == 1 {
            Release::Voided
        } else {
            let held = sqlx::query(
                r#"
                UPDATE stock_reservations
                   SET state = 'released', settled_at = now()
                 WHERE reservation_id = $1 AND state = 'held'
                RETURNING product_id, quantity
                "#,
            )
            .bind(*key.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("release", e))?;

            match held {
                None => Release::Unchanged,
                Some(row) => {
                    let held_product: uuid::Uuid = row
                        .try_get("product_id")
                        .map_err(|e| map_sqlx_error("release", e))?;
                    let held_quantity: i64 = row
                        .try_get("quantity")
                        .map_err(|e| map_sqlx_error("release", e))?;

                    let restored = sqlx::query(
                        r#"
                        UPDATE product_stock
                           SET quantity = quantity + $2,
                               available = TRUE
                         WHERE product_id = $1
                        "#,
                    )
                    .bind(held_product)
                    .bind(held_quantity)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("release", e))?;

                    if restored.rows_affected() == 0 {
                        return Err(LedgerError::NotFound(ProductId::from_uuid(held_product)));
                    }
                    Release::Restored
                }
            }
        };

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(outcome)
    }
}

fn to_u32(v: i64) -> Result<u32, LedgerError> {
    u32::try_from(v).map_err(|_| LedgerError::Backend(format!("stock quantity out of range: {v}")))
}

fn to_u64(v: i64) -> Result<u64, LedgerError> {
    u64::try_from(v).map_err(|_| LedgerError::Backend(format!("unit price out of range: {v}")))
}

fn to_i64(v: u64) -> Result<i64, LedgerError> {
    i64::try_from(v).map_err(|_| LedgerError::Backend(format!("unit price out of range: {v}")))
}

/// Map SQLx errors to LedgerError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerError {
    match err {
        sqlx::Error::Database(db_err) => {
            // 23514: check constraint (quantity >= 0) tripped by a racing writer.
            if db_err.code().as_deref() == Some("23514") {
                LedgerError::Backend(format!(
                    "stock constraint violated in {operation}: {}",
                    db_err.message()
                ))
            } else {
                LedgerError::Backend(format!("database error in {operation}: {}", db_err.message()))
            }
        }
        sqlx::Error::PoolClosed => {
            LedgerError::Backend(format!("connection pool closed in {operation}"))
        }
        _ => LedgerError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}
