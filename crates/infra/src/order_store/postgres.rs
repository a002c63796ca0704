//! Postgres-backed order document store.
//!
//! ## Layout
//!
//! - `orders`: one row per order; the full aggregate lives in the `document`
//!   JSONB column, next to the few columns queried directly (`buyer_id`,
//!   `created_at`, `version`).
//! - `order_lines`: one row per line item. Its primary key is the global
//!   uniqueness constraint on line ids.
//!
//! ## Error mapping
//!
//! | SQLx error | Code | OrderStoreError |
//! |---|---|---|
//! | unique violation on insert | `23505` | `DuplicateId` |
//! | other database error | any | `Backend` |
//! | pool closed / IO | n/a | `Backend` |

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::field::Empty;
use tracing::{Span, instrument};

use storefront_core::{AggregateRoot, ExpectedVersion, UserId};
use storefront_orders::{LineOrderId, Order, OrderId};

use super::r#trait::{OrderStore, OrderStoreError};

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        order_id     TEXT PRIMARY KEY,
        buyer_id     UUID        NOT NULL,
        order_status TEXT        NOT NULL,
        version      BIGINT      NOT NULL,
        created_at   TIMESTAMPTZ NOT NULL,
        document     JSONB       NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS orders_buyer_created_idx ON orders (buyer_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS orders_created_idx ON orders (created_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS order_lines (
        line_order_id TEXT PRIMARY KEY,
        order_id      TEXT NOT NULL REFERENCES orders (order_id)
    )
    "#,
];

#[derive(Debug, Clone)]
pub struct PostgresOrderStore {
    pool: Arc<PgPool>,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the `orders` and `order_lines` tables if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), OrderStoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    async fn fetch_documents(
        &self,
        operation: &str,
        query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Vec<Order>, OrderStoreError> {
        let rows = query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;

        rows.iter().map(decode_document).collect()
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    #[instrument(skip(self, order), fields(order_id = %order.order_id(), operation = Empty), err)]
    async fn insert(&self, order: &Order) -> Result<(), OrderStoreError> {
        Span::current().record("operation", "insert");

        let document = encode_document(order)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO orders (order_id, buyer_id, order_status, version, created_at, document)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(order.order_id().as_str())
        .bind(*order.buyer_id().as_uuid())
        .bind(order.order_status().to_string())
        .bind(to_i64(order.version())?)
        .bind(order.created_at())
        .bind(&document)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_insert_error(format!("order id {}", order.order_id()), e))?;

        for line in order.line_items() {
            sqlx::query("INSERT INTO order_lines (line_order_id, order_id) VALUES ($1, $2)")
                .bind(line.line_order_id().as_str())
                .bind(order.order_id().as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_insert_error(format!("line id {}", line.line_order_id()), e))?;
        }

        // Dropping `tx` on an error above rolls the whole insert back.
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(operation = Empty), err)]
    async fn load(&self, order_id: &OrderId) -> Result<Option<Order>, OrderStoreError> {
        Span::current().record("operation", "load");

        let row = sqlx::query("SELECT document FROM orders WHERE order_id = $1")
            .bind(order_id.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load", e))?;

        row.as_ref().map(decode_document).transpose()
    }

    #[instrument(skip(self), fields(operation = Empty), err)]
    async fn find_by_line(&self, line_order_id: &LineOrderId) -> Result<Option<Order>, OrderStoreError> {
        Span::current().record("operation", "find_by_line");

        let row = sqlx::query(
            r#"
            SELECT o.document
              FROM order_lines l
              JOIN orders o ON o.order_id = l.order_id
             WHERE l.line_order_id = $1
            "#,
        )
        .bind(line_order_id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_by_line", e))?;

        row.as_ref().map(decode_document).transpose()
    }

    #[instrument(
        skip(self, order),
        fields(order_id = %order.order_id(), version = order.version(), operation = Empty),
        err
    )]
    async fn update(&self, order: &Order, expected: ExpectedVersion) -> Result<(), OrderStoreError> {
        Span::current().record("operation", "update");

        let document = encode_document(order)?;
        let guard_version: Option<i64> = match expected {
            ExpectedVersion::Any => None,
            ExpectedVersion::Exact(v) => Some(to_i64(v)?),
            ExpectedVersion::NoDocument => {
                return Err(OrderStoreError::Concurrency(
                    "update cannot expect a missing document".to_string(),
                ));
            }
        };

        // Compare-and-swap on the version column.
        let result = sqlx::query(
            r#"
            UPDATE orders
               SET document = $2,
                   version = $3,
                   order_status = $4
             WHERE order_id = $1
               AND ($5::bigint IS NULL OR version = $5)
            "#,
        )
        .bind(order.order_id().as_str())
        .bind(&document)
        .bind(to_i64(order.version())?)
        .bind(order.order_status().to_string())
        .bind(guard_version)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update", e))?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let current: Option<i64> = sqlx::query("SELECT version FROM orders WHERE order_id = $1")
            .bind(order.order_id().as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update", e))?
            .map(|row| row.try_get("version"))
            .transpose()
            .map_err(|e| map_sqlx_error("update", e))?;

        match current {
            None => Err(OrderStoreError::NotFound(order.order_id().clone())),
            Some(found) => Err(OrderStoreError::Concurrency(format!(
                "expected {expected:?}, found {found}"
            ))),
        }
    }

    #[instrument(skip(self), fields(operation = Empty), err)]
    async fn list_all(&self) -> Result<Vec<Order>, OrderStoreError> {
        Span::current().record("operation", "list_all");

        self.fetch_documents(
            "list_all",
            sqlx::query("SELECT document FROM orders ORDER BY created_at DESC, order_id DESC"),
        )
        .await
    }

    #[instrument(skip(self), fields(operation = Empty), err)]
    async fn list_by_buyer(&self, buyer_id: UserId) -> Result<Vec<Order>, OrderStoreError> {
        Span::current().record("operation", "list_by_buyer");

        self.fetch_documents(
            "list_by_buyer",
            sqlx::query(
                r#"
                SELECT document FROM orders
                 WHERE buyer_id = $1
                 ORDER BY created_at DESC, order_id DESC
                "#,
            )
            .bind(*buyer_id.as_uuid()),
        )
        .await
    }
}

fn encode_document(order: &Order) -> Result<serde_json::Value, OrderStoreError> {
    serde_json::to_value(order).map_err(|e| OrderStoreError::Serialization(e.to_string()))
}

fn decode_document(row: &sqlx::postgres::PgRow) -> Result<Order, OrderStoreError> {
    let document: serde_json::Value = row
        .try_get("document")
        .map_err(|e| map_sqlx_error("decode_document", e))?;
    serde_json::from_value(document).map_err(|e| OrderStoreError::Serialization(e.to_string()))
}

fn to_i64(v: u64) -> Result<i64, OrderStoreError> {
    i64::try_from(v).map_err(|_| OrderStoreError::Backend(format!("version out of range: {v}")))
}

fn map_insert_error(what: String, err: sqlx::Error) -> OrderStoreError {
    if is_unique_violation(&err) {
        OrderStoreError::DuplicateId(what)
    } else {
        map_sqlx_error("insert", err)
    }
}

/// Map SQLx errors to OrderStoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> OrderStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            OrderStoreError::Backend(format!("database error in {operation}: {}", db_err.message()))
        }
        sqlx::Error::PoolClosed => {
            OrderStoreError::Backend(format!("connection pool closed in {operation}"))
        }
        _ => OrderStoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}
