//! Postgres-backed user directory.
//!
//! Reads the `buyers` table; saved addresses are a JSONB array of shipping
//! snapshots.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::field::Empty;
use tracing::{Span, instrument};

use storefront_core::UserId;
use storefront_orders::ShippingSnapshot;

use super::r#trait::{BuyerProfile, DirectoryError, UserDirectory};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS buyers (
    user_id            UUID PRIMARY KEY,
    shipping_addresses JSONB NOT NULL DEFAULT '[]'::jsonb
)
"#;

#[derive(Debug, Clone)]
pub struct PostgresUserDirectory {
    pool: Arc<PgPool>,
}

impl PostgresUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn ensure_schema(&self) -> Result<(), DirectoryError> {
        sqlx::query(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    /// Insert or replace a buyer record (user-service sync / seeding).
    #[instrument(skip(self, profile), fields(user_id = %profile.user_id, operation = Empty), err)]
    pub async fn put(&self, profile: &BuyerProfile) -> Result<(), DirectoryError> {
        Span::current().record("operation", "put");

        let addresses = serde_json::to_value(&profile.shipping_addresses)
            .map_err(|e| DirectoryError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO buyers (user_id, shipping_addresses)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET shipping_addresses = EXCLUDED.shipping_addresses
            "#,
        )
        .bind(*profile.user_id.as_uuid())
        .bind(addresses)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("put", e))?;

        Ok(())
    }
}

#[async_trait]
impl UserDirectory for PostgresUserDirectory {
    #[instrument(skip(self), fields(operation = Empty), err)]
    async fn find_buyer(&self, user_id: UserId) -> Result<Option<BuyerProfile>, DirectoryError> {
        Span::current().record("operation", "find_buyer");

        let row = sqlx::query("SELECT shipping_addresses FROM buyers WHERE user_id = $1")
            .bind(*user_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_buyer", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw: serde_json::Value = row
            .try_get("shipping_addresses")
            .map_err(|e| map_sqlx_error("find_buyer", e))?;
        let shipping_addresses: Vec<ShippingSnapshot> = serde_json::from_value(raw)
            .map_err(|e| DirectoryError::Serialization(e.to_string()))?;

        Ok(Some(BuyerProfile {
            user_id,
            shipping_addresses,
        }))
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> DirectoryError {
    match err {
        sqlx::Error::Database(db_err) => {
            DirectoryError::Backend(format!("database error in {operation}: {}", db_err.message()))
        }
        _ => DirectoryError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}
