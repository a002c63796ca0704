//! Read side: order lookups, listings and stock inspection.
//!
//! All of these are idempotent, so every store call goes through the bounded
//! read retry.

use tracing::instrument;

use storefront_core::{ProductId, UserId};
use storefront_inventory::StockEntry;
use storefront_orders::{Order, OrderId};

use crate::config::CoreConfig;
use crate::error::OrderError;
use crate::ledger::StockLedger;
use crate::order_store::OrderStore;
use crate::retry::{RetryPolicy, read_with_retry};

pub struct OrderQueries<S, L> {
    store: S,
    ledger: L,
    policy: RetryPolicy,
}

impl<S, L> OrderQueries<S, L>
where
    S: OrderStore,
    L: StockLedger,
{
    pub fn new(store: S, ledger: L, config: &CoreConfig) -> Self {
        Self {
            store,
            ledger,
            policy: RetryPolicy::from(config),
        }
    }

    #[instrument(skip(self), err)]
    pub async fn get_order(&self, order_id: &OrderId) -> Result<Order, OrderError> {
        read_with_retry("load_order", self.policy, || self.store.load(order_id))
            .await?
            .ok_or_else(|| OrderError::OrderNotFound(order_id.to_string()))
    }

    /// Every order, newest first.
    pub async fn list_orders(&self) -> Result<Vec<Order>, OrderError> {
        read_with_retry("list_orders", self.policy, || self.store.list_all()).await
    }

    /// A buyer's orders, newest first. A buyer with no orders is reported as
    /// `BuyerNotFound` rather than an empty list.
    #[instrument(skip(self), err)]
    pub async fn list_orders_by_buyer(&self, buyer_id: UserId) -> Result<Vec<Order>, OrderError> {
        let orders =
            read_with_retry("list_by_buyer", self.policy, || self.store.list_by_buyer(buyer_id))
                .await?;

        if orders.is_empty() {
            return Err(OrderError::BuyerNotFound(buyer_id));
        }
        Ok(orders)
    }

    pub async fn stock(&self, product_id: ProductId) -> Result<StockEntry, OrderError> {
        read_with_retry("product_stock", self.policy, || self.ledger.product(product_id)).await
    }
}
