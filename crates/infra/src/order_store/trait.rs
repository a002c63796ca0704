use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use storefront_core::{ExpectedVersion, UserId};
use storefront_orders::{LineOrderId, Order, OrderId};

/// Order store operation error.
///
/// These are infrastructure errors as opposed to order rule violations.
#[derive(Debug, Error)]
pub enum OrderStoreError {
    /// The order id or one of the line ids is already taken. Nothing was
    /// written.
    #[error("duplicate id: {0}")]
    DuplicateId(String),

    /// Optimistic concurrency check failed (version mismatch).
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("order {0} not found")]
    NotFound(OrderId),

    #[error("order store backend error: {0}")]
    Backend(String),

    #[error("order document could not be encoded or decoded: {0}")]
    Serialization(String),
}

/// Document store for placed orders.
///
/// ## Write semantics
///
/// - `insert` writes the whole aggregate (order + every line) or nothing. It
///   fails with `DuplicateId` when the order id or any line id already
///   exists anywhere in the store.
/// - `update` replaces the document only if the stored version matches
///   `expected`; otherwise `Concurrency`, and the stored document is left
///   alone. Concurrent writers can never silently overwrite each other.
///
/// ## Reads
///
/// Listings are newest first (by `created_at`, then order id).
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<(), OrderStoreError>;

    async fn load(&self, order_id: &OrderId) -> Result<Option<Order>, OrderStoreError>;

    /// The order owning the line with this id.
    async fn find_by_line(&self, line_order_id: &LineOrderId) -> Result<Option<Order>, OrderStoreError>;

    async fn update(&self, order: &Order, expected: ExpectedVersion) -> Result<(), OrderStoreError>;

    async fn list_all(&self) -> Result<Vec<Order>, OrderStoreError>;

    async fn list_by_buyer(&self, buyer_id: UserId) -> Result<Vec<Order>, OrderStoreError>;
}

#[async_trait]
impl<S> OrderStore for Arc<S>
where
    S: OrderStore + ?Sized,
{
    async fn insert(&self, order: &Order) -> Result<(), OrderStoreError> {
        (**self).insert(order).await
    }

    async fn load(&self, order_id: &OrderId) -> Result<Option<Order>, OrderStoreError> {
        (**self).load(order_id).await
    }

    async fn find_by_line(&self, line_order_id: &LineOrderId) -> Result<Option<Order>, OrderStoreError> {
        (**self).find_by_line(line_order_id).await
    }

    async fn update(&self, order: &Order, expected: ExpectedVersion) -> Result<(), OrderStoreError> {
        (**self).update(order, expected).await
    }

    async fn list_all(&self) -> Result<Vec<Order>, OrderStoreError> {
        (**self).list_all().await
    }

    async fn list_by_buyer(&self, buyer_id: UserId) -> Result<Vec<Order>, OrderStoreError> {
        (**self).list_by_buyer(buyer_id).await
    }
}

/// Newest first; ties broken by order id so listings are stable.
pub(crate) fn newest_first(orders: &mut [Order]) {
    orders.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| b.order_id().cmp(a.order_id()))
    });
}
