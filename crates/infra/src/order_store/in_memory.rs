use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use storefront_core::{AggregateRoot, ExpectedVersion, UserId};
use storefront_orders::{LineOrderId, Order, OrderId};

use super::r#trait::{OrderStore, OrderStoreError, newest_first};

#[derive(Debug, Default)]
struct Documents {
    orders: HashMap<OrderId, Order>,
    /// Unique index: line id -> owning order.
    lines: HashMap<LineOrderId, OrderId>,
}

/// In-memory order store.
///
/// Intended for tests/dev. Keeps the same unique indexes a database would
/// (order id and line id), checked under one write lock.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    docs: RwLock<Documents>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> OrderStoreError {
    OrderStoreError::Backend("lock poisoned".to_string())
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<(), OrderStoreError> {
        let mut docs = self.docs.write().map_err(|_| poisoned())?;

        if docs.orders.contains_key(order.order_id()) {
            return Err(OrderStoreError::DuplicateId(format!(
                "order id {}",
                order.order_id()
            )));
        }
        for line in order.line_items() {
            if docs.lines.contains_key(line.line_order_id()) {
                return Err(OrderStoreError::DuplicateId(format!(
                    "line id {}",
                    line.line_order_id()
                )));
            }
        }

        for line in order.line_items() {
            docs.lines
                .insert(line.line_order_id().clone(), order.order_id().clone());
        }
        docs.orders.insert(order.order_id().clone(), order.clone());
        Ok(())
    }

    async fn load(&self, order_id: &OrderId) -> Result<Option<Order>, OrderStoreError> {
        let docs = self.docs.read().map_err(|_| poisoned())?;
        Ok(docs.orders.get(order_id).cloned())
    }

    async fn find_by_line(&self, line_order_id: &LineOrderId) -> Result<Option<Order>, OrderStoreError> {
        let docs = self.docs.read().map_err(|_| poisoned())?;
        Ok(docs
            .lines
            .get(line_order_id)
            .and_then(|order_id| docs.orders.get(order_id))
            .cloned())
    }

    async fn update(&self, order: &Order, expected: ExpectedVersion) -> Result<(), OrderStoreError> {
        let mut docs = self.docs.write().map_err(|_| poisoned())?;

        let stored = docs
            .orders
            .get_mut(order.order_id())
            .ok_or_else(|| OrderStoreError::NotFound(order.order_id().clone()))?;

        let current = stored.version();
        if !expected.matches(Some(current)) {
            return Err(OrderStoreError::Concurrency(format!(
                "expected {expected:?}, found {current}"
            )));
        }

        *stored = order.clone();
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Order>, OrderStoreError> {
        let docs = self.docs.read().map_err(|_| poisoned())?;
        let mut orders: Vec<Order> = docs.orders.values().cloned().collect();
        newest_first(&mut orders);
        Ok(orders)
    }

    async fn list_by_buyer(&self, buyer_id: UserId) -> Result<Vec<Order>, OrderStoreError> {
        let docs = self.docs.read().map_err(|_| poisoned())?;
        let mut orders: Vec<Order> = docs
            .orders
            .values()
            .filter(|o| o.buyer_id() == buyer_id)
            .cloned()
            .collect();
        newest_first(&mut orders);
        Ok(orders)
    }
}
