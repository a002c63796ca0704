//! Service-level error for order placement and status changes.

use thiserror::Error;

use storefront_core::{ProductId, UserId};
use storefront_inventory::StockError;
use storefront_orders::{LineOrderId, LineStatus, OrderDomainError, OrderStatus};

use crate::directory::DirectoryError;
use crate::ledger::LedgerError;
use crate::order_store::OrderStoreError;

/// Failure category, used by callers to decide whether to retry and by the
/// HTTP layer to pick a status code.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input. Never retried.
    Validation,
    /// Buyer, product, order or line absent. Not retried.
    NotFound,
    /// Not enough stock. The caller may resubmit with less.
    OutOfStock,
    /// Concurrent modification. Safe to retry the whole operation.
    Conflict,
    /// Store unreachable, timed out or returned garbage.
    Persistence,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderError {
    #[error("order must contain at least one line")]
    EmptyOrder,

    #[error("invalid shipping address: {0}")]
    InvalidShipping(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("cannot move from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: LineStatus,
        reason: String,
    },

    #[error("buyer {0} not found")]
    BuyerNotFound(UserId),

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("order {0} not found")]
    OrderNotFound(String),

    #[error("line {0} not found")]
    LineNotFound(LineOrderId),

    #[error("product {product_id} is out of stock (requested {requested}, available {available})")]
    OutOfStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::EmptyOrder
            | OrderError::InvalidShipping(_)
            | OrderError::Validation(_)
            | OrderError::InvalidStatus(_)
            | OrderError::InvalidTransition { .. } => ErrorKind::Validation,
            OrderError::BuyerNotFound(_)
            | OrderError::ProductNotFound(_)
            | OrderError::OrderNotFound(_)
            | OrderError::LineNotFound(_) => ErrorKind::NotFound,
            OrderError::OutOfStock { .. } => ErrorKind::OutOfStock,
            OrderError::Conflict(_) => ErrorKind::Conflict,
            OrderError::Persistence(_) => ErrorKind::Persistence,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            OrderError::EmptyOrder => "empty_order",
            OrderError::InvalidShipping(_) => "invalid_shipping",
            OrderError::Validation(_) => "validation_error",
            OrderError::InvalidStatus(_) => "invalid_status",
            OrderError::InvalidTransition { .. } => "invalid_transition",
            OrderError::BuyerNotFound(_) => "buyer_not_found",
            OrderError::ProductNotFound(_) => "product_not_found",
            OrderError::OrderNotFound(_) => "order_not_found",
            OrderError::LineNotFound(_) => "line_not_found",
            OrderError::OutOfStock { .. } => "out_of_stock",
            OrderError::Conflict(_) => "conflict",
            OrderError::Persistence(_) => "persistence_error",
        }
    }
}

impl From<StockError> for OrderError {
    fn from(value: StockError) -> Self {
        match value {
            StockError::OutOfStock {
                product_id,
                requested,
                available,
            } => OrderError::OutOfStock {
                product_id,
                requested,
                available,
            },
            StockError::InvalidQuantity(msg) => OrderError::Validation(msg),
        }
    }
}

impl From<LedgerError> for OrderError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::NotFound(product_id) => OrderError::ProductNotFound(product_id),
            LedgerError::Stock(e) => e.into(),
            LedgerError::ReservationClosed(key) => {
                OrderError::Persistence(format!("reservation {key} was already applied or voided"))
            }
            LedgerError::Backend(msg) => OrderError::Persistence(msg),
        }
    }
}

impl From<OrderStoreError> for OrderError {
    fn from(value: OrderStoreError) -> Self {
        match value {
            OrderStoreError::Concurrency(msg) => OrderError::Conflict(msg),
            OrderStoreError::NotFound(order_id) => OrderError::OrderNotFound(order_id.to_string()),
            OrderStoreError::DuplicateId(msg) => {
                OrderError::Persistence(format!("id collision: {msg}"))
            }
            OrderStoreError::Backend(msg) | OrderStoreError::Serialization(msg) => {
                OrderError::Persistence(msg)
            }
        }
    }
}

impl From<DirectoryError> for OrderError {
    fn from(value: DirectoryError) -> Self {
        OrderError::Persistence(value.to_string())
    }
}

impl OrderError {
    /// Translate an aggregate rule violation raised while moving lines of an
    /// order (currently `order_status`) towards `requested`.
    pub fn from_domain(err: OrderDomainError, requested: LineStatus, order_status: OrderStatus) -> Self {
        match err {
            OrderDomainError::Validation(msg) => OrderError::Validation(msg),
            OrderDomainError::AlreadyPlaced => OrderError::Conflict("order already placed".to_string()),
            OrderDomainError::NotPlaced => OrderError::Validation("order has not been placed".to_string()),
            OrderDomainError::LineNotFound(id) => OrderError::LineNotFound(id),
            OrderDomainError::InvalidTransition { from, to, reason } => OrderError::InvalidTransition {
                from: from.to_string(),
                to,
                reason: reason.to_string(),
            },
            OrderDomainError::AllLinesTerminal => OrderError::InvalidTransition {
                from: order_status.to_string(),
                to: requested,
                reason: "every line is already delivered or cancelled".to_string(),
            },
        }
    }
}
