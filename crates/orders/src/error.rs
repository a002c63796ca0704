use thiserror::Error;

use crate::ids::LineOrderId;
use crate::status::LineStatus;

/// Rule violations raised by the order aggregate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderDomainError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("order already placed")]
    AlreadyPlaced,

    #[error("order has not been placed")]
    NotPlaced,

    #[error("line {0} does not belong to this order")]
    LineNotFound(LineOrderId),

    #[error("cannot move from {from} to {to}: {reason}")]
    InvalidTransition {
        from: LineStatus,
        to: LineStatus,
        reason: &'static str,
    },

    #[error("every line of the order is already terminal")]
    AllLinesTerminal,
}
