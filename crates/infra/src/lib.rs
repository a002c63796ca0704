//! Infrastructure layer: storage boundaries, the placement orchestrator, the
//! status engine, notification fan-out and configuration.

pub mod config;
pub mod directory;
pub mod error;
pub mod fulfillment;
pub mod ledger;
pub mod notifications;
pub mod order_store;
pub mod placement;
pub mod queries;
pub mod retry;

#[cfg(test)]
mod fixtures;
#[cfg(test)]
mod integration_tests;

pub use config::CoreConfig;
pub use error::{ErrorKind, OrderError};
pub use fulfillment::{LineTransition, StatusEngine};
pub use placement::{OrderPlacement, PlaceOrderRequest, RequestedLine};
pub use queries::OrderQueries;
