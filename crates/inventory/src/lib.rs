//! Inventory ledger domain rules.
//!
//! A product's stock counter and the arithmetic for reserving and releasing
//! units against it. Atomicity across concurrent callers is the job of the
//! ledger implementations in `storefront-infra`; this crate only decides
//! whether a single reserve/release is legal and what the result looks like.

pub mod stock;

pub use stock::{Reservation, StockEntry, StockError};
