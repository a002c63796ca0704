//! Inventory ledger boundary: atomic conditional reserve/release over a
//! product's stock counter.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryStockLedger;
pub use postgres::PostgresStockLedger;
pub use r#trait::{LedgerError, Release, StockLedger};
