//! Durable order documents.
//!
//! One document per order, lines embedded. The store is where order and line
//! id uniqueness is enforced.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;
pub use r#trait::{OrderStore, OrderStoreError};
