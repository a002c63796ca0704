//! Buyer lookup: the one thing the order core needs from the user records.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryUserDirectory;
pub use postgres::PostgresUserDirectory;
pub use r#trait::{BuyerProfile, DirectoryError, UserDirectory};
