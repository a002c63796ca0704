//! `storefront-core`: domain foundation building blocks.
//!
//! Pure domain primitives shared by the inventory and order crates. Nothing in
//! here performs IO.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{ProductId, ReservationId, UserId};
pub use value_object::ValueObject;
