//! Value object trait: equality by value, not identity.

/// Marker trait for immutable values compared by their attributes.
///
/// The shipping snapshot copied onto an order and a tracking history entry
/// are value objects: replacing one means building a new value, never
/// mutating the old one in place.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
