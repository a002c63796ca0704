//! Entity trait: identity + continuity across state changes.

/// Something with an identity of its own that lives inside an aggregate
/// (e.g. a line item inside an order).
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
