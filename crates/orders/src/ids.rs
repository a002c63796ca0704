//! Order and line identifiers, and the generators that mint them.
//!
//! Both kinds of id look like `#3b` followed by 12 decimal digits. Minting
//! alone does not guarantee uniqueness: the order store rejects an insert
//! whose order id or any line id is already taken, and the placement flow
//! re-mints and retries. Generators only need to make collisions rare.

use core::fmt;
use core::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use serde::{Deserialize, Serialize};

use storefront_core::{DomainError, ProductId};

pub const ID_PREFIX: &str = "#3b";
const DIGITS: usize = 12;
const MIN_SUFFIX: u64 = 100_000_000_000;
const MAX_SUFFIX: u64 = 999_999_999_999;

fn validate(kind: &str, s: &str) -> Result<(), DomainError> {
    let digits = s
        .strip_prefix(ID_PREFIX)
        .ok_or_else(|| DomainError::invalid_id(format!("{kind}: must start with '{ID_PREFIX}'")))?;
    if digits.len() != DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DomainError::invalid_id(format!(
            "{kind}: expected {DIGITS} digits after '{ID_PREFIX}'"
        )));
    }
    Ok(())
}

fn format_id(suffix: u64) -> String {
    format!("{ID_PREFIX}{suffix:0width$}", width = DIGITS)
}

/// Identifier of an order. Immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

/// Identifier of one line item, unique across every order in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineOrderId(String);

macro_rules! impl_string_id {
    ($t:ident, $name:literal) => {
        impl $t {
            pub fn as_str(&self) -> &str {
                &self.0
            }

            fn from_suffix(suffix: u64) -> Self {
                Self(format_id(suffix))
            }
        }

        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                validate($name, s)?;
                Ok(Self(s.to_string()))
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

impl_string_id!(OrderId, "OrderId");
impl_string_id!(LineOrderId, "LineOrderId");

/// Mints order and line identifiers.
pub trait IdGenerator: Send + Sync {
    fn new_order_id(&self) -> OrderId;

    fn new_line_id(&self, order_id: &OrderId, product_id: ProductId) -> LineOrderId;
}

impl<G> IdGenerator for std::sync::Arc<G>
where
    G: IdGenerator + ?Sized,
{
    fn new_order_id(&self) -> OrderId {
        (**self).new_order_id()
    }

    fn new_line_id(&self, order_id: &OrderId, product_id: ProductId) -> LineOrderId {
        (**self).new_line_id(order_id, product_id)
    }
}

/// Random 12-digit suffixes.
///
/// Lines get their own random suffix rather than one derived from the order
/// id, so a line id says nothing about which order it belongs to.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl RandomIdGenerator {
    fn suffix() -> u64 {
        rand::rng().random_range(MIN_SUFFIX..=MAX_SUFFIX)
    }
}

impl IdGenerator for RandomIdGenerator {
    fn new_order_id(&self) -> OrderId {
        OrderId::from_suffix(Self::suffix())
    }

    fn new_line_id(&self, _order_id: &OrderId, _product_id: ProductId) -> LineOrderId {
        LineOrderId::from_suffix(Self::suffix())
    }
}

/// Monotonic counter shared by orders and lines. Deterministic, for tests
/// and fixtures.
#[derive(Debug)]
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self::starting_at(MIN_SUFFIX)
    }

    /// Clamped into the 12-digit range.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first.clamp(MIN_SUFFIX, MAX_SUFFIX)),
        }
    }

    /// Saturates at the last 12-digit suffix. Repeats past that point are
    /// refused by the store as duplicate ids.
    fn take(&self) -> u64 {
        self.next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_add(1).min(MAX_SUFFIX))
            })
            .unwrap_or_else(|n| n)
    }
}

impl Default for SequentialIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn new_order_id(&self) -> OrderId {
        OrderId::from_suffix(self.take())
    }

    fn new_line_id(&self, _order_id: &OrderId, _product_id: ProductId) -> LineOrderId {
        LineOrderId::from_suffix(self.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn random_ids_have_the_expected_shape() {
        let g = RandomIdGenerator;
        let order = g.new_order_id();
        let line = g.new_line_id(&order, ProductId::new());

        assert!(order.as_str().starts_with("#3b"));
        assert_eq!(order.as_str().len(), 15);
        assert!(order.as_str().parse::<OrderId>().is_ok());
        assert!(line.as_str().parse::<LineOrderId>().is_ok());
    }

    #[test]
    fn parse_rejects_malformed_ids() {
        assert!("3b123456789012".parse::<OrderId>().is_err());
        assert!("#3b12345".parse::<OrderId>().is_err());
        assert!("#3b12345678901x".parse::<LineOrderId>().is_err());
    }

    #[test]
    fn sequential_ids_never_repeat() {
        let g = SequentialIdGenerator::new();
        let order = g.new_order_id();
        let mut seen = HashSet::new();
        assert!(seen.insert(order.to_string()));
        for _ in 0..1_000 {
            assert!(seen.insert(g.new_line_id(&order, ProductId::new()).to_string()));
        }
    }

    #[test]
    fn sequential_start_is_clamped() {
        let g = SequentialIdGenerator::starting_at(7);
        assert_eq!(g.new_order_id().as_str(), "#3b100000000000");
    }

    #[test]
    fn sequential_ids_stay_parseable_at_the_top_of_the_range() {
        let g = SequentialIdGenerator::starting_at(MAX_SUFFIX - 1);
        let ids: Vec<OrderId> = (0..3).map(|_| g.new_order_id()).collect();

        assert_eq!(ids[0].as_str(), "#3b999999999998");
        assert_eq!(ids[1].as_str(), "#3b999999999999");
        assert_eq!(ids[2], ids[1]);
        for id in &ids {
            assert_eq!(id.as_str().parse::<OrderId>().unwrap(), *id);
        }
    }
}
