use serde::{Deserialize, Serialize};
use thiserror::Error;

use storefront_core::{ProductId, ValueObject};

/// Why a stock mutation was refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    #[error("product {product_id} is out of stock (requested {requested}, available {available})")]
    OutOfStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),
}

/// Stock record for one catalog product.
///
/// Invariant: `available == (quantity > 0)`. The fields are private so the
/// flag can only change together with the counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntry {
    product_id: ProductId,
    quantity: u32,
    available: bool,
    /// Price in smallest currency unit (e.g., cents).
    unit_price: u64,
}

/// Outcome of a successful reservation: the units taken and the price they
/// were taken at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: u64,
    /// Stock left on the counter right after this reservation.
    pub remaining: u32,
}

impl ValueObject for Reservation {}

impl StockEntry {
    pub fn new(product_id: ProductId, quantity: u32, unit_price: u64) -> Self {
        Self {
            product_id,
            quantity,
            available: quantity > 0,
            unit_price,
        }
    }

    /// Rebuild from stored columns, re-deriving the availability flag from
    /// the counter rather than trusting a stored value.
    pub fn from_parts(product_id: ProductId, quantity: u32, unit_price: u64) -> Self {
        Self::new(product_id, quantity, unit_price)
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn available(&self) -> bool {
        self.available
    }

    pub fn unit_price(&self) -> u64 {
        self.unit_price
    }

    /// Take `quantity` units off the counter at the current unit price.
    ///
    /// Leaves the entry untouched on error.
    pub fn reserve(&mut self, quantity: u32) -> Result<Reservation, StockError> {
        if quantity == 0 {
            return Err(StockError::InvalidQuantity(
                "reservation quantity must be positive".to_string(),
            ));
        }
        if quantity > self.quantity {
            return Err(StockError::OutOfStock {
                product_id: self.product_id,
                requested: quantity,
                available: self.quantity,
            });
        }

        self.quantity -= quantity;
        self.available = self.quantity > 0;

        Ok(Reservation {
            product_id: self.product_id,
            quantity,
            unit_price: self.unit_price,
            remaining: self.quantity,
        })
    }

    /// Put `quantity` units back (compensation for a reservation that did not
    /// end up in a persisted order).
    pub fn release(&mut self, quantity: u32) -> Result<(), StockError> {
        if quantity == 0 {
            return Err(StockError::InvalidQuantity(
                "release quantity must be positive".to_string(),
            ));
        }
        let restored = self.quantity.checked_add(quantity).ok_or_else(|| {
            StockError::InvalidQuantity(format!(
                "releasing {quantity} units would overflow the stock counter"
            ))
        })?;

        self.quantity = restored;
        self.available = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(quantity: u32) -> StockEntry {
        StockEntry::new(ProductId::new(), quantity, 1_999)
    }

    #[test]
    fn new_entry_derives_availability() {
        assert!(entry(3).available());
        assert!(!entry(0).available());
    }

    #[test]
    fn reserve_decrements_and_captures_price() {
        let mut stock = entry(5);
        let r = stock.reserve(2).unwrap();

        assert_eq!(r.quantity, 2);
        assert_eq!(r.unit_price, 1_999);
        assert_eq!(r.remaining, 3);
        assert_eq!(stock.quantity(), 3);
        assert!(stock.available());
    }

    #[test]
    fn reserving_last_units_flips_availability() {
        let mut stock = entry(2);
        stock.reserve(2).unwrap();

        assert_eq!(stock.quantity(), 0);
        assert!(!stock.available());
    }

    #[test]
    fn over_reservation_is_out_of_stock_and_leaves_entry_untouched() {
        let mut stock = entry(1);
        let before = stock.clone();

        let err = stock.reserve(2).unwrap_err();
        match err {
            StockError::OutOfStock {
                requested,
                available,
                ..
            } => {
                assert_eq!(requested, 2);
                assert_eq!(available, 1);
            }
            other => panic!("expected OutOfStock, got {other:?}"),
        }
        assert_eq!(stock, before);
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let mut stock = entry(1);
        assert!(matches!(stock.reserve(0), Err(StockError::InvalidQuantity(_))));
        assert!(matches!(stock.release(0), Err(StockError::InvalidQuantity(_))));
    }

    #[test]
    fn release_restores_availability() {
        let mut stock = entry(1);
        stock.reserve(1).unwrap();
        assert!(!stock.available());

        stock.release(1).unwrap();
        assert_eq!(stock.quantity(), 1);
        assert!(stock.available());
    }

    #[test]
    fn release_overflow_is_rejected() {
        let mut stock = entry(u32::MAX);
        assert!(matches!(stock.release(1), Err(StockError::InvalidQuantity(_))));
        assert_eq!(stock.quantity(), u32::MAX);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            })]

            /// Property: the counter never goes negative and the flag always
            /// tracks it, whatever sequence of reservations is attempted.
            #[test]
            fn reservations_never_oversell(
                initial in 0u32..200,
                requests in proptest::collection::vec(1u32..20, 0..50)
            ) {
                let mut stock = entry(initial);
                let mut granted = 0u32;

                for q in requests {
                    if let Ok(r) = stock.reserve(q) {
                        granted += r.quantity;
                    }
                    prop_assert_eq!(stock.available(), stock.quantity() > 0);
                }

                prop_assert!(granted <= initial);
                prop_assert_eq!(stock.quantity(), initial - granted);
            }

            /// Property: releasing what was reserved restores the original count.
            #[test]
            fn release_compensates_reserve(initial in 1u32..1_000, take in 1u32..1_000) {
                prop_assume!(take <= initial);
                let mut stock = entry(initial);

                stock.reserve(take).unwrap();
                stock.release(take).unwrap();

                prop_assert_eq!(stock.quantity(), initial);
                prop_assert!(stock.available());
            }
        }
    }
}
