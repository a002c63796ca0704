use std::collections::HashMap;
use std::sync::{RwLock, RwLockWriteGuard};

use async_trait::async_trait;

use storefront_core::{ProductId, ReservationId};
use storefront_inventory::{Reservation, StockEntry};

use super::r#trait::{LedgerError, Release, StockLedger};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hold {
    Held { product_id: ProductId, quantity: u32 },
    Released,
    Voided,
}

#[derive(Debug, Default)]
struct Shelves {
    entries: HashMap<ProductId, StockEntry>,
    holds: HashMap<ReservationId, Hold>,
}

/// In-memory stock ledger.
///
/// Intended for tests/dev. Counters and hold keys sit behind one lock, and
/// every mutation holds it for the whole check-and-decrement, which makes it
/// the conditional update the trait asks for.
#[derive(Debug, Default)]
pub struct InMemoryStockLedger {
    shelves: RwLock<Shelves>,
}

impl InMemoryStockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a product's stock record.
    pub fn put(&self, entry: StockEntry) -> Result<(), LedgerError> {
        self.write()?.entries.insert(entry.product_id(), entry);
        Ok(())
    }

    pub fn with_entries(entries: impl IntoIterator<Item = StockEntry>) -> Self {
        Self {
            shelves: RwLock::new(Shelves {
                entries: entries.into_iter().map(|e| (e.product_id(), e)).collect(),
                holds: HashMap::new(),
            }),
        }
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Shelves>, LedgerError> {
        self.shelves
            .write()
            .map_err(|_| LedgerError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait]
impl StockLedger for InMemoryStockLedger {
    async fn product(&self, product_id: ProductId) -> Result<StockEntry, LedgerError> {
        let shelves = self
            .shelves
            .read()
            .map_err(|_| LedgerError::Backend("lock poisoned".to_string()))?;
        shelves
            .entries
            .get(&product_id)
            .cloned()
            .ok_or(LedgerError::NotFound(product_id))
    }

    async fn reserve(
        &self,
        key: ReservationId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Reservation, LedgerError> {
        let mut shelves = self.write()?;
        if shelves.holds.contains_key(&key) {
            return Err(LedgerError::ReservationClosed(key));
        }

        let entry = shelves
            .entries
            .get_mut(&product_id)
            .ok_or(LedgerError::NotFound(product_id))?;
        let reservation = entry.reserve(quantity)?;

        shelves.holds.insert(
            key,
            Hold::Held {
                product_id,
                quantity,
            },
        );
        Ok(reservation)
    }

    async fn release(
        &self,
        key: ReservationId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Release, LedgerError> {
        let mut shelves = self.write()?;

        let (held_product, held_quantity) = match shelves.holds.get(&key).copied() {
            None => {
                shelves.holds.insert(key, Hold::Voided);
                return Ok(Release::Voided);
            }
            Some(Hold::Released | Hold::Voided) => return Ok(Release::Unchanged),
            Some(Hold::Held {
                product_id,
                quantity,
            }) => (product_id, quantity),
        };
        if (held_product, held_quantity) != (product_id, quantity) {
            return Err(LedgerError::Backend(format!(
                "reservation {key} holds {held_quantity} of {held_product}, not {quantity} of {product_id}"
            )));
        }

        let entry = shelves
            .entries
            .get_mut(&product_id)
            .ok_or(LedgerError::NotFound(product_id))?;
        entry.release(quantity)?;
        shelves.holds.insert(key, Hold::Released);
        Ok(Release::Restored)
    }
}
