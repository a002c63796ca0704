use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use storefront_core::{ProductId, ReservationId};
use storefront_inventory::{Reservation, StockEntry, StockError};

/// Inventory ledger operation error.
///
/// `Stock` carries the business refusals (out of stock, bad quantity);
/// `Backend` is everything the store itself failed at.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("product {0} not found")]
    NotFound(ProductId),

    #[error(transparent)]
    Stock(#[from] StockError),

    /// The key was already used: the hold is applied, released, or was
    /// voided by a release that got there first.
    #[error("reservation {0} was already applied or voided")]
    ReservationClosed(ReservationId),

    #[error("ledger backend error: {0}")]
    Backend(String),
}

/// What a keyed release did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// The hold had landed; its units are back on the counter.
    Restored,
    /// The hold never landed. The key is now closed, so a reserve carrying
    /// it that arrives late is refused.
    Voided,
    /// An earlier release already settled this key.
    Unchanged,
}

/// Stock counters shared by every concurrent placement.
///
/// ## Atomicity
///
/// `reserve` is one conditional update: "take N units only if at least N are
/// left". Implementations must never read the counter and write it back in
/// two steps, or concurrent orders could oversell.
///
/// ## Keyed holds
///
/// Every reserve carries a `ReservationId`, recorded atomically with the
/// decrement. `release` settles a key exactly once whatever happened to the
/// reserve: a caller whose reserve timed out releases the key and the
/// counter ends up right whether or not the reserve ever landed.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Current stock record for a product.
    async fn product(&self, product_id: ProductId) -> Result<StockEntry, LedgerError>;

    /// Take `quantity` units at the current unit price under `key`.
    async fn reserve(
        &self,
        key: ReservationId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Reservation, LedgerError>;

    /// Compensation: settle `key`, putting its units back if it landed.
    async fn release(
        &self,
        key: ReservationId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Release, LedgerError>;
}

#[async_trait]
impl<L> StockLedger for Arc<L>
where
    L: StockLedger + ?Sized,
{
    async fn product(&self, product_id: ProductId) -> Result<StockEntry, LedgerError> {
        (**self).product(product_id).await
    }

    async fn reserve(
        &self,
        key: ReservationId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Reservation, LedgerError> {
        (**self).reserve(key, product_id, quantity).await
    }

    async fn release(
        &self,
        key: ReservationId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Release, LedgerError> {
        (**self).release(key, product_id, quantity).await
    }
}
