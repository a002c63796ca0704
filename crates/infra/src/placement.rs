//! Order placement: buyer check, stock reservation, id minting, persistence.
//!
//! ## Stock is all-or-nothing
//!
//! Every line reserves through the ledger's conditional decrement under a
//! fresh `ReservationId`. If any later step fails (a reservation, minting,
//! the insert), every key handed to the ledger is released in reverse order
//! before the error is returned. That includes a reserve that timed out:
//! its outcome is unknown, but a keyed release puts the units back if it
//! landed and closes the key if it has not, so a late arrival is refused.
//!
//! ## The insert is never retried blindly
//!
//! The only retry on the write path is after `DuplicateId`, where the store
//! guarantees nothing was written. A timeout or backend error on the insert
//! is surfaced after compensating.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::field::Empty;
use tracing::{Span, debug, info, instrument, warn};

use storefront_core::{Aggregate, ProductId, ReservationId, UserId};
use storefront_events::EventBus;
use storefront_inventory::Reservation;
use storefront_orders::{
    IdGenerator, LineStatus, NewLine, Order, OrderCommand, OrderEvent, OrderStatus, PlaceOrder,
    ShippingSnapshot,
};

use crate::config::CoreConfig;
use crate::directory::UserDirectory;
use crate::error::OrderError;
use crate::ledger::{LedgerError, Release, StockLedger};
use crate::notifications::{Notification, publish_committed};
use crate::order_store::{OrderStore, OrderStoreError};
use crate::retry::{RetryPolicy, bounded, read_with_retry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// What a buyer submits. Prices are never taken from the request; each line
/// is priced by its reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub buyer_id: UserId,
    pub lines: Vec<RequestedLine>,
    /// Falls back to the buyer's default saved address when absent.
    #[serde(default)]
    pub shipping: Option<ShippingSnapshot>,
}

/// Stock that a placement has taken, or may have taken, under `key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Hold {
    key: ReservationId,
    product_id: ProductId,
    quantity: u32,
}

/// A hold the ledger confirmed, with the price it was taken at.
#[derive(Debug, Clone, Copy)]
struct Held {
    hold: Hold,
    reservation: Reservation,
}

/// Placement orchestrator.
pub struct OrderPlacement<L, S, D, B> {
    ledger: L,
    store: S,
    directory: D,
    bus: B,
    ids: Arc<dyn IdGenerator>,
    config: CoreConfig,
}

impl<L, S, D, B> OrderPlacement<L, S, D, B>
where
    L: StockLedger,
    S: OrderStore,
    D: UserDirectory,
    B: EventBus<Notification>,
{
    pub fn new(
        ledger: L,
        store: S,
        directory: D,
        bus: B,
        ids: Arc<dyn IdGenerator>,
        config: CoreConfig,
    ) -> Self {
        Self {
            ledger,
            store,
            directory,
            bus,
            ids,
            config,
        }
    }

    #[instrument(
        skip(self, request),
        fields(buyer_id = %request.buyer_id, lines = request.lines.len(), order_id = Empty),
        err
    )]
    pub async fn place_order(&self, request: PlaceOrderRequest) -> Result<Order, OrderError> {
        let policy = RetryPolicy::from(&self.config);
        let buyer_id = request.buyer_id;

        let buyer = read_with_retry("find_buyer", policy, || self.directory.find_buyer(buyer_id))
            .await?
            .ok_or(OrderError::BuyerNotFound(buyer_id))?;

        if request.lines.is_empty() {
            return Err(OrderError::EmptyOrder);
        }
        if let Some(line) = request.lines.iter().find(|l| l.quantity == 0) {
            return Err(OrderError::Validation(format!(
                "quantity for product {} must be positive",
                line.product_id
            )));
        }

        let shipping = request
            .shipping
            .or_else(|| buyer.default_address().cloned())
            .ok_or_else(|| OrderError::InvalidShipping("no shipping address provided".to_string()))?;
        shipping
            .validate()
            .map_err(|e| OrderError::InvalidShipping(e.to_string()))?;

        let held = self.reserve_all(&request.lines).await?;

        match self.persist(buyer_id, &shipping, &held).await {
            Ok(order) => {
                Span::current().record("order_id", order.order_id().as_str());
                info!(
                    order_id = %order.order_id(),
                    total = order.total_amount(),
                    "order placed"
                );
                Ok(order)
            }
            Err(err) => {
                let holds: Vec<Hold> = held.iter().map(|h| h.hold).collect();
                self.compensate(&holds).await;
                Err(err)
            }
        }
    }

    /// Reserve every line in request order. On failure, every key sent to
    /// the ledger so far has been released again.
    async fn reserve_all(&self, lines: &[RequestedLine]) -> Result<Vec<Held>, OrderError> {
        let limit = self.config.store_timeout;
        let mut held: Vec<Held> = Vec::with_capacity(lines.len());

        for line in lines {
            let hold = Hold {
                key: ReservationId::new(),
                product_id: line.product_id,
                quantity: line.quantity,
            };
            let outcome = bounded(
                "reserve",
                limit,
                self.ledger.reserve(hold.key, hold.product_id, hold.quantity),
            )
            .await;

            let (err, unknown): (OrderError, Option<Hold>) = match outcome {
                Ok(Ok(reservation)) => {
                    debug!(
                        product_id = %reservation.product_id,
                        quantity = reservation.quantity,
                        unit_price = reservation.unit_price,
                        remaining = reservation.remaining,
                        "stock reserved"
                    );
                    held.push(Held { hold, reservation });
                    continue;
                }
                // A lost connection or commit may still have landed.
                Ok(Err(err @ LedgerError::Backend(_))) => (err.into(), Some(hold)),
                // Refused outright: nothing was taken under this key.
                Ok(Err(err)) => (err.into(), None),
                Err(timed_out) => {
                    warn!(product_id = %hold.product_id, reservation = %hold.key, "reserve outcome unknown; settling its key");
                    (timed_out.into(), Some(hold))
                }
            };

            let settle: Vec<Hold> = held.iter().map(|h| h.hold).chain(unknown).collect();
            self.compensate(&settle).await;
            return Err(err);
        }

        Ok(held)
    }

    /// Mint ids, build the aggregate and insert it, minting again when the
    /// store reports an id collision.
    async fn persist(
        &self,
        buyer_id: UserId,
        shipping: &ShippingSnapshot,
        held: &[Held],
    ) -> Result<Order, OrderError> {
        let attempts = self.config.id_mint_attempts.max(1);
        let placed_at = Utc::now();

        for attempt in 1..=attempts {
            let (order, events) = self.build(buyer_id, shipping, held, placed_at)?;

            match bounded("insert_order", self.config.store_timeout, self.store.insert(&order)).await
            {
                Ok(Ok(())) => {
                    publish_committed(&self.bus, &order, &events);
                    return Ok(order);
                }
                Ok(Err(OrderStoreError::DuplicateId(what))) => {
                    warn!(attempt, attempts, collided = %what, "id collision on insert; minting fresh ids");
                }
                Ok(Err(err)) => return Err(err.into()),
                Err(timed_out) => return Err(timed_out.into()),
            }
        }

        Err(OrderError::Persistence(format!(
            "no unique order/line ids after {attempts} attempts"
        )))
    }

    fn build(
        &self,
        buyer_id: UserId,
        shipping: &ShippingSnapshot,
        held: &[Held],
        placed_at: chrono::DateTime<Utc>,
    ) -> Result<(Order, Vec<OrderEvent>), OrderError> {
        let order_id = self.ids.new_order_id();
        let lines = held
            .iter()
            .map(|h| &h.reservation)
            .map(|r| NewLine {
                line_order_id: self.ids.new_line_id(&order_id, r.product_id),
                product_id: r.product_id,
                quantity: r.quantity,
                price_at_purchase: r.unit_price,
            })
            .collect();

        let mut order = Order::empty(order_id.clone());
        let events = order
            .execute(&OrderCommand::PlaceOrder(PlaceOrder {
                order_id,
                buyer_id,
                shipping: shipping.clone(),
                lines,
                occurred_at: placed_at,
            }))
            .map_err(|e| OrderError::from_domain(e, LineStatus::Pending, OrderStatus::Pending))?;

        Ok((order, events))
    }

    /// Settle holds by key, newest first. A release that fails is logged
    /// with its key so the counter can be reconciled by hand.
    async fn compensate(&self, holds: &[Hold]) {
        if holds.is_empty() {
            return;
        }
        warn!(reservations = holds.len(), "placement failed; releasing reserved stock");

        for h in holds.iter().rev() {
            let outcome = bounded(
                "release",
                self.config.store_timeout,
                self.ledger.release(h.key, h.product_id, h.quantity),
            )
            .await;

            match outcome {
                Ok(Ok(Release::Restored)) => {
                    debug!(product_id = %h.product_id, quantity = h.quantity, "stock released")
                }
                Ok(Ok(Release::Voided)) => {
                    debug!(product_id = %h.product_id, reservation = %h.key, "reservation never landed; key closed")
                }
                Ok(Ok(Release::Unchanged)) => {}
                Ok(Err(err)) => {
                    warn!(product_id = %h.product_id, quantity = h.quantity, reservation = %h.key, error = %err, "release failed; stock left reserved")
                }
                Err(timed_out) => {
                    warn!(product_id = %h.product_id, quantity = h.quantity, reservation = %h.key, limit = ?timed_out.limit, "release timed out; stock may be left reserved")
                }
            }
        }
    }
}
