//! Status engine: moves line items (or whole orders) through delivery
//! statuses.
//!
//! Each change is a read-modify-write of the full order document guarded by
//! its version. Losing the race surfaces as `Conflict` from the store; the
//! engine reloads and re-decides a bounded number of times, so a change is
//! always judged against the latest line statuses and never overwrites a
//! concurrent one.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument, warn};

use storefront_core::{Aggregate, AggregateRoot, ExpectedVersion};
use storefront_events::EventBus;
use storefront_orders::{
    ChangeLineStatus, ChangeOrderStatus, LineItem, LineOrderId, LineStatus, Order, OrderCommand,
    OrderId, OrderStatus,
};

use crate::config::CoreConfig;
use crate::error::OrderError;
use crate::notifications::{Notification, publish_committed};
use crate::order_store::{OrderStore, OrderStoreError};
use crate::retry::{RetryPolicy, bounded, read_with_retry};

/// Result of a single-line change: the line as stored plus the order status
/// it rolled up to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineTransition {
    pub order_id: OrderId,
    pub order_status: OrderStatus,
    pub line: LineItem,
}

#[derive(Debug, Clone, Copy)]
enum Target<'a> {
    Line(&'a LineOrderId),
    Order(&'a OrderId),
}

pub struct StatusEngine<S, B> {
    store: S,
    bus: B,
    config: CoreConfig,
}

impl<S, B> StatusEngine<S, B>
where
    S: OrderStore,
    B: EventBus<Notification>,
{
    pub fn new(store: S, bus: B, config: CoreConfig) -> Self {
        Self { store, bus, config }
    }

    /// Move one line to `status` and recompute the order status.
    #[instrument(skip(self), fields(line_order_id = %line_order_id, status = %status), err)]
    pub async fn transition_line(
        &self,
        line_order_id: &LineOrderId,
        status: LineStatus,
    ) -> Result<LineTransition, OrderError> {
        let order = self.change(Target::Line(line_order_id), status).await?;

        let line = order
            .line(line_order_id)
            .cloned()
            .ok_or_else(|| OrderError::LineNotFound(line_order_id.clone()))?;

        Ok(LineTransition {
            order_id: order.order_id().clone(),
            order_status: order.order_status(),
            line,
        })
    }

    /// Move every open line of the order to `status` in one write.
    #[instrument(skip(self), fields(order_id = %order_id, status = %status), err)]
    pub async fn transition_order(
        &self,
        order_id: &OrderId,
        status: LineStatus,
    ) -> Result<Order, OrderError> {
        self.change(Target::Order(order_id), status).await
    }

    async fn change(&self, target: Target<'_>, status: LineStatus) -> Result<Order, OrderError> {
        let attempts = self.config.conflict_retry_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.try_change(target, status).await {
                Err(OrderError::Conflict(reason)) if attempt < attempts => {
                    warn!(attempt, attempts, %reason, "concurrent order update; reloading");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn try_change(&self, target: Target<'_>, status: LineStatus) -> Result<Order, OrderError> {
        let mut order = self.locate(target).await?;
        let loaded = order.version();
        let before = order.order_status();

        let policy = self.config.transition_policy;
        let occurred_at = Utc::now();
        let command = match target {
            Target::Line(line_order_id) => OrderCommand::ChangeLineStatus(ChangeLineStatus {
                line_order_id: line_order_id.clone(),
                status,
                policy,
                occurred_at,
            }),
            Target::Order(order_id) => OrderCommand::ChangeOrderStatus(ChangeOrderStatus {
                order_id: order_id.clone(),
                status,
                policy,
                occurred_at,
            }),
        };

        let events = order
            .execute(&command)
            .map_err(|e| OrderError::from_domain(e, status, before))?;

        let outcome = bounded(
            "update_order",
            self.config.store_timeout,
            self.store.update(&order, ExpectedVersion::Exact(loaded)),
        )
        .await?;

        match outcome {
            Ok(()) => {}
            Err(OrderStoreError::Concurrency(msg)) => return Err(OrderError::Conflict(msg)),
            Err(err) => return Err(err.into()),
        }

        info!(
            order_id = %order.order_id(),
            lines_changed = events.len(),
            from = %before,
            to = %order.order_status(),
            "order status updated"
        );
        publish_committed(&self.bus, &order, &events);

        Ok(order)
    }

    async fn locate(&self, target: Target<'_>) -> Result<Order, OrderError> {
        let policy = RetryPolicy::from(&self.config);

        match target {
            Target::Line(line_order_id) => {
                read_with_retry("find_by_line", policy, || self.store.find_by_line(line_order_id))
                    .await?
                    .ok_or_else(|| OrderError::LineNotFound(line_order_id.clone()))
            }
            Target::Order(order_id) => {
                read_with_retry("load_order", policy, || self.store.load(order_id))
                    .await?
                    .ok_or_else(|| OrderError::OrderNotFound(order_id.to_string()))
            }
        }
    }
}
