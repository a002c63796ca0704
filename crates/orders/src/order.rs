use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{Aggregate, AggregateRoot, Entity, ProductId, UserId, ValueObject};
use storefront_events::Event;

use crate::error::OrderDomainError;
use crate::ids::{LineOrderId, OrderId};
use crate::shipping::{AddressType, ShippingSnapshot};
use crate::status::{LineStatus, OrderStatus, TransitionPolicy, rollup};

/// One entry of a line's append-only tracking history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEntry {
    pub status: LineStatus,
    pub timestamp: DateTime<Utc>,
}

impl ValueObject for TrackingEntry {}

/// A product/quantity entry of an order, fulfilled independently of its
/// siblings. Owned by its order; never exists on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    line_order_id: LineOrderId,
    product_id: ProductId,
    quantity: u32,
    /// Unit price in smallest currency unit, captured at reservation time.
    price_at_purchase: u64,
    status: LineStatus,
    tracking_history: Vec<TrackingEntry>,
}

impl LineItem {
    pub fn line_order_id(&self) -> &LineOrderId {
        &self.line_order_id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn price_at_purchase(&self) -> u64 {
        self.price_at_purchase
    }

    pub fn status(&self) -> LineStatus {
        self.status
    }

    pub fn tracking_history(&self) -> &[TrackingEntry] {
        &self.tracking_history
    }

    pub fn line_total(&self) -> u64 {
        self.price_at_purchase.saturating_mul(u64::from(self.quantity))
    }
}

impl Entity for LineItem {
    type Id = LineOrderId;

    fn id(&self) -> &Self::Id {
        &self.line_order_id
    }
}

fn placed_on_load() -> bool {
    true
}

/// Aggregate root: Order.
///
/// Stored as one document (order + embedded lines). `order_status` is always
/// the rollup of the line statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    order_id: OrderId,
    buyer_id: UserId,
    shipping_snapshot: ShippingSnapshot,
    line_items: Vec<LineItem>,
    order_status: OrderStatus,
    created_at: DateTime<Utc>,
    version: u64,
    // Stored documents are always placed orders.
    #[serde(skip, default = "placed_on_load")]
    placed: bool,
}

impl Order {
    /// Not-yet-placed instance; `PlaceOrder` fills it in.
    pub fn empty(order_id: OrderId) -> Self {
        Self {
            order_id,
            buyer_id: UserId::new(),
            shipping_snapshot: ShippingSnapshot {
                name: String::new(),
                phone_no: String::new(),
                address_line: String::new(),
                state: String::new(),
                city: String::new(),
                pincode: String::new(),
                country: None,
                landmark: None,
                address_type: AddressType::Custom,
            },
            line_items: Vec::new(),
            order_status: OrderStatus::Pending,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            version: 0,
            placed: false,
        }
    }

    pub fn order_id(&self) -> &OrderId {
        &self.order_id
    }

    pub fn buyer_id(&self) -> UserId {
        self.buyer_id
    }

    pub fn shipping_snapshot(&self) -> &ShippingSnapshot {
        &self.shipping_snapshot
    }

    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    pub fn line(&self, line_order_id: &LineOrderId) -> Option<&LineItem> {
        self.line_items
            .iter()
            .find(|l| &l.line_order_id == line_order_id)
    }

    pub fn order_status(&self) -> OrderStatus {
        self.order_status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_placed(&self) -> bool {
        self.placed
    }

    /// Every line is `Delivered` or `Cancelled`.
    pub fn is_terminal(&self) -> bool {
        self.placed && self.order_status.is_terminal()
    }

    pub fn total_amount(&self) -> u64 {
        self.line_items
            .iter()
            .fold(0u64, |acc, l| acc.saturating_add(l.line_total()))
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.order_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// A line whose stock has already been reserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLine {
    pub line_order_id: LineOrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price_at_purchase: u64,
}

/// Command: PlaceOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub buyer_id: UserId,
    pub shipping: ShippingSnapshot,
    pub lines: Vec<NewLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeLineStatus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLineStatus {
    pub line_order_id: LineOrderId,
    pub status: LineStatus,
    pub policy: TransitionPolicy,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeOrderStatus (every non-terminal line at once).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeOrderStatus {
    pub order_id: OrderId,
    pub status: LineStatus,
    pub policy: TransitionPolicy,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    PlaceOrder(PlaceOrder),
    ChangeLineStatus(ChangeLineStatus),
    ChangeOrderStatus(ChangeOrderStatus),
}

/// Event: OrderPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub buyer_id: UserId,
    pub shipping: ShippingSnapshot,
    pub lines: Vec<NewLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineStatusChanged {
    pub order_id: OrderId,
    pub line_order_id: LineOrderId,
    pub from: LineStatus,
    pub to: LineStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderPlaced(OrderPlaced),
    LineStatusChanged(LineStatusChanged),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "order.placed",
            OrderEvent::LineStatusChanged(_) => "order.line_status_changed",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(e) => e.occurred_at,
            OrderEvent::LineStatusChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = OrderDomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderPlaced(e) => {
                self.order_id = e.order_id.clone();
                self.buyer_id = e.buyer_id;
                self.shipping_snapshot = e.shipping.clone();
                self.created_at = e.occurred_at;
                self.line_items = e
                    .lines
                    .iter()
                    .map(|l| LineItem {
                        line_order_id: l.line_order_id.clone(),
                        product_id: l.product_id,
                        quantity: l.quantity,
                        price_at_purchase: l.price_at_purchase,
                        status: LineStatus::Pending,
                        tracking_history: vec![TrackingEntry {
                            status: LineStatus::Pending,
                            timestamp: e.occurred_at,
                        }],
                    })
                    .collect();
                self.placed = true;
            }
            OrderEvent::LineStatusChanged(e) => {
                if let Some(line) = self
                    .line_items
                    .iter_mut()
                    .find(|l| l.line_order_id == e.line_order_id)
                {
                    // History timestamps never go backwards, even under clock skew.
                    let timestamp = line
                        .tracking_history
                        .last()
                        .map_or(e.occurred_at, |last| last.timestamp.max(e.occurred_at));
                    line.status = e.to;
                    line.tracking_history.push(TrackingEntry {
                        status: e.to,
                        timestamp,
                    });
                }
            }
        }

        self.order_status = rollup(self.line_items.iter().map(|l| l.status));
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            OrderCommand::ChangeLineStatus(cmd) => self.handle_change_line(cmd),
            OrderCommand::ChangeOrderStatus(cmd) => self.handle_change_order(cmd),
        }
    }
}

impl Order {
    fn ensure_placed(&self) -> Result<(), OrderDomainError> {
        if self.placed {
            Ok(())
        } else {
            Err(OrderDomainError::NotPlaced)
        }
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<OrderEvent>, OrderDomainError> {
        if self.placed {
            return Err(OrderDomainError::AlreadyPlaced);
        }
        if cmd.order_id != self.order_id {
            return Err(OrderDomainError::Validation("order_id mismatch".to_string()));
        }
        if cmd.lines.is_empty() {
            return Err(OrderDomainError::Validation(
                "order must contain at least one line".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(cmd.lines.len());
        for line in &cmd.lines {
            if line.quantity == 0 {
                return Err(OrderDomainError::Validation(format!(
                    "line {} must have a positive quantity",
                    line.line_order_id
                )));
            }
            if !seen.insert(&line.line_order_id) {
                return Err(OrderDomainError::Validation(format!(
                    "duplicate line id {}",
                    line.line_order_id
                )));
            }
        }

        cmd.shipping
            .validate()
            .map_err(|e| OrderDomainError::Validation(e.to_string()))?;

        Ok(vec![OrderEvent::OrderPlaced(OrderPlaced {
            order_id: cmd.order_id.clone(),
            buyer_id: cmd.buyer_id,
            shipping: cmd.shipping.clone(),
            lines: cmd.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_line(
        &self,
        cmd: &ChangeLineStatus,
    ) -> Result<Vec<OrderEvent>, OrderDomainError> {
        self.ensure_placed()?;

        let line = self
            .line(&cmd.line_order_id)
            .ok_or_else(|| OrderDomainError::LineNotFound(cmd.line_order_id.clone()))?;

        cmd.policy
            .check(line.status, cmd.status)
            .map_err(|reason| OrderDomainError::InvalidTransition {
                from: line.status,
                to: cmd.status,
                reason,
            })?;

        Ok(vec![OrderEvent::LineStatusChanged(LineStatusChanged {
            order_id: self.order_id.clone(),
            line_order_id: line.line_order_id.clone(),
            from: line.status,
            to: cmd.status,
            occurred_at: cmd.occurred_at,
        })])
    }

    /// All-or-nothing: either every open line accepts the move or none moves.
    /// Terminal lines are left as they are.
    fn handle_change_order(
        &self,
        cmd: &ChangeOrderStatus,
    ) -> Result<Vec<OrderEvent>, OrderDomainError> {
        self.ensure_placed()?;
        if cmd.order_id != self.order_id {
            return Err(OrderDomainError::Validation("order_id mismatch".to_string()));
        }

        let open: Vec<&LineItem> = self
            .line_items
            .iter()
            .filter(|l| !l.status.is_terminal())
            .collect();
        if open.is_empty() {
            return Err(OrderDomainError::AllLinesTerminal);
        }

        open.into_iter()
            .map(|line| {
                cmd.policy
                    .check(line.status, cmd.status)
                    .map_err(|reason| OrderDomainError::InvalidTransition {
                        from: line.status,
                        to: cmd.status,
                        reason,
                    })?;
                Ok(OrderEvent::LineStatusChanged(LineStatusChanged {
                    order_id: self.order_id.clone(),
                    line_order_id: line.line_order_id.clone(),
                    from: line.status,
                    to: cmd.status,
                    occurred_at: cmd.occurred_at,
                }))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{IdGenerator, SequentialIdGenerator};
    use chrono::Duration;

    fn shipping() -> ShippingSnapshot {
        ShippingSnapshot {
            name: "Asha Rao".to_string(),
            phone_no: "9845000000".to_string(),
            address_line: "12 MG Road".to_string(),
            state: "Karnataka".to_string(),
            city: "Bengaluru".to_string(),
            pincode: "560001".to_string(),
            country: None,
            landmark: Some("Near metro".to_string()),
            address_type: AddressType::Home,
        }
    }

    fn new_line(ids: &SequentialIdGenerator, order_id: &OrderId, quantity: u32, price: u64) -> NewLine {
        let product_id = ProductId::new();
        NewLine {
            line_order_id: ids.new_line_id(order_id, product_id),
            product_id,
            quantity,
            price_at_purchase: price,
        }
    }

    fn placed_order(line_count: usize) -> Order {
        let ids = SequentialIdGenerator::new();
        let order_id = ids.new_order_id();
        let lines = (0..line_count)
            .map(|i| new_line(&ids, &order_id, 1 + i as u32, 500))
            .collect();

        let mut order = Order::empty(order_id.clone());
        order
            .execute(&OrderCommand::PlaceOrder(PlaceOrder {
                order_id,
                buyer_id: UserId::new(),
                shipping: shipping(),
                lines,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        order
    }

    fn change_line(order: &mut Order, idx: usize, status: LineStatus) -> Result<(), OrderDomainError> {
        let line_order_id = order.line_items()[idx].line_order_id().clone();
        order
            .execute(&OrderCommand::ChangeLineStatus(ChangeLineStatus {
                line_order_id,
                status,
                policy: TransitionPolicy::Permissive,
                occurred_at: Utc::now(),
            }))
            .map(|_| ())
    }

    #[test]
    fn place_seeds_pending_lines_with_one_history_entry() {
        let order = placed_order(2);

        assert!(order.is_placed());
        assert_eq!(order.order_status(), OrderStatus::Pending);
        assert_eq!(order.version(), 1);
        for line in order.line_items() {
            assert_eq!(line.status(), LineStatus::Pending);
            assert_eq!(line.tracking_history().len(), 1);
            assert_eq!(line.tracking_history()[0].status, LineStatus::Pending);
            assert_eq!(line.tracking_history()[0].timestamp, order.created_at());
        }
    }

    #[test]
    fn place_rejects_empty_order() {
        let ids = SequentialIdGenerator::new();
        let order_id = ids.new_order_id();
        let order = Order::empty(order_id.clone());

        let err = order
            .handle(&OrderCommand::PlaceOrder(PlaceOrder {
                order_id,
                buyer_id: UserId::new(),
                shipping: shipping(),
                lines: vec![],
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, OrderDomainError::Validation(msg) if msg.contains("at least one line")));
    }

    #[test]
    fn place_rejects_duplicate_line_ids_and_zero_quantity() {
        let ids = SequentialIdGenerator::new();
        let order_id = ids.new_order_id();
        let order = Order::empty(order_id.clone());
        let line = new_line(&ids, &order_id, 1, 100);

        let dup = PlaceOrder {
            order_id: order_id.clone(),
            buyer_id: UserId::new(),
            shipping: shipping(),
            lines: vec![line.clone(), line.clone()],
            occurred_at: Utc::now(),
        };
        assert!(matches!(
            order.handle(&OrderCommand::PlaceOrder(dup)),
            Err(OrderDomainError::Validation(msg)) if msg.contains("duplicate")
        ));

        let zero = PlaceOrder {
            order_id,
            buyer_id: UserId::new(),
            shipping: shipping(),
            lines: vec![NewLine { quantity: 0, ..line }],
            occurred_at: Utc::now(),
        };
        assert!(matches!(
            order.handle(&OrderCommand::PlaceOrder(zero)),
            Err(OrderDomainError::Validation(msg)) if msg.contains("positive quantity")
        ));
    }

    #[test]
    fn cannot_place_twice() {
        let order = placed_order(1);
        let err = order
            .handle(&OrderCommand::PlaceOrder(PlaceOrder {
                order_id: order.order_id().clone(),
                buyer_id: order.buyer_id(),
                shipping: shipping(),
                lines: vec![],
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, OrderDomainError::AlreadyPlaced);
    }

    #[test]
    fn history_is_appended_in_request_order() {
        let mut order = placed_order(1);
        change_line(&mut order, 0, LineStatus::Confirmed).unwrap();
        change_line(&mut order, 0, LineStatus::Shipped).unwrap();

        let history = order.line_items()[0].tracking_history();
        let statuses: Vec<_> = history.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![LineStatus::Pending, LineStatus::Confirmed, LineStatus::Shipped]
        );
        assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(order.version(), 3);
    }

    #[test]
    fn skewed_clock_does_not_reorder_history() {
        let mut order = placed_order(1);
        let line_order_id = order.line_items()[0].line_order_id().clone();
        order
            .execute(&OrderCommand::ChangeLineStatus(ChangeLineStatus {
                line_order_id,
                status: LineStatus::Confirmed,
                policy: TransitionPolicy::Permissive,
                occurred_at: order.created_at() - Duration::hours(1),
            }))
            .unwrap();

        let history = order.line_items()[0].tracking_history();
        assert_eq!(history[1].timestamp, history[0].timestamp);
    }

    #[test]
    fn line_changes_roll_up_to_order() {
        let mut order = placed_order(2);
        change_line(&mut order, 0, LineStatus::Delivered).unwrap();
        change_line(&mut order, 1, LineStatus::Shipped).unwrap();
        assert_eq!(order.order_status(), OrderStatus::Shipped);

        change_line(&mut order, 1, LineStatus::Delivered).unwrap();
        assert_eq!(order.order_status(), OrderStatus::Delivered);
        assert!(order.is_terminal());
    }

    #[test]
    fn delivered_line_is_terminal() {
        let mut order = placed_order(1);
        change_line(&mut order, 0, LineStatus::Delivered).unwrap();

        let err = change_line(&mut order, 0, LineStatus::Cancelled).unwrap_err();
        match err {
            OrderDomainError::InvalidTransition { from, to, .. } => {
                assert_eq!(from, LineStatus::Delivered);
                assert_eq!(to, LineStatus::Cancelled);
            }
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
        assert_eq!(order.line_items()[0].tracking_history().len(), 2);
    }

    #[test]
    fn unknown_line_is_not_found() {
        let order = placed_order(1);
        let stray: LineOrderId = "#3b999999999999".parse().unwrap();
        let err = order
            .handle(&OrderCommand::ChangeLineStatus(ChangeLineStatus {
                line_order_id: stray.clone(),
                status: LineStatus::Confirmed,
                policy: TransitionPolicy::Permissive,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, OrderDomainError::LineNotFound(stray));
    }

    #[test]
    fn order_level_change_skips_terminal_lines() {
        let mut order = placed_order(3);
        change_line(&mut order, 0, LineStatus::Cancelled).unwrap();

        let events = order
            .execute(&OrderCommand::ChangeOrderStatus(ChangeOrderStatus {
                order_id: order.order_id().clone(),
                status: LineStatus::Shipped,
                policy: TransitionPolicy::Permissive,
                occurred_at: Utc::now(),
            }))
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(order.line_items()[0].status(), LineStatus::Cancelled);
        assert_eq!(order.line_items()[1].status(), LineStatus::Shipped);
        assert_eq!(order.order_status(), OrderStatus::Shipped);
    }

    #[test]
    fn order_level_change_is_all_or_nothing() {
        let mut order = placed_order(2);
        let first = order.line_items()[0].line_order_id().clone();
        order
            .execute(&OrderCommand::ChangeLineStatus(ChangeLineStatus {
                line_order_id: first,
                status: LineStatus::Shipped,
                policy: TransitionPolicy::Monotonic,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        let before = order.clone();

        // Line 0 is Shipped, line 1 Pending: Confirmed is backwards for line 0.
        let err = order
            .execute(&OrderCommand::ChangeOrderStatus(ChangeOrderStatus {
                order_id: order.order_id().clone(),
                status: LineStatus::Confirmed,
                policy: TransitionPolicy::Monotonic,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();

        assert!(matches!(err, OrderDomainError::InvalidTransition { .. }));
        assert_eq!(order, before);
    }

    #[test]
    fn order_level_change_on_finished_order_is_rejected() {
        let mut order = placed_order(2);
        change_line(&mut order, 0, LineStatus::Delivered).unwrap();
        change_line(&mut order, 1, LineStatus::Cancelled).unwrap();
        assert_eq!(order.order_status(), OrderStatus::PartiallyDelivered);

        let err = order
            .handle(&OrderCommand::ChangeOrderStatus(ChangeOrderStatus {
                order_id: order.order_id().clone(),
                status: LineStatus::Delivered,
                policy: TransitionPolicy::Permissive,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, OrderDomainError::AllLinesTerminal);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let order = placed_order(1);
        let before = order.clone();
        let cmd = OrderCommand::ChangeLineStatus(ChangeLineStatus {
            line_order_id: order.line_items()[0].line_order_id().clone(),
            status: LineStatus::Confirmed,
            policy: TransitionPolicy::Permissive,
            occurred_at: Utc::now(),
        });

        let e1 = order.handle(&cmd).unwrap();
        let e2 = order.handle(&cmd).unwrap();

        assert_eq!(order, before);
        assert_eq!(e1, e2);
    }

    #[test]
    fn document_round_trip_keeps_order_placed() {
        let order = placed_order(2);
        let json = serde_json::to_value(&order).unwrap();
        assert!(json.get("orderId").is_some());
        assert!(json["lineItems"][0].get("trackingHistory").is_some());

        let loaded: Order = serde_json::from_value(json).unwrap();
        assert!(loaded.is_placed());
        assert_eq!(loaded, order);
    }

    #[test]
    fn totals_use_price_at_purchase() {
        let order = placed_order(2);
        // quantities 1 and 2 at 500 each
        assert_eq!(order.total_amount(), 1_500);
    }
}
