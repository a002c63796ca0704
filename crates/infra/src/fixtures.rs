//! Shared builders for infra tests.

use chrono::{DateTime, TimeZone, Utc};

use storefront_core::{Aggregate, ProductId, UserId};
use storefront_orders::{
    AddressType, ChangeLineStatus, IdGenerator, LineStatus, NewLine, Order, OrderCommand, OrderId,
    PlaceOrder, ShippingSnapshot, TransitionPolicy,
};

pub fn shipping() -> ShippingSnapshot {
    ShippingSnapshot {
        name: "Asha Rao".to_string(),
        phone_no: "9845000000".to_string(),
        address_line: "12 MG Road".to_string(),
        state: "Karnataka".to_string(),
        city: "Bengaluru".to_string(),
        pincode: "560001".to_string(),
        country: Some("India".to_string()),
        landmark: None,
        address_type: AddressType::Home,
    }
}

/// Fixed instant `secs` seconds into 2024-01-01.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs)
}

pub fn placed_order(ids: &dyn IdGenerator, buyer: UserId, lines: usize) -> Order {
    placed_order_at(ids, buyer, lines, Utc::now())
}

pub fn placed_order_at(
    ids: &dyn IdGenerator,
    buyer: UserId,
    lines: usize,
    created_at: DateTime<Utc>,
) -> Order {
    let order_id = ids.new_order_id();
    build(ids, order_id, buyer, lines, created_at)
}

pub fn placed_order_with_order_id(
    ids: &dyn IdGenerator,
    order_id: OrderId,
    buyer: UserId,
    lines: usize,
) -> Order {
    build(ids, order_id, buyer, lines, Utc::now())
}

fn build(
    ids: &dyn IdGenerator,
    order_id: OrderId,
    buyer: UserId,
    lines: usize,
    created_at: DateTime<Utc>,
) -> Order {
    let lines = (0..lines)
        .map(|_| {
            let product_id = ProductId::new();
            NewLine {
                line_order_id: ids.new_line_id(&order_id, product_id),
                product_id,
                quantity: 1,
                price_at_purchase: 1_000,
            }
        })
        .collect();

    let mut order = Order::empty(order_id.clone());
    order
        .execute(&OrderCommand::PlaceOrder(PlaceOrder {
            order_id,
            buyer_id: buyer,
            shipping: shipping(),
            lines,
            occurred_at: created_at,
        }))
        .unwrap();
    order
}

pub fn move_line(order: &mut Order, idx: usize, status: LineStatus) {
    let line_order_id = order.line_items()[idx].line_order_id().clone();
    order
        .execute(&OrderCommand::ChangeLineStatus(ChangeLineStatus {
            line_order_id,
            status,
            policy: TransitionPolicy::Permissive,
            occurred_at: Utc::now(),
        }))
        .unwrap();
}
