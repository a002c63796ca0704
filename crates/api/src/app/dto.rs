use serde::Deserialize;

use storefront_core::{ProductId, UserId};
use storefront_infra::directory::BuyerProfile;
use storefront_infra::{LineTransition, OrderError, PlaceOrderRequest, RequestedLine};
use storefront_inventory::StockEntry;
use storefront_orders::{LineOrderId, LineStatus, Order, OrderId, ShippingSnapshot};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

/// Ids arrive as strings so a malformed one can be reported as a 400 with
/// the usual error body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderBody {
    pub buyer_id: String,
    #[serde(default)]
    pub lines: Vec<OrderLineBody>,
    #[serde(default)]
    pub shipping: Option<ShippingSnapshot>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineBody {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: String,
}

impl PlaceOrderBody {
    pub fn into_request(self) -> Result<PlaceOrderRequest, axum::response::Response> {
        let buyer_id = parse_user_id(&self.buyer_id)?;
        let lines = self
            .lines
            .into_iter()
            .map(|l| {
                Ok(RequestedLine {
                    product_id: parse_product_id(&l.product_id)?,
                    quantity: l.quantity,
                })
            })
            .collect::<Result<Vec<_>, axum::response::Response>>()?;

        Ok(PlaceOrderRequest {
            buyer_id,
            lines,
            shipping: self.shipping,
        })
    }
}

/// Startup data for a dev instance.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedData {
    #[serde(default)]
    pub products: Vec<SeedProduct>,
    #[serde(default)]
    pub buyers: Vec<BuyerProfile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedProduct {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: u64,
}

impl From<SeedProduct> for StockEntry {
    fn from(p: SeedProduct) -> Self {
        StockEntry::new(p.product_id, p.quantity, p.unit_price)
    }
}

// -------------------------
// Path parsing
// -------------------------

pub fn parse_user_id(raw: &str) -> Result<UserId, axum::response::Response> {
    raw.parse().map_err(|_| errors::invalid_id("buyer id", raw))
}

pub fn parse_product_id(raw: &str) -> Result<ProductId, axum::response::Response> {
    raw.parse().map_err(|_| errors::invalid_id("product id", raw))
}

pub fn parse_order_id(raw: &str) -> Result<OrderId, axum::response::Response> {
    raw.parse().map_err(|_| errors::invalid_id("order id", raw))
}

pub fn parse_line_id(raw: &str) -> Result<LineOrderId, axum::response::Response> {
    raw.parse().map_err(|_| errors::invalid_id("line order id", raw))
}

pub fn parse_status(raw: &str) -> Result<LineStatus, axum::response::Response> {
    raw.parse::<LineStatus>()
        .map_err(|e| errors::order_error_to_response(OrderError::InvalidStatus(e.to_string())))
}

// -------------------------
// Response mapping
// -------------------------

pub fn order_list_json(orders: Vec<Order>) -> serde_json::Value {
    serde_json::json!({
        "count": orders.len(),
        "orders": orders,
    })
}

pub fn line_transition_json(t: LineTransition) -> serde_json::Value {
    serde_json::json!({
        "orderId": t.order_id,
        "orderStatus": t.order_status,
        "trackingHistory": t.line.tracking_history(),
        "line": t.line,
    })
}

pub fn stock_to_json(entry: &StockEntry) -> serde_json::Value {
    serde_json::json!({
        "productId": entry.product_id().to_string(),
        "quantity": entry.quantity(),
        "available": entry.available(),
        "unitPrice": entry.unit_price(),
    })
}
