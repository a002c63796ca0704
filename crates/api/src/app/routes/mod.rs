use axum::{
    Router,
    routing::{get, patch},
};

pub mod inventory;
pub mod orders;
pub mod system;

/// Router for every order-core endpoint.
pub fn router() -> Router {
    Router::new()
        .route("/orders", get(orders::list_orders).post(orders::place_order))
        .route("/orders/stream", get(system::stream))
        .route("/orders/:order_id", get(orders::get_order))
        .route("/orders/:order_id/status", patch(orders::update_order_status))
        .route(
            "/orders/lines/:line_order_id/status",
            patch(orders::update_line_status),
        )
        .route("/users/:buyer_id/orders", get(orders::list_buyer_orders))
        .nest("/inventory", inventory::router())
}
