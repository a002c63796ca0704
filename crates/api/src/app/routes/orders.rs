use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

/// POST /orders
///
/// Reserves stock for every line and persists the order. Responds 201 with
/// the stored order; 400 for bad input, 404 for an unknown buyer or product,
/// 409 when a line is out of stock.
pub async fn place_order(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::PlaceOrderBody>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let request = match body.into_request() {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    match services.place_order(request).await {
        Ok(order) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "order": order })),
        )
            .into_response(),
        Err(e) => errors::order_error_to_response(e),
    }
}

/// GET /orders
pub async fn list_orders(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.list_orders().await {
        Ok(orders) => (StatusCode::OK, Json(dto::order_list_json(orders))).into_response(),
        Err(e) => errors::order_error_to_response(e),
    }
}

/// GET /orders/{orderId}
pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(order_id): Path<String>,
) -> axum::response::Response {
    let order_id = match dto::parse_order_id(&order_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.get_order(&order_id).await {
        Ok(order) => (StatusCode::OK, Json(serde_json::json!({ "order": order }))).into_response(),
        Err(e) => errors::order_error_to_response(e),
    }
}

/// GET /users/{buyerId}/orders
pub async fn list_buyer_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Path(buyer_id): Path<String>,
) -> axum::response::Response {
    let buyer_id = match dto::parse_user_id(&buyer_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.list_orders_by_buyer(buyer_id).await {
        Ok(orders) => (StatusCode::OK, Json(dto::order_list_json(orders))).into_response(),
        Err(e) => errors::order_error_to_response(e),
    }
}

/// PATCH /orders/lines/{lineOrderId}/status
pub async fn update_line_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(line_order_id): Path<String>,
    body: Result<Json<dto::StatusBody>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let line_order_id = match dto::parse_line_id(&line_order_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let status = match dto::parse_status(&body.status) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match services.transition_line(&line_order_id, status).await {
        Ok(t) => (StatusCode::OK, Json(dto::line_transition_json(t))).into_response(),
        Err(e) => errors::order_error_to_response(e),
    }
}

/// PATCH /orders/{orderId}/status
///
/// Moves every line that is not yet delivered or cancelled.
pub async fn update_order_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(order_id): Path<String>,
    body: Result<Json<dto::StatusBody>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let order_id = match dto::parse_order_id(&order_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let status = match dto::parse_status(&body.status) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match services.transition_order(&order_id, status).await {
        Ok(order) => (StatusCode::OK, Json(serde_json::json!({ "order": order }))).into_response(),
        Err(e) => errors::order_error_to_response(e),
    }
}
