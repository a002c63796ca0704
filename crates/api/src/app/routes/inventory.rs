use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/:product_id", get(get_stock))
}

/// GET /inventory/{productId}
pub async fn get_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Path(product_id): Path<String>,
) -> axum::response::Response {
    let product_id = match dto::parse_product_id(&product_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.stock(product_id).await {
        Ok(entry) => (
            StatusCode::OK,
            Json(serde_json::json!({ "stock": dto::stock_to_json(&entry) })),
        )
            .into_response(),
        Err(e) => errors::order_error_to_response(e),
    }
}
