//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store/bus wiring, notification workers, seed loading
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request DTOs and JSON mapping helpers
//! - `errors.rs`: error kind to status code, consistent error bodies

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::config::ApiConfig;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(cfg: &ApiConfig) -> anyhow::Result<Router> {
    let services = Arc::new(services::build_services(cfg).await?);
    Ok(router(services))
}

/// Router over already-built services. Tests use this to seed data before
/// serving.
pub fn router(services: Arc<services::AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router().layer(Extension(services)))
        .layer(ServiceBuilder::new())
}
