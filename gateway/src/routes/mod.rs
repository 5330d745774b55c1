//! HTTP surface of the gateway.

pub mod admin;
pub mod chat;
pub mod health;
pub mod models;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Assemble the full application router.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(health::router(state.clone()))
        .merge(chat::router(state.clone()))
        .merge(models::router(state.clone()))
        .nest("/admin", admin::router(state))
        .layer(axum::middleware::from_fn(crate::logging::request_logger))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
