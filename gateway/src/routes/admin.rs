//! Fleet management endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};

use modelrelay_common::InstanceDescriptor;

use crate::gateway::{GatewayError, GatewayStatus};
use crate::AppState;

/// GET /admin/status - instance snapshots and queue depth.
async fn status(State(state): State<Arc<AppState>>) -> Json<GatewayStatus> {
    Json(state.gateway.status().await)
}

/// POST /admin/instances - register an instance.
async fn register_instance(
    State(state): State<Arc<AppState>>,
    Json(descriptor): Json<InstanceDescriptor>,
) -> Result<StatusCode, GatewayError> {
    state.gateway.register(descriptor).await?;
    Ok(StatusCode::CREATED)
}

/// DELETE /admin/instances/:id - deregister an instance.
async fn deregister_instance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, GatewayError> {
    state.gateway.deregister(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /admin/instances/:id/drain - stop routing to an instance while
/// in-flight requests complete.
async fn drain_instance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, GatewayError> {
    state.gateway.drain(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/instances", post(register_instance))
        .route("/instances/:id", delete(deregister_instance))
        .route("/instances/:id/drain", post(drain_instance))
        .with_state(state)
}
