use std::sync::Arc;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use modelrelay_common::InstanceStatus;

use crate::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let status = state.gateway.status().await;
    let mut body = format!(
        "# HELP modelrelay_up Whether the service is up\n\
         # TYPE modelrelay_up gauge\n\
         modelrelay_up 1\n\
         # HELP modelrelay_queue_depth Pending requests in the queue\n\
         # TYPE modelrelay_queue_depth gauge\n\
         modelrelay_queue_depth {}\n",
        status.queue_depth
    );

    body.push_str(
        "# HELP modelrelay_instance_load Current in-flight requests per instance\n\
         # TYPE modelrelay_instance_load gauge\n",
    );
    for instance in &status.instances {
        body.push_str(&format!(
            "modelrelay_instance_load{{instance=\"{}\",model=\"{}\"}} {}\n",
            instance.id, instance.model, instance.current_load
        ));
    }

    body.push_str(
        "# HELP modelrelay_instance_healthy Whether the instance is routable\n\
         # TYPE modelrelay_instance_healthy gauge\n",
    );
    for instance in &status.instances {
        body.push_str(&format!(
            "modelrelay_instance_healthy{{instance=\"{}\"}} {}\n",
            instance.id,
            (instance.status == InstanceStatus::Healthy) as u8
        ));
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}
