use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};

use modelrelay_common::{ChatCompletionRequest, ChatCompletionResponse, Priority};

use crate::billing::ChargeOutcome;
use crate::gateway::GatewayError;
use crate::AppState;

/// POST /v1/chat/completions - OpenAI-compatible chat endpoint.
///
/// Optional headers: `x-priority` (interactive|batch), `x-deadline-ms`,
/// `x-user-id` (billing account; auth lives in front of this service).
async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<([(&'static str, String); 2], Json<ChatCompletionResponse>), GatewayError> {
    let model = request
        .model
        .clone()
        .ok_or_else(|| GatewayError::InvalidRequest("missing 'model' field".to_string()))?;

    let priority = match header_str(&headers, "x-priority") {
        Some(raw) => Priority::parse(raw)
            .ok_or_else(|| GatewayError::InvalidRequest(format!("unknown priority '{raw}'")))?,
        None => Priority::default(),
    };

    let deadline = match header_str(&headers, "x-deadline-ms") {
        Some(raw) => {
            let ms: u64 = raw.parse().map_err(|_| {
                GatewayError::InvalidRequest(format!("invalid x-deadline-ms '{raw}'"))
            })?;
            Duration::from_millis(ms).min(state.config.execution.max_deadline())
        }
        None => state.config.execution.default_deadline(),
    };

    let outcome = state
        .gateway
        .route(&model, request, priority, deadline)
        .await?;

    // Credit charging is strictly a post-success concern of this layer;
    // the gateway stays agnostic to pricing.
    if let Some(usage) = &outcome.response.usage {
        let user = header_str(&headers, "x-user-id").unwrap_or("anonymous");
        let charged = state
            .ledger
            .charge_atomic(user, usage.total_tokens as u64)
            .await;
        if charged == ChargeOutcome::InsufficientFunds {
            tracing::warn!(user = %user, tokens = usage.total_tokens, "charge failed after completion");
        }
    }

    Ok((
        [
            ("x-instance-id", outcome.instance_id.clone()),
            ("x-attempts", outcome.attempts.to_string()),
        ],
        Json(outcome.response),
    ))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(state)
}
