//! OpenAI-compatible /v1/models endpoint.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::AppState;

/// Model entry in the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelObject {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

/// Response from /v1/models endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub object: String,
    pub data: Vec<ModelObject>,
}

/// GET /v1/models - distinct models served by healthy instances.
async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    let status = state.gateway.status().await;
    let mut models: Vec<String> = status
        .instances
        .iter()
        .filter(|i| i.status.is_routable())
        .map(|i| i.model.clone())
        .collect();
    models.sort();
    models.dedup();

    Json(ModelsResponse {
        object: "list".to_string(),
        data: models
            .into_iter()
            .map(|id| ModelObject {
                id,
                object: "model".to_string(),
                created: 0,
                owned_by: "modelrelay".to_string(),
            })
            .collect(),
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/models", get(list_models))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_models_response_serialization() {
        let response = ModelsResponse {
            object: "list".to_string(),
            data: vec![ModelObject {
                id: "llama3:8b".to_string(),
                object: "model".to_string(),
                created: 0,
                owned_by: "modelrelay".to_string(),
            }],
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("llama3:8b"));
        assert!(json.contains(r#""object":"list""#));
    }
}
