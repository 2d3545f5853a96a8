use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use serde_json::{json, Value};

use crate::state::AppState;

use super::common::{json_response, ok_json_response};

/// Pass the upstream model list through, or answer with a single-entry list
/// naming the default model when the upstream cannot be reached.
pub async fn handler(State(state): State<Arc<AppState>>, headers: &HeaderMap) -> Response {
    match state.transport.fetch_models(headers).await {
        Ok(body) => ok_json_response(body),
        Err(err) => {
            tracing::warn!("model listing unavailable, serving fallback: {err}");
            json_response(&fallback_models(&state.config.upstream.default_model))
        }
    }
}

fn fallback_models(default_model: &str) -> Value {
    json!({
        "object": "list",
        "data": [
            {
                "id": default_model,
                "object": "model",
                "owned_by": "upstream",
            }
        ]
    })
}
