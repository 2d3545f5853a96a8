use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns a static capability descriptor plus the active tool mode.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "ok",
        "adapter": "responses-to-chat",
        "tools": true,
        "fc_mode": config.upstream.fc_mode,
        "default_model": config.upstream.default_model,
    }))
}
