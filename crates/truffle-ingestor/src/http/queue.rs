use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /queue/stats
pub async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!(state.queue.stats()))
}

/// POST /queue/clear — drop the completed-task archive.
pub async fn clear_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let cleared = state.queue.clear_completed();
    Json(json!({ "cleared": cleared }))
}
