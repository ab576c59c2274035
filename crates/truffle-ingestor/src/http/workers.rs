use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /workers/stats
pub async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "workers": state.pool.stats(),
        "manager_running": state.pool.is_running(),
    }))
}
