use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::app::AppState;

/// GET /health
pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "truffle-bot" }))
}

/// GET /debug/stats — event counters and skill-cache freshness.
pub async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "events_received": state.events_received.load(Ordering::Relaxed),
        "queries_handled": state.queries_handled.load(Ordering::Relaxed),
        "replies_sent": state.replies_sent.load(Ordering::Relaxed),
        "skill_cache": state.skills.stats(),
    }))
}
