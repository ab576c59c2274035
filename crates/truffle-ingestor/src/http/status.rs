use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET / — service status with queue totals.
pub async fn root_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let active: Vec<String> = state
        .active_operations
        .iter()
        .map(|entry| entry.key().clone())
        .collect();

    Json(json!({
        "service": "Truffle Slack Ingestion",
        "status": "running",
        "workers_active": state.pool.is_running(),
        "queue_stats": state.queue.stats(),
        "active_operations": active,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// GET /health — liveness probe plus the settings operators ask about.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "workers_running": state.pool.is_running(),
        "settings": {
            "extract_skills": state.config.pipeline.extract_skills,
            "classify_expertise": state.config.pipeline.classify_expertise,
            "ingestion_interval_secs": state.config.ingestion.interval_secs,
        },
    }))
}
