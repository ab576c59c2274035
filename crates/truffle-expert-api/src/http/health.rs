use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET / — service banner.
pub async fn root_handler() -> Json<Value> {
    Json(json!({
        "service": "Truffle Expert Search API",
        "status": "running",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// GET /health — database connectivity and table totals.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    match state.store.health_totals() {
        Ok(totals) => Json(json!({
            "status": "healthy",
            "service": "expert_api",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "database_connected": true,
            "total_experts": totals.scores,
            "total_skills": totals.skills,
            "total_users": totals.users,
            "total_evidence": totals.evidence,
        })),
        Err(e) => Json(json!({
            "status": "degraded",
            "service": "expert_api",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "database_connected": false,
            "error": e.to_string(),
            "total_experts": 0,
            "total_skills": 0,
        })),
    }
}
