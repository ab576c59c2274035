use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /scores/stats — evidence vs aggregated score totals.
pub async fn stats_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let stats = state
        .store
        .aggregation_stats()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let ratio = if stats.total_evidence > 0 {
        stats.total_scores as f64 / stats.total_evidence as f64
    } else {
        0.0
    };
    Ok(Json(json!({
        "total_evidence": stats.total_evidence,
        "total_scores": stats.total_scores,
        "users_with_scores": stats.users_with_scores,
        "aggregation_ratio": ratio,
    })))
}
