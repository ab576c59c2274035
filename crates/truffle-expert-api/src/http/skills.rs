use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /skills — full taxonomy with per-skill expert counts and the
/// domain list.
pub async fn skills_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let skills = state.store.all_skills().unwrap_or_default();
    let domains = state.store.skill_domains().unwrap_or_default();
    let expert_counts = state.store.expert_counts_by_skill().unwrap_or_default();

    let listed: Vec<Value> = skills
        .iter()
        .map(|skill| {
            json!({
                "key": skill.skill_key,
                "name": skill.name,
                "domain": skill.domain,
                "aliases": skill.aliases,
                "expert_count": expert_counts.get(&skill.skill_key).copied().unwrap_or(0),
            })
        })
        .collect();

    Json(json!({
        "skills": listed,
        "total_count": listed.len(),
        "domains": domains,
    }))
}
