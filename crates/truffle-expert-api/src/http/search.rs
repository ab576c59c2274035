use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use truffle_store::{ExpertHit, ExpertQuery, Store};

use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub skills: Vec<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub min_confidence: f64,
    #[serde(default = "default_true")]
    pub include_confidence: bool,
}

fn default_limit() -> i64 {
    10
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct ExpertResult {
    pub external_id: String,
    pub display_name: String,
    pub skills: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    pub evidence_count: i64,
    pub total_messages: i64,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<ExpertResult>,
    pub total_found: usize,
    pub processing_time_ms: f64,
    pub search_strategy: String,
}

/// POST /experts/search — resolve the requested skill strings to canonical
/// keys (exact name/key match first, fuzzy fallback), run the ranked
/// query, and fold per-(user, skill) rows into per-user results.
///
/// Storage failures return an empty result list rather than an error so
/// the bot stays responsive.
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Json<SearchResponse> {
    let started = Instant::now();
    let limit = request.limit.clamp(1, 50);
    let min_confidence = request.min_confidence.clamp(0.0, 1.0);

    info!(skills = ?request.skills, limit, "expert search");

    let (skill_keys, strategy) = resolve_skill_keys(&state.store, &request.skills);
    if skill_keys.is_empty() {
        return Json(SearchResponse {
            results: Vec::new(),
            total_found: 0,
            processing_time_ms: elapsed_ms(started),
            search_strategy: "no_match".to_string(),
        });
    }

    let query = ExpertQuery {
        skill_keys: skill_keys.clone(),
        min_confidence,
        // Over-fetch so the per-user fold can still fill the page
        limit: limit * skill_keys.len() as i64,
        ..ExpertQuery::default()
    };

    let hits = match state.store.search_experts(&query) {
        Ok(hits) => hits,
        Err(e) => {
            warn!("expert search failed, returning empty results: {e}");
            return Json(SearchResponse {
                results: Vec::new(),
                total_found: 0,
                processing_time_ms: elapsed_ms(started),
                search_strategy: strategy,
            });
        }
    };

    let mut results = fold_by_user(hits, request.include_confidence);
    let total_found = results.len();
    results.truncate(limit as usize);

    Json(SearchResponse {
        results,
        total_found,
        processing_time_ms: elapsed_ms(started),
        search_strategy: strategy,
    })
}

/// Exact name/key matches win; only when no requested skill resolves at
/// all does the fuzzy pass run.
fn resolve_skill_keys(store: &Store, skills: &[String]) -> (Vec<String>, String) {
    let mut keys: Vec<String> = Vec::new();
    for skill in skills {
        for key in store.find_skill_keys_by_name(skill).unwrap_or_default() {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    if !keys.is_empty() {
        return (keys, "name_match".to_string());
    }

    for skill in skills {
        for key in store.find_skill_keys_fuzzy(skill).unwrap_or_default() {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    (keys, "fuzzy_match".to_string())
}

/// Merge per-(user, skill) rows into one entry per user: all matched
/// skills, the average score, summed evidence.
fn fold_by_user(hits: Vec<ExpertHit>, include_confidence: bool) -> Vec<ExpertResult> {
    let mut order: Vec<String> = Vec::new();
    let mut by_user: HashMap<String, (String, Vec<String>, f64, i64)> = HashMap::new();

    for hit in hits {
        let entry = by_user
            .entry(hit.external_id.clone())
            .or_insert_with(|| {
                order.push(hit.external_id.clone());
                (hit.display_name.clone(), Vec::new(), 0.0, 0)
            });
        entry.1.push(hit.skill_key);
        entry.2 += hit.expertise_score;
        entry.3 += hit.evidence_count;
    }

    let mut results: Vec<ExpertResult> = order
        .into_iter()
        .filter_map(|external_id| {
            let (display_name, skills, score_sum, evidence) = by_user.remove(&external_id)?;
            let avg = score_sum / skills.len() as f64;
            Some(ExpertResult {
                external_id,
                display_name,
                skills,
                confidence_score: include_confidence.then_some(avg),
                evidence_count: evidence,
                total_messages: evidence,
            })
        })
        .collect();

    results.sort_by(|a, b| {
        let sa = a.confidence_score.unwrap_or(0.0);
        let sb = b.confidence_score.unwrap_or(0.0);
        sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
    });
    results
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
