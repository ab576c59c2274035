use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::app::AppState;
use crate::scheduler;

#[derive(Debug, Deserialize)]
pub struct ResetParams {
    #[serde(default)]
    pub import_skills: bool,
}

#[derive(Debug, Deserialize)]
pub struct ImportChannelRequest {
    pub channel_id: String,
}

/// POST /database/reset[?import_skills=true] — drop and recreate tables,
/// optionally re-seeding the taxonomy. 202 + background task.
pub async fn reset_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ResetParams>,
) -> (StatusCode, Json<Value>) {
    let import_skills = params.import_skills;
    let task_state = state.clone();
    spawn_operation(state, "database_reset", async move {
        reset_database(&task_state, import_skills)
    });
    accepted("database_reset")
}

/// POST /slack/reimport — trigger a full ingestion run now.
pub async fn reimport_handler(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let task_state = state.clone();
    spawn_operation(state, "slack_reimport", async move {
        scheduler::run_ingestion(&task_state).await
    });
    accepted("slack_reimport")
}

/// POST /import/channel — backfill a single channel.
pub async fn import_channel_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ImportChannelRequest>,
) -> (StatusCode, Json<Value>) {
    let task_state = state.clone();
    spawn_operation(state, "channel_import", async move {
        scheduler::import_channel(&task_state, &request.channel_id)
            .await
            .map(|_| ())
    });
    accepted("channel_import")
}

/// POST /database/reset-and-reimport — reset, re-seed skills, then run a
/// full ingestion.
pub async fn reset_and_reimport_handler(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<Value>) {
    let task_state = state.clone();
    spawn_operation(state, "reset_and_reimport", async move {
        reset_database(&task_state, true)?;
        scheduler::run_ingestion(&task_state).await
    });
    accepted("reset_and_reimport")
}

fn reset_database(state: &AppState, import_skills: bool) -> anyhow::Result<()> {
    state.store.reset()?;
    if import_skills {
        let skills = truffle_taxonomy::loader::load_dir(&state.config.ingestion.skills_dir)?;
        let count = state.store.upsert_skills(&skills)?;
        info!(count, "re-imported skills after reset");
    }
    Ok(())
}

fn accepted(operation: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "operation": operation })),
    )
}

/// Run a named operation in the background, tracking it in the state's
/// active-operations map so `GET /` shows what is in flight.
fn spawn_operation<F>(state: Arc<AppState>, name: &'static str, fut: F)
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    state
        .active_operations
        .insert(name.to_string(), chrono::Utc::now().to_rfc3339());
    tokio::spawn(async move {
        match fut.await {
            Ok(()) => info!(operation = name, "background operation finished"),
            Err(e) => error!(operation = name, "background operation failed: {e}"),
        }
        state.active_operations.remove(name);
    });
}
