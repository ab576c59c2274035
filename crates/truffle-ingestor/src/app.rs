use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use dashmap::DashMap;

use truffle_core::TruffleConfig;
use truffle_pipeline::WorkerPool;
use truffle_queue::TaskQueue;
use truffle_slack::SlackClient;
use truffle_store::Store;

/// Central shared state — passed as Arc<AppState> to all Axum handlers
/// and to the ingestion scheduler.
pub struct AppState {
    pub config: TruffleConfig,
    pub store: Arc<Store>,
    pub queue: Arc<TaskQueue>,
    pub pool: Arc<WorkerPool>,
    pub slack: Arc<SlackClient>,
    /// Serialises ingestion runs: the scheduler and the operational
    /// reimport endpoints try-lock this so a run never overlaps itself.
    pub ingest_lock: tokio::sync::Mutex<()>,
    /// Background operations currently in flight: name -> started_at.
    pub active_operations: DashMap<String, String>,
}

impl AppState {
    pub fn new(
        config: TruffleConfig,
        store: Arc<Store>,
        queue: Arc<TaskQueue>,
        pool: Arc<WorkerPool>,
        slack: Arc<SlackClient>,
    ) -> Self {
        Self {
            config,
            store,
            queue,
            pool,
            slack,
            ingest_lock: tokio::sync::Mutex::new(()),
            active_operations: DashMap::new(),
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(crate::http::status::root_handler))
        .route("/health", get(crate::http::status::health_handler))
        .route("/queue/stats", get(crate::http::queue::stats_handler))
        .route("/queue/clear", post(crate::http::queue::clear_handler))
        .route("/workers/stats", get(crate::http::workers::stats_handler))
        .route("/scores/stats", get(crate::http::scores::stats_handler))
        .route("/database/reset", post(crate::http::admin::reset_handler))
        .route(
            "/database/reset-and-reimport",
            post(crate::http::admin::reset_and_reimport_handler),
        )
        .route("/slack/reimport", post(crate::http::admin::reimport_handler))
        .route(
            "/import/channel",
            post(crate::http::admin::import_channel_handler),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
