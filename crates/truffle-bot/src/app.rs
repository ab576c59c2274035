use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use truffle_core::TruffleConfig;
use truffle_slack::SlackClient;

use crate::cache::SkillCache;
use crate::client::ExpertApiClient;
use crate::query::QueryParser;

pub struct AppState {
    pub config: TruffleConfig,
    pub api: Arc<ExpertApiClient>,
    pub skills: Arc<SkillCache>,
    pub slack: Arc<SlackClient>,
    pub parser: QueryParser,
    pub events_received: AtomicU64,
    pub queries_handled: AtomicU64,
    pub replies_sent: AtomicU64,
}

impl AppState {
    pub fn new(
        config: TruffleConfig,
        api: Arc<ExpertApiClient>,
        skills: Arc<SkillCache>,
        slack: Arc<SlackClient>,
    ) -> Self {
        Self {
            config,
            api,
            skills,
            slack,
            parser: QueryParser::new(),
            events_received: AtomicU64::new(0),
            queries_handled: AtomicU64::new(0),
            replies_sent: AtomicU64::new(0),
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::debug::health_handler))
        .route("/slack/events", post(crate::http::events::events_handler))
        .route("/slack/oauth", get(crate::http::oauth::oauth_handler))
        .route("/debug/stats", get(crate::http::debug::stats_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
