use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use truffle_core::TruffleConfig;
use truffle_store::Store;

pub struct AppState {
    pub config: TruffleConfig,
    pub store: Arc<Store>,
}

impl AppState {
    pub fn new(config: TruffleConfig, store: Arc<Store>) -> Self {
        Self { config, store }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(crate::http::health::root_handler))
        .route("/health", get(crate::http::health::health_handler))
        .route("/experts/search", post(crate::http::search::search_handler))
        .route("/skills", get(crate::http::skills::skills_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
