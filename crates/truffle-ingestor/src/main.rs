use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use truffle_classifier::{ExpertiseClassifier, OpenAiClassifier, UnconfiguredClassifier};
use truffle_core::TruffleConfig;
use truffle_pipeline::{MessageProcessor, WorkerPool};
use truffle_queue::TaskQueue;
use truffle_slack::SlackClient;
use truffle_store::Store;
use truffle_taxonomy::SkillMatcher;

mod app;
mod http;
mod scheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "truffle_ingestor=info,tower_http=debug".into()),
        )
        .init();

    let config_path = std::env::var("TRUFFLE_CONFIG").ok();
    let config = TruffleConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        TruffleConfig::default()
    });

    let store = Arc::new(Store::open(&config.database.path)?);
    auto_import_skills(&store, &config.ingestion.skills_dir);

    let matcher = Arc::new(SkillMatcher::new(store.taxonomy_skills()?));
    info!(skills = matcher.skill_count(), "skill matcher ready");

    // Missing credential degrades to per-task classification errors
    // rather than blocking startup
    let classifier: Arc<dyn ExpertiseClassifier> =
        match OpenAiClassifier::from_config(&config.classifier) {
            Ok(c) => Arc::new(c),
            Err(e) => {
                warn!("classifier unavailable, running degraded: {e}");
                Arc::new(UnconfiguredClassifier)
            }
        };

    let queue = Arc::new(TaskQueue::new());
    let slack = Arc::new(SlackClient::new(&config.slack));
    let processor = Arc::new(MessageProcessor::new(
        matcher,
        store.clone(),
        classifier,
        config.pipeline.clone(),
    ));
    let pool = Arc::new(WorkerPool::new(
        queue.clone(),
        processor,
        config.pipeline.workers,
    ));
    pool.start();

    let bind = config.ingestor.host.clone();
    let port = config.ingestor.port;
    let state = Arc::new(app::AppState::new(config, store, queue, pool.clone(), slack));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(scheduler::run(state.clone(), shutdown_rx));

    let router = app::build_router(state);
    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("Truffle ingestor listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    let _ = shutdown_tx.send(true);
    pool.stop().await;
    Ok(())
}

/// Seed the skills table from taxonomy JSON files when it is empty.
/// Failures log and continue; the service runs degraded without skills.
fn auto_import_skills(store: &Store, skills_dir: &str) {
    match store.taxonomy_skills() {
        Ok(existing) if !existing.is_empty() => {
            info!(count = existing.len(), "skills table already populated");
        }
        Ok(_) => match truffle_taxonomy::loader::load_dir(skills_dir) {
            Ok(skills) if !skills.is_empty() => match store.upsert_skills(&skills) {
                Ok(count) => info!(count, "imported skills from taxonomy files"),
                Err(e) => warn!("failed to import skills: {e}"),
            },
            Ok(_) => warn!(dir = skills_dir, "no taxonomy files found"),
            Err(e) => warn!(dir = skills_dir, "failed to load taxonomy files: {e}"),
        },
        Err(e) => warn!("failed to read skills table: {e}"),
    }
}
