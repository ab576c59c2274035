use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use truffle_core::TruffleConfig;
use truffle_slack::SlackClient;

mod app;
mod cache;
mod client;
mod format;
mod http;
mod query;
mod signature;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "truffle_bot=info,tower_http=debug".into()),
        )
        .init();

    let config_path = std::env::var("TRUFFLE_CONFIG").ok();
    let config = TruffleConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        TruffleConfig::default()
    });

    let api = Arc::new(client::ExpertApiClient::new(&config.expert_api.url));
    let skills = Arc::new(cache::SkillCache::new(api.clone()));
    let slack = Arc::new(SlackClient::new(&config.slack));

    let bind = config.bot.host.clone();
    let port = config.bot.port;
    let state = Arc::new(app::AppState::new(config, api, skills, slack));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("Truffle bot listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
