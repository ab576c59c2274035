use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use truffle_core::TruffleConfig;
use truffle_store::Store;

mod app;
mod http;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "truffle_expert_api=info,tower_http=debug".into()),
        )
        .init();

    let config_path = std::env::var("TRUFFLE_CONFIG").ok();
    let config = TruffleConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        TruffleConfig::default()
    });

    let store = Arc::new(Store::open(&config.database.path)?);

    let bind = config.expert_api.host.clone();
    let port = config.expert_api.port;
    let state = Arc::new(app::AppState::new(config, store));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("Truffle expert API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
