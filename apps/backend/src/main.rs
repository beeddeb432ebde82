//! Chainfolio Backend — multi-chain wallet portfolio API.
//!
//! Responsibilities:
//! - POST /api/wallet: USD portfolio for an address across configured networks
//! - GET /api/market: cached top-coins listing
//! - GET /api/health

mod clients;
mod error;
mod routes;
mod services;
mod state;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use chainfolio_core::AppConfig;
use tracing_subscriber::EnvFilter;

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; real deployments set the environment directly.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let config = AppConfig::from_env()?;
    let addr = config.server.bind_addr;

    tracing::info!("Chainfolio backend starting...");

    let state = Arc::new(AppState::from_config(config)?);
    let app = routes::app(state);

    tracing::info!("Listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
