//! Wallet portfolio endpoint.
//!
//! POST /api/wallet — `{ "address": "0x…", "networks": ["ethereum"]? }`

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use chainfolio_common::error::PortfolioError;
use chainfolio_common::types::PortfolioSnapshot;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WalletRequest {
    #[serde(default)]
    address: String,
    /// Subset of configured networks; empty means all of them.
    #[serde(default)]
    networks: Vec<String>,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/wallet", post(get_wallet))
}

async fn get_wallet(
    State(state): State<Arc<AppState>>,
    body: Result<Json<WalletRequest>, JsonRejection>,
) -> Result<Json<PortfolioSnapshot>, ApiError> {
    let Json(req) = body.map_err(|e| PortfolioError::InvalidAddress(e.body_text()))?;

    let snapshot = state
        .portfolio
        .aggregate_networks(&req.address, &req.networks)
        .await?;
    Ok(Json(snapshot))
}
