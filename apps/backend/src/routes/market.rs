//! Market listing passthrough.
//!
//! GET /api/market — top coins by market cap (CoinGecko), cached in-process.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use chainfolio_common::error::PortfolioError;
use serde_json::Value;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/market", get(get_market))
}

async fn get_market(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let listing = state
        .market
        .top_coins()
        .await
        .map_err(|e| PortfolioError::Internal(format!("market listing unavailable: {e:#}")))?;
    Ok(Json(listing))
}
