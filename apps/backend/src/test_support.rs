//! Static collaborators and request helpers for route tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::U256;
use async_trait::async_trait;
use axum::response::Response;
use chainfolio_common::error::{PortfolioError, PortfolioResult};
use chainfolio_common::traits::{ChainProvider, PriceSource, TokenContract};
use chainfolio_common::types::RawTokenBalance;
use chainfolio_core::config::AppConfig;
use chainfolio_core::{NetworkBalanceFetcher, PortfolioAggregator, PriceOracleClient};
use chainfolio_mod_coingecko::{CoinGeckoClient, CoinGeckoTier};
use serde_json::Value;

use crate::services::market::MarketService;
use crate::state::AppState;

/// A chain holding only native currency, or failing every read.
pub struct StaticChain {
    native: U256,
    fail: bool,
}

/// 1.5 ETH.
pub fn ok_chain() -> StaticChain {
    StaticChain {
        native: U256::from(1_500_000_000_000_000_000u128),
        fail: false,
    }
}

pub fn down_chain() -> StaticChain {
    StaticChain {
        native: U256::ZERO,
        fail: true,
    }
}

#[async_trait]
impl TokenContract for StaticChain {
    async fn decimals(&self, contract: &str) -> PortfolioResult<u8> {
        Err(PortfolioError::Rpc(format!("{contract} is not a token")))
    }

    async fn symbol(&self, contract: &str) -> PortfolioResult<String> {
        Err(PortfolioError::Rpc(format!("{contract} is not a token")))
    }

    async fn balance_of(&self, _contract: &str, _owner: &str) -> PortfolioResult<U256> {
        Ok(U256::ZERO)
    }
}

#[async_trait]
impl ChainProvider for StaticChain {
    async fn native_balance(&self, _owner: &str) -> PortfolioResult<U256> {
        if self.fail {
            return Err(PortfolioError::Rpc("connection refused".into()));
        }
        Ok(self.native)
    }

    async fn token_balances(&self, _owner: &str) -> PortfolioResult<Vec<RawTokenBalance>> {
        if self.fail {
            return Err(PortfolioError::Rpc("connection refused".into()));
        }
        Ok(Vec::new())
    }
}

/// ETH at $2000, nothing else.
pub struct StaticPrices;

#[async_trait]
impl PriceSource for StaticPrices {
    async fn usd_prices(&self, ids: &[String]) -> PortfolioResult<HashMap<String, f64>> {
        Ok(ids
            .iter()
            .filter(|id| id.as_str() == "ethereum")
            .map(|id| (id.clone(), 2000.0))
            .collect())
    }

    async fn usd_token_prices(
        &self,
        _platform: &str,
        _contracts: &[String],
    ) -> PortfolioResult<HashMap<String, f64>> {
        Ok(HashMap::new())
    }
}

/// State over the default networks (ethereum, arbitrum), each backed by the
/// matching chain in `chains`. Market requests go to `market_url`.
pub fn state(chains: Vec<StaticChain>, market_url: &str) -> Arc<AppState> {
    let config = AppConfig::from_lookup(|key| (key == "ALCHEMY_API_KEY").then(|| "test".to_string()))
        .expect("test config");

    let fetchers = config
        .networks
        .iter()
        .zip(chains)
        .map(|(network, chain)| NetworkBalanceFetcher::new(network.clone(), Arc::new(chain)))
        .collect();
    let oracle = PriceOracleClient::new(Arc::new(StaticPrices), Duration::ZERO, 25);
    let portfolio = PortfolioAggregator::new(fetchers, oracle, &config.aggregation);

    let coingecko = CoinGeckoClient::new(None, CoinGeckoTier::Demo)
        .expect("http client")
        .with_base_url(market_url)
        .with_backoff(Duration::from_millis(1));
    let market = MarketService::new(coingecko, config.server.market_cache_ttl());

    Arc::new(AppState::new(config, portfolio, market))
}

pub async fn json_body(resp: Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}
