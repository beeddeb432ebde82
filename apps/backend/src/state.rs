//! Shared application state for the API server.

use std::sync::Arc;

use chainfolio_core::config::{AppConfig, PriceTier};
use chainfolio_core::{NetworkBalanceFetcher, PortfolioAggregator, PriceOracleClient};
use chainfolio_mod_alchemy::AlchemyRpc;
use chainfolio_mod_coingecko::{CoinGeckoClient, CoinGeckoTier};
use tracing::info;

use crate::services::market::MarketService;

/// Backend application state — shared across all request handlers.
pub struct AppState {
    pub config: AppConfig,
    pub portfolio: PortfolioAggregator,
    pub market: MarketService,
}

impl AppState {
    pub fn new(config: AppConfig, portfolio: PortfolioAggregator, market: MarketService) -> Self {
        Self {
            config,
            portfolio,
            market,
        }
    }

    /// Wire the Alchemy providers and the CoinGecko client from config.
    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let tier = match config.price.tier {
            PriceTier::Demo => CoinGeckoTier::Demo,
            PriceTier::Pro => CoinGeckoTier::Pro,
        };
        let mut coingecko = CoinGeckoClient::new(config.price.api_key.as_deref(), tier)?;
        if let Some(url) = &config.price.api_url {
            coingecko = coingecko.with_base_url(url);
        }

        let mut fetchers = Vec::with_capacity(config.networks.len());
        for network in &config.networks {
            let rpc = AlchemyRpc::new(&network.name, &network.rpc_url)?;
            fetchers.push(NetworkBalanceFetcher::new(network.clone(), Arc::new(rpc)));
        }

        let oracle = PriceOracleClient::new(
            Arc::new(coingecko.clone()),
            config.price.min_spacing(),
            config.price.batch_size,
        );
        let portfolio = PortfolioAggregator::new(fetchers, oracle, &config.aggregation);
        let market = MarketService::new(coingecko, config.server.market_cache_ttl());

        info!(
            networks = ?config.network_names(),
            tier = ?config.price.tier,
            "portfolio engine ready"
        );
        Ok(Self::new(config, portfolio, market))
    }
}
