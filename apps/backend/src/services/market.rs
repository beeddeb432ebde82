//! Market listing service — top coins by market cap, cached in-process.

use std::time::Duration;

use chainfolio_mod_coingecko::CoinGeckoClient;
use serde_json::Value;
use tracing::info;

use crate::clients::cache::Cache;

/// Number of coins in the listing.
const TOP_COINS: u32 = 10;

pub struct MarketService {
    client: CoinGeckoClient,
    cache: Cache,
    ttl: Duration,
}

impl MarketService {
    pub fn new(client: CoinGeckoClient, ttl: Duration) -> Self {
        Self {
            client,
            cache: Cache::new(),
            ttl,
        }
    }

    /// Raw CoinGecko `/coins/markets` body, served from cache while fresh.
    pub async fn top_coins(&self) -> anyhow::Result<Value> {
        let cache_key = Cache::key("market", &["top", &TOP_COINS.to_string()]);

        if let Some(cached) = self.cache.get::<Value>(&cache_key) {
            return Ok(cached);
        }

        let listing = self.client.coins_markets(TOP_COINS).await?;
        info!(ttl_secs = self.ttl.as_secs(), "market listing refreshed");
        self.cache.set(&cache_key, &listing, self.ttl)?;
        Ok(listing)
    }
}
