//! USD pricing under a rate-limited upstream.
//!
//! Every upstream request goes through one shared [`IntervalGate`]. Misses
//! (failed request, missing key, nonsense value) are logged and left out
//! of the result maps; [`PriceBook`] turns them into a price of 0, which
//! makes the holding drop out of the snapshot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chainfolio_common::address::canonical;
use chainfolio_common::error::PortfolioError;
use chainfolio_common::traits::PriceSource;
use chainfolio_common::types::AssetKey;
use tracing::{debug, warn};

use crate::rate_limit::IntervalGate;

pub struct PriceOracleClient {
    source: Arc<dyn PriceSource>,
    gate: IntervalGate,
    batch_size: usize,
}

impl PriceOracleClient {
    pub fn new(source: Arc<dyn PriceSource>, min_spacing: Duration, batch_size: usize) -> Self {
        Self {
            source,
            gate: IntervalGate::new(min_spacing),
            batch_size: batch_size.max(1),
        }
    }

    /// USD price of one native asset id; 0 on any failure.
    pub async fn price_native(&self, asset_id: &str) -> f64 {
        self.native_prices(&[asset_id.to_string()])
            .await
            .get(asset_id)
            .copied()
            .unwrap_or(0.0)
    }

    /// USD prices for distinct native asset ids, in a single request.
    pub async fn native_prices(&self, asset_ids: &[String]) -> HashMap<String, f64> {
        let mut ids: Vec<String> = Vec::with_capacity(asset_ids.len());
        for id in asset_ids {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        if ids.is_empty() {
            return HashMap::new();
        }

        match self.gate.run(self.source.usd_prices(&ids)).await {
            Ok(prices) => keep_valid(prices, &ids),
            Err(e) => {
                log_miss(&ids.join(","), &e);
                HashMap::new()
            }
        }
    }

    /// USD prices keyed by lowercase contract address for one network's
    /// price platform. Addresses are batched `batch_size` per request.
    pub async fn prices_for_contracts(
        &self,
        platform: &str,
        contracts: &[String],
    ) -> HashMap<String, f64> {
        let mut wanted: Vec<String> = Vec::with_capacity(contracts.len());
        for contract in contracts {
            let contract = canonical(contract);
            if !wanted.contains(&contract) {
                wanted.push(contract);
            }
        }

        let mut prices = HashMap::with_capacity(wanted.len());
        for chunk in wanted.chunks(self.batch_size) {
            match self
                .gate
                .run(self.source.usd_token_prices(platform, chunk))
                .await
            {
                Ok(found) => {
                    let found: HashMap<String, f64> =
                        found.into_iter().map(|(k, v)| (canonical(&k), v)).collect();
                    prices.extend(keep_valid(found, chunk));
                }
                Err(e) => log_miss(&format!("{platform}:{}", chunk.join(",")), &e),
            }
        }
        debug!(platform = %platform, requested = wanted.len(), priced = prices.len(), "contract prices fetched");
        prices
    }
}

/// Keep finite, non-negative prices for the identifiers we asked for.
fn keep_valid(prices: HashMap<String, f64>, wanted: &[String]) -> HashMap<String, f64> {
    let mut kept = HashMap::with_capacity(wanted.len());
    for id in wanted {
        match prices.get(id) {
            Some(p) if p.is_finite() && *p >= 0.0 => {
                kept.insert(id.clone(), *p);
            }
            Some(p) => log_miss(id, &PortfolioError::PriceLookupMiss {
                id: id.clone(),
                message: format!("unusable price {p}"),
            }),
            None => debug!(id = %id, "price lookup miss"),
        }
    }
    kept
}

fn log_miss(id: &str, error: &PortfolioError) {
    warn!(id = %id, error = %error, "price lookup failed; treating as 0");
}

/// All prices fetched during one aggregation call.
#[derive(Debug, Default, Clone)]
pub struct PriceBook {
    /// native asset id → usd
    native: HashMap<String, f64>,
    /// (network, lowercase contract) → usd
    contracts: HashMap<(String, String), f64>,
    /// network → native asset id
    native_ids: HashMap<String, String>,
}

impl PriceBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_native(&mut self, network: &str, asset_id: &str, prices: &HashMap<String, f64>) {
        self.native_ids
            .insert(network.to_string(), asset_id.to_string());
        if let Some(p) = prices.get(asset_id) {
            self.native.insert(asset_id.to_string(), *p);
        }
    }

    pub fn add_contracts(&mut self, network: &str, prices: HashMap<String, f64>) {
        for (contract, usd) in prices {
            self.contracts
                .insert((network.to_string(), canonical(&contract)), usd);
        }
    }

    /// Price of a holding; 0 when nothing was found.
    pub fn price(&self, network: &str, asset: &AssetKey) -> f64 {
        match asset {
            AssetKey::Native => self
                .native_ids
                .get(network)
                .and_then(|id| self.native.get(id))
                .copied()
                .unwrap_or(0.0),
            AssetKey::Contract(addr) => self
                .contracts
                .get(&(network.to_string(), addr.clone()))
                .copied()
                .unwrap_or(0.0),
        }
    }
}
