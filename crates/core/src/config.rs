//! Runtime configuration, read from the process environment.
//!
//! ```text
//! PORTFOLIO_NETWORKS=ethereum,arbitrum
//! ALCHEMY_API_KEY=...                 # or ETHEREUM_RPC_URL / ARBITRUM_RPC_URL
//! ETHEREUM_TRACKED_TOKENS=0xa0b8...,0xdac1...
//! COINGECKO_API_KEY=...               # optional on the demo tier
//! COINGECKO_TIER=demo
//! PRICE_MIN_SPACING_MS=1200
//! AGGREGATION_TIMEOUT_SECS=30
//! ```

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use chainfolio_common::constants::*;
use chainfolio_common::error::{PortfolioError, PortfolioResult};
use chainfolio_common::types::{Network, NetworkPreset};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════
//  APP CONFIG
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configured networks, in output order.
    pub networks: Vec<Network>,
    pub price: PriceConfig,
    pub aggregation: AggregationConfig,
    pub server: ServerConfig,
}

// ═══════════════════════════════════════════════════════════════════════
//  PRICE ORACLE
// ═══════════════════════════════════════════════════════════════════════

/// CoinGecko API tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceTier {
    #[default]
    Demo,
    Pro,
}

impl FromStr for PriceTier {
    type Err = PortfolioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "demo" | "free" | "public" => Ok(PriceTier::Demo),
            "pro" => Ok(PriceTier::Pro),
            other => Err(PortfolioError::Config(format!(
                "COINGECKO_TIER must be 'demo' or 'pro', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceConfig {
    pub tier: PriceTier,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Base URL override (tests, self-hosted proxies).
    #[serde(default)]
    pub api_url: Option<String>,
    pub min_spacing_ms: u64,
    pub batch_size: usize,
}

impl PriceConfig {
    pub fn min_spacing(&self) -> Duration {
        Duration::from_millis(self.min_spacing_ms)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  AGGREGATION / SERVER
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    pub timeout_secs: u64,
    pub metadata_concurrency: usize,
}

impl AggregationConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_AGGREGATION_TIMEOUT_SECS,
            metadata_concurrency: DEFAULT_METADATA_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub market_cache_ttl_secs: u64,
}

impl ServerConfig {
    pub fn market_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.market_cache_ttl_secs)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  LOADING
// ═══════════════════════════════════════════════════════════════════════

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> PortfolioResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> PortfolioResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let names: Vec<String> = match get("PORTFOLIO_NETWORKS") {
            Some(list) => split_list(&list),
            None => DEFAULT_NETWORKS.iter().map(|s| s.to_string()).collect(),
        };
        if names.is_empty() {
            return Err(PortfolioError::Config("PORTFOLIO_NETWORKS is empty".into()));
        }

        let alchemy_key = get("ALCHEMY_API_KEY");
        let mut networks: Vec<Network> = Vec::with_capacity(names.len());
        for name in &names {
            let preset = NetworkPreset::find(name)
                .ok_or_else(|| PortfolioError::UnsupportedNetwork(name.clone()))?;
            if networks.iter().any(|n| n.name == preset.name) {
                continue;
            }

            let upper = preset.name.to_ascii_uppercase();
            let rpc_url = get(&format!("{upper}_RPC_URL"))
                .or_else(|| legacy_rpc_var(preset.name).and_then(|var| get(var)))
                .or_else(|| {
                    alchemy_key
                        .as_ref()
                        .map(|key| format!("https://{}.g.alchemy.com/v2/{key}", preset.alchemy_slug))
                })
                .ok_or_else(|| {
                    PortfolioError::Config(format!(
                        "no RPC endpoint for {}: set {upper}_RPC_URL or ALCHEMY_API_KEY",
                        preset.name
                    ))
                })?;
            url::Url::parse(&rpc_url).map_err(|e| {
                PortfolioError::Config(format!("invalid RPC URL for {}: {e}", preset.name))
            })?;

            let tracked = get(&format!("{upper}_TRACKED_TOKENS"))
                .map(|list| split_list(&list))
                .unwrap_or_default();

            networks.push(Network::from_preset(preset, rpc_url).with_tracked_tokens(tracked));
        }

        let price = PriceConfig {
            tier: get("COINGECKO_TIER")
                .map(|t| t.parse::<PriceTier>())
                .transpose()?
                .unwrap_or_default(),
            api_key: get("COINGECKO_API_KEY"),
            api_url: get("COINGECKO_API_URL"),
            min_spacing_ms: parse_or(&get, "PRICE_MIN_SPACING_MS", DEFAULT_PRICE_SPACING_MS)?,
            batch_size: parse_or(&get, "PRICE_BATCH_SIZE", DEFAULT_PRICE_BATCH_SIZE)?.max(1),
        };

        let aggregation = AggregationConfig {
            timeout_secs: parse_or(&get, "AGGREGATION_TIMEOUT_SECS", DEFAULT_AGGREGATION_TIMEOUT_SECS)?
                .max(1),
            metadata_concurrency: parse_or(
                &get,
                "METADATA_CONCURRENCY",
                DEFAULT_METADATA_CONCURRENCY,
            )?
            .max(1),
        };

        let server = ServerConfig {
            bind_addr: parse_or(&get, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3001)))?,
            market_cache_ttl_secs: parse_or(
                &get,
                "MARKET_CACHE_TTL_SECS",
                DEFAULT_MARKET_CACHE_TTL_SECS,
            )?,
        };

        Ok(Self {
            networks,
            price,
            aggregation,
            server,
        })
    }

    /// Names of the configured networks, in order.
    pub fn network_names(&self) -> Vec<String> {
        self.networks.iter().map(|n| n.name.clone()).collect()
    }
}

/// Per-network RPC variables from the first deployment.
fn legacy_rpc_var(network: &str) -> Option<&'static str> {
    match network {
        NETWORK_ETHEREUM => Some("ALCHEMY_ETH_RPC"),
        NETWORK_ARBITRUM => Some("ALCHEMY_ARB_RPC"),
        _ => None,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> PortfolioResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| PortfolioError::Config(format!("{key}='{raw}': {e}"))),
        None => Ok(default),
    }
}
