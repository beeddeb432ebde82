//! CoinGecko API client — Pro/Demo API with automatic retry on rate-limit.
//!
//! Supports both Pro API (x-cg-pro-api-key) and Demo API (x-cg-demo-api-key).
//! Without a key the Demo host is used unauthenticated.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use chainfolio_common::constants::VS_CURRENCY;
use chainfolio_common::error::{PortfolioError, PortfolioResult};
use chainfolio_common::traits::PriceSource;

const DEMO_BASE_URL: &str = "https://api.coingecko.com/api/v3";
const PRO_BASE_URL: &str = "https://pro-api.coingecko.com/api/v3";

const DEFAULT_MAX_RETRIES: u32 = 3;

/// CoinGecko API tier — determines base URL and auth header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoinGeckoTier {
    /// Demo (free) API: api.coingecko.com/api/v3
    #[default]
    Demo,
    /// Pro (paid) API: pro-api.coingecko.com/api/v3
    Pro,
}

/// CoinGecko HTTP client with rate-limit handling.
#[derive(Clone)]
pub struct CoinGeckoClient {
    http: Client,
    api_key: Option<String>,
    tier: CoinGeckoTier,
    base_url: String,
    max_retries: u32,
    backoff: Duration,
}

impl CoinGeckoClient {
    pub fn new(api_key: Option<&str>, tier: CoinGeckoTier) -> PortfolioResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| PortfolioError::Config(format!("http client: {e}")))?;

        let base_url = match tier {
            CoinGeckoTier::Demo => DEMO_BASE_URL,
            CoinGeckoTier::Pro => PRO_BASE_URL,
        };

        Ok(Self {
            http,
            api_key: api_key.map(str::trim).filter(|k| !k.is_empty()).map(String::from),
            tier,
            base_url: base_url.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Duration::from_secs(1),
        })
    }

    /// Point the client at another host (self-hosted proxy, tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Base delay for the first 429 retry; doubles on each attempt.
    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff = base;
        self
    }

    pub fn tier(&self) -> CoinGeckoTier {
        self.tier
    }

    /// Auth header name.
    fn auth_header(&self) -> &'static str {
        match self.tier {
            CoinGeckoTier::Demo => "x-cg-demo-api-key",
            CoinGeckoTier::Pro => "x-cg-pro-api-key",
        }
    }

    /// GET with retry on 429.
    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> anyhow::Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut retries = 0u32;

        loop {
            let mut req = self.http.get(&url).query(query);
            if let Some(key) = &self.api_key {
                req = req.header(self.auth_header(), key);
            }
            let resp = req.send().await?;

            if resp.status() == 429 {
                retries += 1;
                if retries > self.max_retries {
                    anyhow::bail!("CoinGecko rate limited after {} retries", self.max_retries);
                }
                let wait = self.backoff * 2u32.pow(retries - 1);
                warn!(
                    "CoinGecko 429 — retrying in {:?} (attempt {retries}/{})",
                    wait, self.max_retries
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                anyhow::bail!("CoinGecko API error {status}: {body}");
            }

            return Ok(resp.json().await?);
        }
    }

    // ── Simple ──────────────────────────────────────────────────

    /// `/simple/price` for native asset ids, USD only.
    pub async fn simple_price(&self, ids: &[String]) -> anyhow::Result<HashMap<String, f64>> {
        let joined = ids.join(",");
        let body: serde_json::Value = self
            .get("/simple/price", &[("ids", &joined), ("vs_currencies", VS_CURRENCY)])
            .await?;
        Ok(usd_quotes(&body))
    }

    /// `/simple/token_price/{platform}` for contract addresses, USD only.
    /// Keys come back lowercase.
    pub async fn simple_token_price(
        &self,
        platform: &str,
        contracts: &[String],
    ) -> anyhow::Result<HashMap<String, f64>> {
        let joined = contracts.join(",");
        let body: serde_json::Value = self
            .get(
                &format!("/simple/token_price/{platform}"),
                &[("contract_addresses", &joined), ("vs_currencies", VS_CURRENCY)],
            )
            .await?;
        Ok(usd_quotes(&body))
    }

    // ── Markets ─────────────────────────────────────────────────

    /// Top coins by market cap, as the raw JSON array CoinGecko returns.
    pub async fn coins_markets(&self, per_page: u32) -> anyhow::Result<serde_json::Value> {
        let per_page = per_page.to_string();
        self.get(
            "/coins/markets",
            &[
                ("vs_currency", VS_CURRENCY),
                ("order", "market_cap_desc"),
                ("per_page", &per_page),
                ("page", "1"),
                ("sparkline", "false"),
            ],
        )
        .await
    }
}

/// `{ "<id>": { "usd": <number> } }` → id → usd. Entries without a numeric
/// `usd` field are left out.
fn usd_quotes(body: &serde_json::Value) -> HashMap<String, f64> {
    let Some(map) = body.as_object() else {
        return HashMap::new();
    };
    map.iter()
        .filter_map(|(id, quote)| {
            let usd = quote.get(VS_CURRENCY).and_then(|v| v.as_f64());
            if usd.is_none() {
                debug!(id = %id, "no usd quote");
            }
            usd.map(|p| (id.to_ascii_lowercase(), p))
        })
        .collect()
}

#[async_trait]
impl PriceSource for CoinGeckoClient {
    async fn usd_prices(&self, ids: &[String]) -> PortfolioResult<HashMap<String, f64>> {
        self.simple_price(ids)
            .await
            .map_err(|e| PortfolioError::Upstream(format!("{e:#}")))
    }

    async fn usd_token_prices(
        &self,
        platform: &str,
        contracts: &[String],
    ) -> PortfolioResult<HashMap<String, f64>> {
        self.simple_token_price(platform, contracts)
            .await
            .map_err(|e| PortfolioError::Upstream(format!("{e:#}")))
    }
}
