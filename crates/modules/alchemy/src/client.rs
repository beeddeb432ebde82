//! Alchemy JSON-RPC provider for one EVM network.
//!
//! Native balances via `eth_getBalance`, ERC-20 discovery via the paginated
//! `alchemy_getTokenBalances`, and token identity / `balanceOf` via raw
//! `eth_call` with `sol!`-encoded calldata. Rate-limit aware with
//! exponential backoff.
//!
//! The RPC URL carries the API key, so it is never logged.

use std::time::Duration;

use alloy::primitives::U256;
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use chainfolio_common::address::parse_address;
use chainfolio_common::error::{PortfolioError, PortfolioResult};
use chainfolio_common::traits::{ChainProvider, TokenContract};
use chainfolio_common::types::RawTokenBalance;

sol! {
    contract IERC20 {
        function decimals() external view returns (uint8);
        function symbol() external view returns (string memory);
        function balanceOf(address account) external view returns (uint256);
    }
}

/// Stop following `pageKey` after this many pages.
const MAX_TOKEN_PAGES: usize = 20;

const DEFAULT_MAX_RETRIES: u32 = 3;

// ── JSON-RPC Types ──────────────────────────────────────────────────

#[derive(Serialize)]
struct JsonRpcRequest<'a, T: Serialize> {
    jsonrpc: &'a str,
    method: &'a str,
    params: T,
    id: u64,
}

#[derive(Deserialize, Debug)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize, Debug)]
struct JsonRpcError {
    code: i64,
    message: String,
}

// ── Token API Response Types ────────────────────────────────────────

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TokenBalanceEntry {
    contract_address: String,
    token_balance: Option<String>,
    error: Option<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TokenBalancesPage {
    token_balances: Vec<TokenBalanceEntry>,
    page_key: Option<String>,
}

/// Alchemy (or any Ethereum JSON-RPC) endpoint bound to one network.
#[derive(Clone)]
pub struct AlchemyRpc {
    http: Client,
    network: String,
    url: String,
    max_retries: u32,
    backoff: Duration,
}

impl AlchemyRpc {
    pub fn new(network: &str, url: &str) -> PortfolioResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PortfolioError::Config(format!("http client: {e}")))?;

        Ok(Self {
            http,
            network: network.to_string(),
            url: url.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Duration::from_secs(1),
        })
    }

    /// Base delay for the first 429 retry; doubles on each attempt.
    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff = base;
        self
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    /// Execute a JSON-RPC call with retry on 429.
    async fn rpc_call<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> anyhow::Result<R> {
        let body = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        };

        let mut retries = 0u32;
        loop {
            let resp = self.http.post(&self.url).json(&body).send().await?;

            if resp.status() == 429 {
                retries += 1;
                if retries > self.max_retries {
                    anyhow::bail!("rate limited after {} retries", self.max_retries);
                }
                let wait = self.backoff * 2u32.pow(retries - 1);
                warn!(
                    network = %self.network,
                    method,
                    "RPC 429, retrying in {:?} (attempt {retries}/{})",
                    wait,
                    self.max_retries
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                anyhow::bail!("{method} HTTP {status}: {text}");
            }

            let result: JsonRpcResponse<R> = resp.json().await?;
            if let Some(err) = result.error {
                anyhow::bail!("{method} error {}: {}", err.code, err.message);
            }
            return result
                .result
                .ok_or_else(|| anyhow::anyhow!("{method} returned null result"));
        }
    }

    /// `eth_getBalance` at latest.
    pub async fn get_balance(&self, owner: &str) -> anyhow::Result<U256> {
        let hex: String = self.rpc_call("eth_getBalance", [owner, "latest"]).await?;
        parse_quantity(&hex)
    }

    /// Every ERC-20 balance Alchemy reports, following `pageKey`.
    /// Entries carrying an error or no balance are skipped.
    pub async fn get_token_balances(&self, owner: &str) -> anyhow::Result<Vec<RawTokenBalance>> {
        let mut balances = Vec::new();
        let mut page_key: Option<String> = None;

        for _ in 0..MAX_TOKEN_PAGES {
            let params = match &page_key {
                Some(key) => serde_json::json!([owner, "erc20", { "pageKey": key }]),
                None => serde_json::json!([owner, "erc20"]),
            };
            let page: TokenBalancesPage = self.rpc_call("alchemy_getTokenBalances", params).await?;

            for entry in page.token_balances {
                if entry.error.as_ref().is_some_and(|e| !e.is_null()) {
                    debug!(network = %self.network, contract = %entry.contract_address, "skipping errored balance");
                    continue;
                }
                let Some(raw) = entry.token_balance.as_deref() else {
                    continue;
                };
                match parse_quantity(raw) {
                    Ok(balance) => balances.push(RawTokenBalance::new(&entry.contract_address, balance)),
                    Err(e) => {
                        debug!(network = %self.network, contract = %entry.contract_address, error = %e, "unparseable balance")
                    }
                }
            }

            match page.page_key {
                Some(next) if !next.is_empty() => page_key = Some(next),
                _ => return Ok(balances),
            }
        }

        warn!(network = %self.network, pages = MAX_TOKEN_PAGES, "token balance pagination truncated");
        Ok(balances)
    }

    /// Read-only contract call at latest.
    async fn eth_call<C: SolCall>(&self, contract: &str, call: C) -> anyhow::Result<C::Return> {
        let tx = serde_json::json!({
            "to": contract,
            "data": format!("0x{}", hex::encode(call.abi_encode())),
        });
        let out: String = self.rpc_call("eth_call", (tx, "latest")).await?;
        let bytes = hex::decode(out.trim_start_matches("0x"))?;
        if bytes.is_empty() {
            anyhow::bail!("{contract} returned no data");
        }
        Ok(C::abi_decode_returns(&bytes)?)
    }

    fn to_error(&self, e: anyhow::Error) -> PortfolioError {
        PortfolioError::Rpc(format!("{}: {e:#}", self.network))
    }
}

/// Parse a JSON-RPC hex quantity. `0x` alone is zero.
fn parse_quantity(hex: &str) -> anyhow::Result<U256> {
    let digits = hex.trim().trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    Ok(U256::from_str_radix(digits, 16)?)
}

#[async_trait]
impl TokenContract for AlchemyRpc {
    async fn decimals(&self, contract: &str) -> PortfolioResult<u8> {
        self.eth_call(contract, IERC20::decimalsCall {})
            .await
            .map_err(|e| self.to_error(e))
    }

    async fn symbol(&self, contract: &str) -> PortfolioResult<String> {
        self.eth_call(contract, IERC20::symbolCall {})
            .await
            .map_err(|e| self.to_error(e))
    }

    async fn balance_of(&self, contract: &str, owner: &str) -> PortfolioResult<U256> {
        let account = parse_address(owner)?;
        self.eth_call(contract, IERC20::balanceOfCall { account })
            .await
            .map_err(|e| self.to_error(e))
    }
}

#[async_trait]
impl ChainProvider for AlchemyRpc {
    async fn native_balance(&self, owner: &str) -> PortfolioResult<U256> {
        self.get_balance(owner).await.map_err(|e| self.to_error(e))
    }

    async fn token_balances(&self, owner: &str) -> PortfolioResult<Vec<RawTokenBalance>> {
        self.get_token_balances(owner)
            .await
            .map_err(|e| self.to_error(e))
    }
}
