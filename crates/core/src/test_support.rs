//! In-memory collaborators for core tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use alloy::primitives::U256;
use async_trait::async_trait;
use chainfolio_common::error::{PortfolioError, PortfolioResult};
use chainfolio_common::traits::{ChainProvider, PriceSource, TokenContract};
use chainfolio_common::types::{Network, NetworkPreset, RawTokenBalance};

pub const OWNER: &str = "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd";
pub const USDC: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
pub const USDT: &str = "0xdac17f958d2ee523a2206206994597c13d831ec7";
pub const WETH_ARB: &str = "0x82af49447d8a07e3bd95bd0d56f35241523fbab1";

pub fn network(name: &str) -> Network {
    let preset = NetworkPreset::find(name).expect("known preset");
    Network::from_preset(preset, format!("http://{name}.invalid"))
}

/// `whole * 10^decimals`.
pub fn units(whole: u64, decimals: u8) -> U256 {
    U256::from(whole) * U256::from(10u64).pow(U256::from(decimals))
}

/// Scripted chain. Unknown contracts fail metadata reads.
#[derive(Default)]
pub struct FakeChain {
    pub native: U256,
    pub tokens: Vec<RawTokenBalance>,
    pub metadata: HashMap<String, (String, u8)>,
    pub balance_of: HashMap<String, U256>,
    pub fail_balances: bool,
    pub hang: bool,
    pub metadata_delay: Option<Duration>,
    pub decimals_calls: AtomicUsize,
    pub symbol_calls: AtomicUsize,
    pub balance_of_calls: AtomicUsize,
    pub enumerate_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeChain {
    pub fn with_native(native: U256) -> Self {
        Self {
            native,
            ..Self::default()
        }
    }

    pub fn token(mut self, contract: &str, balance: U256, symbol: &str, decimals: u8) -> Self {
        self.tokens.push(RawTokenBalance {
            contract_address: contract.to_string(),
            balance,
        });
        self.metadata
            .insert(contract.to_ascii_lowercase(), (symbol.to_string(), decimals));
        self
    }

    pub fn raw_token(mut self, contract: &str, balance: U256) -> Self {
        self.tokens.push(RawTokenBalance {
            contract_address: contract.to_string(),
            balance,
        });
        self
    }

    pub fn failing() -> Self {
        Self {
            fail_balances: true,
            ..Self::default()
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    async fn metadata_read(&self, contract: &str) -> PortfolioResult<(String, u8)> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.metadata_delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.metadata
            .get(&contract.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| PortfolioError::Rpc(format!("execution reverted: {contract}")))
    }
}

#[async_trait]
impl TokenContract for FakeChain {
    async fn decimals(&self, contract: &str) -> PortfolioResult<u8> {
        self.decimals_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.metadata_read(contract).await?.1)
    }

    async fn symbol(&self, contract: &str) -> PortfolioResult<String> {
        self.symbol_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.metadata_read(contract).await?.0)
    }

    async fn balance_of(&self, contract: &str, _owner: &str) -> PortfolioResult<U256> {
        self.balance_of_calls.fetch_add(1, Ordering::SeqCst);
        self.balance_of
            .get(&contract.to_ascii_lowercase())
            .copied()
            .ok_or_else(|| PortfolioError::Rpc("execution reverted".into()))
    }
}

#[async_trait]
impl ChainProvider for FakeChain {
    async fn native_balance(&self, _owner: &str) -> PortfolioResult<U256> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.fail_balances {
            return Err(PortfolioError::Rpc("connection refused".into()));
        }
        Ok(self.native)
    }

    async fn token_balances(&self, _owner: &str) -> PortfolioResult<Vec<RawTokenBalance>> {
        self.enumerate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_balances {
            return Err(PortfolioError::Rpc("connection refused".into()));
        }
        Ok(self.tokens.clone())
    }
}

/// Scripted price upstream that records every request.
#[derive(Default)]
pub struct FakePrices {
    pub native: HashMap<String, f64>,
    /// Keyed by (platform, lowercase contract).
    pub contracts: HashMap<(String, String), f64>,
    pub fail: bool,
    pub native_requests: Mutex<Vec<Vec<String>>>,
    pub token_requests: Mutex<Vec<(String, Vec<String>, tokio::time::Instant)>>,
}

impl FakePrices {
    pub fn native(mut self, id: &str, usd: f64) -> Self {
        self.native.insert(id.to_string(), usd);
        self
    }

    pub fn contract(mut self, platform: &str, contract: &str, usd: f64) -> Self {
        self.contracts
            .insert((platform.to_string(), contract.to_ascii_lowercase()), usd);
        self
    }

    pub fn token_request_count(&self) -> usize {
        self.token_requests.lock().unwrap().len()
    }
}

#[async_trait]
impl PriceSource for FakePrices {
    async fn usd_prices(&self, ids: &[String]) -> PortfolioResult<HashMap<String, f64>> {
        self.native_requests.lock().unwrap().push(ids.to_vec());
        if self.fail {
            return Err(PortfolioError::Upstream("HTTP 500".into()));
        }
        Ok(ids
            .iter()
            .filter_map(|id| self.native.get(id).map(|p| (id.clone(), *p)))
            .collect())
    }

    async fn usd_token_prices(
        &self,
        platform: &str,
        contracts: &[String],
    ) -> PortfolioResult<HashMap<String, f64>> {
        self.token_requests.lock().unwrap().push((
            platform.to_string(),
            contracts.to_vec(),
            tokio::time::Instant::now(),
        ));
        if self.fail {
            return Err(PortfolioError::Upstream("HTTP 429".into()));
        }
        Ok(contracts
            .iter()
            .filter_map(|c| {
                self.contracts
                    .get(&(platform.to_string(), c.clone()))
                    .map(|p| (c.clone(), *p))
            })
            .collect())
    }
}
