//! Collaborator traits — the boundary between the aggregation core and the
//! upstream modules.
//!
//! A chain client implements [`ChainProvider`] (which includes the
//! [`TokenContract`] read capability) for exactly one network. A price
//! client implements [`PriceSource`]. The core never sees HTTP or JSON-RPC.

use std::collections::HashMap;

use alloy::primitives::U256;
use async_trait::async_trait;

use crate::error::PortfolioResult;
use crate::types::RawTokenBalance;

/// Read-only view of ERC-20-like contracts on one network.
///
/// Contract and owner addresses are lowercase `0x` hex strings.
#[async_trait]
pub trait TokenContract: Send + Sync {
    /// `decimals()` of the contract.
    async fn decimals(&self, contract: &str) -> PortfolioResult<u8>;

    /// `symbol()` of the contract.
    async fn symbol(&self, contract: &str) -> PortfolioResult<String>;

    /// `balanceOf(owner)` in base units.
    async fn balance_of(&self, contract: &str, owner: &str) -> PortfolioResult<U256>;
}

/// Balance source for one network.
#[async_trait]
pub trait ChainProvider: TokenContract {
    /// Native asset balance of `owner`, in base units.
    async fn native_balance(&self, owner: &str) -> PortfolioResult<U256>;

    /// Every token balance the provider can enumerate for `owner`.
    /// May include zero balances; callers filter them.
    async fn token_balances(&self, owner: &str) -> PortfolioResult<Vec<RawTokenBalance>>;
}

/// USD price upstream.
///
/// Both methods return only the identifiers the upstream actually priced.
/// Keys of the contract map are lowercase addresses.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// USD price per native asset id (e.g. `"ethereum"`).
    async fn usd_prices(&self, ids: &[String]) -> PortfolioResult<HashMap<String, f64>>;

    /// USD price per contract address on a price platform (e.g. `"arbitrum-one"`).
    async fn usd_token_prices(
        &self,
        platform: &str,
        contracts: &[String],
    ) -> PortfolioResult<HashMap<String, f64>>;
}
