//! Per-network balance discovery.
//!
//! Reads the native balance and the provider's token enumeration for one
//! address on one network, then probes the network's tracked tokens the
//! enumeration did not mention. Zero balances never leave this module.

use std::collections::HashSet;
use std::sync::Arc;

use alloy::primitives::U256;
use chainfolio_common::address::canonical;
use chainfolio_common::error::{PortfolioError, PortfolioResult};
use chainfolio_common::traits::ChainProvider;
use chainfolio_common::types::{AssetKey, Network, RawTokenBalance, TokenBalance};
use futures::future::join_all;
use tracing::{debug, warn};

/// What one network holds for an address, before token identity is known.
#[derive(Debug, Clone)]
pub struct NetworkBalances {
    /// Native holding, already carrying the network's native decimals.
    pub native: TokenBalance,
    /// Nonzero token balances in first-observed order.
    pub tokens: Vec<RawTokenBalance>,
}

pub struct NetworkBalanceFetcher {
    network: Network,
    provider: Arc<dyn ChainProvider>,
}

impl NetworkBalanceFetcher {
    pub fn new(network: Network, provider: Arc<dyn ChainProvider>) -> Self {
        Self { network, provider }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn provider(&self) -> &Arc<dyn ChainProvider> {
        &self.provider
    }

    /// Fetch balances for `owner` (a validated, lowercase address).
    ///
    /// Any failure of the native read or the enumeration makes the whole
    /// network `NetworkUnavailable`. Tracked-token probes fail item by item.
    pub async fn fetch(&self, owner: &str) -> PortfolioResult<NetworkBalances> {
        let name = &self.network.name;

        let (native_raw, enumerated) = tokio::try_join!(
            self.provider.native_balance(owner),
            self.provider.token_balances(owner),
        )
        .map_err(|e| {
            warn!(network = %name, error = %e, "network balance fetch failed");
            PortfolioError::NetworkUnavailable {
                network: name.clone(),
                message: e.to_string(),
            }
        })?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut tokens: Vec<RawTokenBalance> = Vec::new();
        for entry in enumerated {
            let contract = canonical(&entry.contract_address);
            seen.insert(contract.clone());
            if entry.balance.is_zero() {
                continue;
            }
            tokens.push(RawTokenBalance {
                contract_address: contract,
                balance: entry.balance,
            });
        }

        let unprobed: Vec<&String> = self
            .network
            .tracked_tokens
            .iter()
            .filter(|t| !seen.contains(t.as_str()))
            .collect();
        if !unprobed.is_empty() {
            let probes = unprobed.iter().map(|contract| async move {
                (*contract, self.provider.balance_of(contract, owner).await)
            });
            for (contract, result) in join_all(probes).await {
                match result {
                    Ok(balance) if !balance.is_zero() => {
                        tokens.push(RawTokenBalance::new(contract, balance));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        debug!(network = %name, contract = %contract, error = %e, "tracked token probe failed");
                    }
                }
            }
        }

        debug!(
            network = %name,
            native = %native_raw,
            tokens = tokens.len(),
            "fetched network balances"
        );

        Ok(NetworkBalances {
            native: self.native_balance(native_raw),
            tokens,
        })
    }

    fn native_balance(&self, raw: U256) -> TokenBalance {
        TokenBalance {
            network: self.network.name.clone(),
            asset: AssetKey::Native,
            symbol: self.network.native_symbol.clone(),
            raw,
            decimals: self.network.native_decimals,
        }
    }
}
