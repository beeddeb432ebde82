//! Token identity resolution with a process-lifetime cache.
//!
//! Metadata is immutable once observed: entries are never evicted or
//! refreshed. Concurrent misses on the same key may both read the chain;
//! the results are identical, so whichever write lands last is fine.
//! Failed reads are not cached, so a flaky RPC gets another chance next run.

use chainfolio_common::address::canonical;
use chainfolio_common::error::{PortfolioError, PortfolioResult};
use chainfolio_common::traits::TokenContract;
use chainfolio_common::types::TokenMetadata;
use dashmap::DashMap;
use tracing::debug;

#[derive(Default)]
pub struct TokenMetadataResolver {
    /// (network, lowercase contract) → metadata.
    cache: DashMap<(String, String), TokenMetadata>,
}

impl TokenMetadataResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `{symbol, decimals}` for a contract on `network`.
    ///
    /// Returns `MetadataResolution` when the contract does not answer both
    /// `decimals()` and `symbol()`; callers drop the token.
    pub async fn resolve<R>(
        &self,
        network: &str,
        reader: &R,
        contract: &str,
    ) -> PortfolioResult<TokenMetadata>
    where
        R: TokenContract + ?Sized,
    {
        let key = (network.to_string(), canonical(contract));
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.value().clone());
        }

        let (decimals, symbol) = tokio::try_join!(reader.decimals(&key.1), reader.symbol(&key.1))
            .map_err(|e| PortfolioError::MetadataResolution {
                network: network.to_string(),
                contract: key.1.clone(),
                message: e.to_string(),
            })?;

        let metadata = TokenMetadata {
            symbol: symbol.trim().to_string(),
            decimals,
        };
        debug!(network = %network, contract = %key.1, symbol = %metadata.symbol, decimals, "resolved token metadata");
        self.cache.insert(key, metadata.clone());
        Ok(metadata)
    }

    /// Cached entry, if any.
    pub fn cached(&self, network: &str, contract: &str) -> Option<TokenMetadata> {
        self.cache
            .get(&(network.to_string(), canonical(contract)))
            .map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
