//! Portfolio aggregation — the one place with real concurrency.
//!
//! ```text
//! validate address
//!   └─ JoinSet: one task per selected network
//!        ├─ NetworkBalanceFetcher::fetch
//!        └─ TokenMetadataResolver::resolve  (buffered, bounded per network)
//!   └─ join all, record failed networks
//!   └─ PriceOracleClient: one native batch + one contract batch per network
//!   └─ merge → filter → dedup → order → total
//! ```
//!
//! The whole call runs under one deadline. When it fires, the future is
//! dropped: the `JoinSet` aborts its tasks and in-flight HTTP futures are
//! dropped with them.
//!
//! A network that cannot be read is reported in `snapshot.errors` and the
//! remaining networks are still returned. Only when every selected network
//! fails does the call fail with `NetworkUnavailable`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chainfolio_common::address::validate_address;
use chainfolio_common::error::{PortfolioError, PortfolioResult};
use chainfolio_common::types::{
    AssetKey, Network, NetworkFailure, PortfolioEntry, PortfolioSnapshot, RawTokenBalance,
    TokenBalance,
};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::AggregationConfig;
use crate::fetcher::NetworkBalanceFetcher;
use crate::metadata::TokenMetadataResolver;
use crate::oracle::{PriceBook, PriceOracleClient};

/// Holdings of one network after identity resolution: native first, then
/// tokens in first-observed order.
pub type NetworkHoldings = (Network, Vec<TokenBalance>);

pub struct PortfolioAggregator {
    fetchers: Vec<Arc<NetworkBalanceFetcher>>,
    resolver: Arc<TokenMetadataResolver>,
    oracle: Arc<PriceOracleClient>,
    deadline: Duration,
    metadata_concurrency: usize,
}

impl PortfolioAggregator {
    pub fn new(
        fetchers: Vec<NetworkBalanceFetcher>,
        oracle: PriceOracleClient,
        config: &AggregationConfig,
    ) -> Self {
        Self {
            fetchers: fetchers.into_iter().map(Arc::new).collect(),
            resolver: Arc::new(TokenMetadataResolver::new()),
            oracle: Arc::new(oracle),
            deadline: config.deadline(),
            metadata_concurrency: config.metadata_concurrency.max(1),
        }
    }

    /// Share a metadata cache with other aggregators.
    pub fn with_resolver(mut self, resolver: Arc<TokenMetadataResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn resolver(&self) -> &Arc<TokenMetadataResolver> {
        &self.resolver
    }

    /// Configured networks, in output order.
    pub fn networks(&self) -> Vec<&Network> {
        self.fetchers.iter().map(|f| f.network()).collect()
    }

    /// Snapshot of `address` across every configured network.
    pub async fn aggregate(&self, address: &str) -> PortfolioResult<PortfolioSnapshot> {
        self.aggregate_networks(address, &[]).await
    }

    /// Snapshot of `address` across a subset of the configured networks.
    /// An empty `only` selects all of them. Output keeps configured order.
    pub async fn aggregate_networks(
        &self,
        address: &str,
        only: &[String],
    ) -> PortfolioResult<PortfolioSnapshot> {
        let owner = validate_address(address)?;
        let selected = self.select(only)?;

        info!(address = %owner, networks = selected.len(), "aggregating portfolio");
        match tokio::time::timeout(self.deadline, self.run(owner.clone(), selected)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(address = %owner, deadline_ms = self.deadline.as_millis() as u64, "aggregation timed out");
                Err(PortfolioError::AggregationTimeout(
                    self.deadline.as_millis() as u64,
                ))
            }
        }
    }

    fn select(&self, only: &[String]) -> PortfolioResult<Vec<Arc<NetworkBalanceFetcher>>> {
        for name in only {
            if !self
                .fetchers
                .iter()
                .any(|f| f.network().name.eq_ignore_ascii_case(name.trim()))
            {
                return Err(PortfolioError::UnsupportedNetwork(name.clone()));
            }
        }

        Ok(self
            .fetchers
            .iter()
            .filter(|f| {
                only.is_empty()
                    || only
                        .iter()
                        .any(|n| f.network().name.eq_ignore_ascii_case(n.trim()))
            })
            .cloned()
            .collect())
    }

    async fn run(
        &self,
        owner: String,
        selected: Vec<Arc<NetworkBalanceFetcher>>,
    ) -> PortfolioResult<PortfolioSnapshot> {
        let mut tasks = JoinSet::new();
        for (idx, fetcher) in selected.iter().enumerate() {
            let fetcher = fetcher.clone();
            let resolver = self.resolver.clone();
            let owner = owner.clone();
            let bound = self.metadata_concurrency;
            tasks.spawn(async move { (idx, collect_network(fetcher, resolver, owner, bound).await) });
        }

        let mut outcomes: Vec<Option<PortfolioResult<Vec<TokenBalance>>>> =
            selected.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, outcome)) => outcomes[idx] = Some(outcome),
                Err(e) => warn!(error = %e, "network task did not complete"),
            }
        }

        let mut holdings: Vec<NetworkHoldings> = Vec::with_capacity(selected.len());
        let mut failures: Vec<NetworkFailure> = Vec::new();
        for (fetcher, outcome) in selected.iter().zip(outcomes) {
            let network = fetcher.network();
            match outcome {
                Some(Ok(balances)) => holdings.push((network.clone(), balances)),
                Some(Err(e)) => failures.push(NetworkFailure {
                    network: network.name.clone(),
                    code: e.code(),
                    message: e.to_string(),
                }),
                None => failures.push(NetworkFailure {
                    network: network.name.clone(),
                    code: "INTERNAL_ERROR".into(),
                    message: "network task did not complete".into(),
                }),
            }
        }

        if holdings.is_empty() {
            if let Some(first) = failures.first() {
                return Err(PortfolioError::NetworkUnavailable {
                    network: failures
                        .iter()
                        .map(|f| f.network.as_str())
                        .collect::<Vec<_>>()
                        .join(","),
                    message: first.message.clone(),
                });
            }
        }

        let book = self.price(&holdings).await;
        let snapshot = assemble_snapshot(owner, &holdings, &book, failures);
        info!(
            address = %snapshot.address,
            entries = snapshot.tokens.len(),
            total = snapshot.total,
            failed_networks = snapshot.errors.len(),
            "portfolio aggregated"
        );
        Ok(snapshot)
    }

    /// One native request for every distinct native id held, then one
    /// contract batch per network.
    async fn price(&self, holdings: &[NetworkHoldings]) -> PriceBook {
        let native_ids: Vec<String> = holdings
            .iter()
            .filter(|(_, balances)| {
                balances
                    .iter()
                    .any(|b| b.asset == AssetKey::Native && !b.raw.is_zero())
            })
            .map(|(network, _)| network.native_price_id.clone())
            .collect();
        let natives = self.oracle.native_prices(&native_ids).await;

        let mut book = PriceBook::new();
        for (network, _) in holdings {
            book.set_native(&network.name, &network.native_price_id, &natives);
        }

        let lookups = holdings.iter().filter_map(|(network, balances)| {
            let contracts: Vec<String> = balances
                .iter()
                .filter_map(|b| b.asset.contract_address().map(str::to_string))
                .collect();
            (!contracts.is_empty()).then(|| async move {
                let prices = self
                    .oracle
                    .prices_for_contracts(&network.price_platform, &contracts)
                    .await;
                (network.name.as_str(), prices)
            })
        });
        for (name, prices) in join_all(lookups).await {
            book.add_contracts(name, prices);
        }
        book
    }
}

/// Fetch one network and resolve identity for each of its tokens.
async fn collect_network(
    fetcher: Arc<NetworkBalanceFetcher>,
    resolver: Arc<TokenMetadataResolver>,
    owner: String,
    bound: usize,
) -> PortfolioResult<Vec<TokenBalance>> {
    let balances = fetcher.fetch(&owner).await?;
    let network = fetcher.network().name.clone();
    let provider = fetcher.provider().clone();

    let lookups = balances.tokens.into_iter().map(|raw: RawTokenBalance| {
        let resolver = resolver.clone();
        let provider = provider.clone();
        let network = network.clone();
        async move {
            match resolver
                .resolve(&network, provider.as_ref(), &raw.contract_address)
                .await
            {
                Ok(meta) => Some(TokenBalance {
                    network,
                    asset: AssetKey::Contract(raw.contract_address),
                    symbol: meta.symbol,
                    raw: raw.balance,
                    decimals: meta.decimals,
                }),
                Err(e) => {
                    debug!(error = %e, "dropping unidentified token");
                    None
                }
            }
        }
    });
    let resolved: Vec<Option<TokenBalance>> = stream::iter(lookups).buffered(bound).collect().await;

    let mut holdings = Vec::with_capacity(resolved.len() + 1);
    holdings.push(balances.native);
    holdings.extend(resolved.into_iter().flatten());
    Ok(holdings)
}

/// Price, filter, dedup and total the holdings.
///
/// `holdings` must already be in configured network order with the native
/// balance first in each network; the output keeps that order.
pub fn assemble_snapshot(
    owner: String,
    holdings: &[NetworkHoldings],
    book: &PriceBook,
    errors: Vec<NetworkFailure>,
) -> PortfolioSnapshot {
    let mut seen: HashSet<(String, AssetKey)> = HashSet::new();
    let mut tokens: Vec<PortfolioEntry> = Vec::new();

    for (network, balances) in holdings {
        for holding in balances {
            let balance = holding.amount();
            let price = book.price(&network.name, &holding.asset);
            let value = balance * price;
            if !(balance > 0.0 && value > 0.0) {
                continue;
            }
            if !seen.insert((network.name.clone(), holding.asset.clone())) {
                debug!(network = %network.name, asset = ?holding.asset, "duplicate holding dropped");
                continue;
            }
            tokens.push(PortfolioEntry {
                symbol: holding.symbol.clone(),
                network: network.name.clone(),
                contract_address: holding.asset.contract_address().map(str::to_string),
                balance,
                price,
                value,
            });
        }
    }

    let total = tokens.iter().map(|e| e.value).sum();
    PortfolioSnapshot {
        address: owner,
        tokens,
        total,
        fetched_at: chrono::Utc::now(),
        errors,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use alloy::primitives::U256;

    use super::*;
    use crate::test_support::*;

    const ETH_PRICE: f64 = 2000.0;

    struct Harness {
        chains: Vec<Arc<FakeChain>>,
        prices: Arc<FakePrices>,
        aggregator: PortfolioAggregator,
    }

    fn harness(networks: Vec<(Network, FakeChain)>, prices: FakePrices) -> Harness {
        let prices = Arc::new(prices);
        let mut chains = Vec::new();
        let mut fetchers = Vec::new();
        for (network, chain) in networks {
            let chain = Arc::new(chain);
            chains.push(chain.clone());
            fetchers.push(NetworkBalanceFetcher::new(network, chain));
        }
        let oracle = PriceOracleClient::new(prices.clone(), Duration::from_millis(1200), 25);
        let aggregator = PortfolioAggregator::new(fetchers, oracle, &AggregationConfig::default());
        Harness {
            chains,
            prices,
            aggregator,
        }
    }

    fn one_and_a_half_eth() -> U256 {
        units(3, 18) / U256::from(2u64)
    }

    fn assert_invariants(snapshot: &PortfolioSnapshot) {
        let mut keys = HashSet::new();
        let mut sum = 0.0;
        for entry in &snapshot.tokens {
            assert!(entry.balance > 0.0);
            assert!(entry.value > 0.0);
            assert!((entry.value - entry.balance * entry.price).abs() <= 1e-6 * entry.value);
            assert!(keys.insert((entry.network.clone(), entry.contract_address.clone())));
            sum += entry.value;
        }
        assert!((snapshot.total - sum).abs() <= 1e-6 * sum.max(1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_native_holding() {
        let h = harness(
            vec![(network("ethereum"), FakeChain::with_native(one_and_a_half_eth()))],
            FakePrices::default().native("ethereum", ETH_PRICE),
        );
        let snapshot = h
            .aggregator
            .aggregate("0xABCDEFABCDEFABCDEFABCDEFABCDEFABCDEFABCD")
            .await
            .unwrap();

        assert_eq!(
            snapshot.tokens,
            vec![PortfolioEntry {
                symbol: "ETH".into(),
                network: "ethereum".into(),
                contract_address: None,
                balance: 1.5,
                price: 2000.0,
                value: 3000.0,
            }]
        );
        assert_eq!(snapshot.total, 3000.0);
        assert_eq!(snapshot.address, OWNER);
        assert!(snapshot.errors.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_address_fails_before_any_rpc() {
        let h = harness(
            vec![(network("ethereum"), FakeChain::with_native(one_and_a_half_eth()))],
            FakePrices::default(),
        );
        let err = h.aggregator.aggregate("0x1234").await.unwrap_err();
        assert_eq!(err.code(), "INVALID_ADDRESS");
        assert_eq!(h.chains[0].enumerate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unpriced_token_disappears_without_error() {
        let chain = FakeChain::default()
            .token(USDC, units(250, 6), "USDC", 6)
            .token(USDT, units(100, 6), "USDT", 6);
        let h = harness(
            vec![(network("ethereum"), chain)],
            FakePrices::default().contract("ethereum", USDC, 1.0),
        );
        let snapshot = h.aggregator.aggregate(OWNER).await.unwrap();

        assert_eq!(snapshot.tokens.len(), 1);
        assert_eq!(snapshot.tokens[0].symbol, "USDC");
        assert_eq!(snapshot.tokens[0].contract_address.as_deref(), Some(USDC));
        assert_eq!(snapshot.total, 250.0);
        assert_invariants(&snapshot);
    }

    #[tokio::test(start_paused = true)]
    async fn test_case_different_duplicates_collapse() {
        let chain = FakeChain::default()
            .token(USDC, units(10, 6), "USDC", 6)
            .raw_token(&USDC.to_ascii_uppercase().replace("0X", "0x"), units(10, 6));
        let h = harness(
            vec![(network("ethereum"), chain)],
            FakePrices::default().contract("ethereum", USDC, 1.0),
        );
        let snapshot = h.aggregator.aggregate(OWNER).await.unwrap();

        assert_eq!(snapshot.tokens.len(), 1);
        assert_eq!(snapshot.total, 10.0);
        assert_invariants(&snapshot);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_network_is_reported_and_others_survive() {
        let h = harness(
            vec![
                (network("ethereum"), FakeChain::with_native(one_and_a_half_eth())),
                (network("arbitrum"), FakeChain::failing()),
            ],
            FakePrices::default().native("ethereum", ETH_PRICE),
        );
        let snapshot = h.aggregator.aggregate(OWNER).await.unwrap();

        assert_eq!(snapshot.tokens.len(), 1);
        assert_eq!(snapshot.tokens[0].network, "ethereum");
        assert_eq!(snapshot.total, 3000.0);
        assert_eq!(snapshot.errors.len(), 1);
        assert_eq!(snapshot.errors[0].network, "arbitrum");
        assert_eq!(snapshot.errors[0].code, "NETWORK_UNAVAILABLE");
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_network_failing_is_an_error() {
        let h = harness(
            vec![
                (network("ethereum"), FakeChain::failing()),
                (network("arbitrum"), FakeChain::failing()),
            ],
            FakePrices::default(),
        );
        let err = h.aggregator.aggregate(OWNER).await.unwrap_err();
        assert_eq!(err.code(), "NETWORK_UNAVAILABLE");
        assert!(err.to_string().contains("ethereum,arbitrum"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_yields_timeout_and_no_snapshot() {
        let h = harness(
            vec![
                (network("ethereum"), FakeChain::with_native(one_and_a_half_eth())),
                (network("arbitrum"), FakeChain::hanging()),
            ],
            FakePrices::default().native("ethereum", ETH_PRICE),
        );
        let aggregator = h.aggregator.with_deadline(Duration::from_secs(2));
        let started = tokio::time::Instant::now();
        let err = aggregator.aggregate(OWNER).await.unwrap_err();

        assert_eq!(err.code(), "AGGREGATION_TIMEOUT");
        assert!(matches!(err, PortfolioError::AggregationTimeout(2000)));
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(2) && waited < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_is_configured_not_completion_order() {
        let mut slow_eth = FakeChain::with_native(one_and_a_half_eth())
            .token(USDT, units(5, 6), "USDT", 6)
            .token(USDC, units(7, 6), "USDC", 6);
        slow_eth.metadata_delay = Some(Duration::from_secs(3));
        let fast_arb = FakeChain::with_native(units(1, 18)).token(WETH_ARB, units(2, 18), "WETH", 18);

        let h = harness(
            vec![(network("ethereum"), slow_eth), (network("arbitrum"), fast_arb)],
            FakePrices::default()
                .native("ethereum", ETH_PRICE)
                .contract("ethereum", USDC, 1.0)
                .contract("ethereum", USDT, 1.0)
                .contract("arbitrum-one", WETH_ARB, ETH_PRICE),
        );
        let snapshot = h.aggregator.aggregate(OWNER).await.unwrap();

        let order: Vec<(&str, &str)> = snapshot
            .tokens
            .iter()
            .map(|e| (e.network.as_str(), e.symbol.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("ethereum", "ETH"),
                ("ethereum", "USDT"),
                ("ethereum", "USDC"),
                ("arbitrum", "ETH"),
                ("arbitrum", "WETH"),
            ]
        );
        assert_eq!(snapshot.total, 3000.0 + 5.0 + 7.0 + 2000.0 + 4000.0);
        assert_invariants(&snapshot);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_native_id_priced_once() {
        let h = harness(
            vec![
                (network("ethereum"), FakeChain::with_native(units(1, 18))),
                (network("arbitrum"), FakeChain::with_native(units(2, 18))),
            ],
            FakePrices::default().native("ethereum", ETH_PRICE),
        );
        let snapshot = h.aggregator.aggregate(OWNER).await.unwrap();

        assert_eq!(snapshot.total, 6000.0);
        assert_eq!(
            *h.prices.native_requests.lock().unwrap(),
            vec![vec!["ethereum".to_string()]]
        );
        assert_eq!(h.prices.token_request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_token_contract_dropped() {
        let chain = FakeChain::with_native(units(1, 18))
            .raw_token("0x000000000000000000000000000000000000dead", units(1, 18))
            .token(USDC, units(3, 6), "USDC", 6);
        let h = harness(
            vec![(network("ethereum"), chain)],
            FakePrices::default()
                .native("ethereum", ETH_PRICE)
                .contract("ethereum", USDC, 1.0),
        );
        let snapshot = h.aggregator.aggregate(OWNER).await.unwrap();

        let symbols: Vec<&str> = snapshot.tokens.iter().map(|e| e.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["ETH", "USDC"]);
        let requests = h.prices.token_requests.lock().unwrap();
        assert_eq!(requests[0].1, vec![USDC.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_metadata_resolution_is_bounded() {
        let mut chain = FakeChain::default();
        for i in 0..12u64 {
            let contract = format!("0x{:040x}", 0x1000 + i);
            chain = chain.token(&contract, units(1, 18), &format!("T{i}"), 18);
        }
        chain.metadata_delay = Some(Duration::from_millis(500));
        let h = harness(vec![(network("ethereum"), chain)], FakePrices::default());
        h.aggregator.aggregate(OWNER).await.unwrap();

        // Two reads (decimals + symbol) per token in flight.
        let peak = h.chains[0].max_in_flight.load(Ordering::SeqCst);
        assert!(peak <= 2 * AggregationConfig::default().metadata_concurrency, "peak {peak}");
        assert!(peak >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_metadata_cached_across_calls() {
        let chain = FakeChain::default().token(USDC, units(3, 6), "USDC", 6);
        let h = harness(
            vec![(network("ethereum"), chain)],
            FakePrices::default().contract("ethereum", USDC, 1.0),
        );
        h.aggregator.aggregate(OWNER).await.unwrap();
        h.aggregator.aggregate(OWNER).await.unwrap();

        assert_eq!(h.chains[0].decimals_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.aggregator.resolver().len(), 1);
        // Prices are never cached across calls.
        assert_eq!(h.prices.token_request_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_subset_selection() {
        let h = harness(
            vec![
                (network("ethereum"), FakeChain::with_native(units(1, 18))),
                (network("arbitrum"), FakeChain::with_native(units(2, 18))),
            ],
            FakePrices::default().native("ethereum", ETH_PRICE),
        );
        let snapshot = h
            .aggregator
            .aggregate_networks(OWNER, &["Arbitrum".to_string()])
            .await
            .unwrap();
        assert_eq!(snapshot.tokens.len(), 1);
        assert_eq!(snapshot.tokens[0].network, "arbitrum");
        assert_eq!(h.chains[0].enumerate_calls.load(Ordering::SeqCst), 0);

        let err = h
            .aggregator
            .aggregate_networks(OWNER, &["solana".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_NETWORK");
    }

    #[test]
    fn test_assemble_drops_non_positive_and_keeps_first_duplicate() {
        let net = network("ethereum");
        let holding = |symbol: &str, asset: AssetKey, raw: U256| TokenBalance {
            network: "ethereum".into(),
            asset,
            symbol: symbol.into(),
            raw,
            decimals: 6,
        };
        let holdings = vec![(
            net,
            vec![
                holding("ETH", AssetKey::Native, U256::ZERO),
                holding("USDC", AssetKey::contract(USDC), units(4, 6)),
                holding("USDC.e", AssetKey::contract(USDC), units(9, 6)),
                holding("USDT", AssetKey::contract(USDT), units(1, 6)),
            ],
        )];
        let mut book = PriceBook::new();
        book.add_contracts(
            "ethereum",
            [(USDC.to_string(), 1.0), (USDT.to_string(), 0.0)].into_iter().collect(),
        );

        let snapshot = assemble_snapshot(OWNER.into(), &holdings, &book, Vec::new());
        assert_eq!(snapshot.tokens.len(), 1);
        assert_eq!(snapshot.tokens[0].symbol, "USDC");
        assert_eq!(snapshot.tokens[0].balance, 4.0);
        assert_eq!(snapshot.total, 4.0);
    }
}
