//! Universal constants for chainfolio.

/// Decimals of the native asset on every EVM network in scope.
pub const NATIVE_DECIMALS: u8 = 18;

/// Quote currency for every price lookup.
pub const VS_CURRENCY: &str = "usd";

/// Minimum spacing between upstream price requests (milliseconds).
/// Keeps the free CoinGecko tier from throttling us.
pub const DEFAULT_PRICE_SPACING_MS: u64 = 1200;

/// Maximum contract addresses folded into one token-price request.
pub const DEFAULT_PRICE_BATCH_SIZE: usize = 25;

/// Concurrent metadata resolutions per network.
pub const DEFAULT_METADATA_CONCURRENCY: usize = 4;

/// Deadline for a whole aggregation call (seconds).
pub const DEFAULT_AGGREGATION_TIMEOUT_SECS: u64 = 30;

/// TTL of the market-listing passthrough cache (seconds).
pub const DEFAULT_MARKET_CACHE_TTL_SECS: u64 = 60;

/// Networks aggregated when nothing is configured.
pub const DEFAULT_NETWORKS: &[&str] = &["ethereum", "arbitrum"];

/// Network identifiers.
pub const NETWORK_ETHEREUM: &str = "ethereum";
pub const NETWORK_ARBITRUM: &str = "arbitrum";
pub const NETWORK_BASE: &str = "base";
pub const NETWORK_OPTIMISM: &str = "optimism";
pub const NETWORK_POLYGON: &str = "polygon";
