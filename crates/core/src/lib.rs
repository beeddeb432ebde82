// ── Configuration ──
pub mod config;

// ── Aggregation pipeline ──
pub mod aggregator;
pub mod fetcher;
pub mod metadata;
pub mod oracle;
pub mod rate_limit;

#[cfg(test)]
mod test_support;

pub use aggregator::PortfolioAggregator;
pub use config::AppConfig;
pub use fetcher::NetworkBalanceFetcher;
pub use metadata::TokenMetadataResolver;
pub use oracle::{PriceBook, PriceOracleClient};
pub use rate_limit::IntervalGate;
