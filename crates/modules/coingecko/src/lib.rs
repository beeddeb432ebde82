//! CoinGecko price source and market listing.

mod client;

pub use client::{CoinGeckoClient, CoinGeckoTier};
