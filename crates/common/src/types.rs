//! Domain types shared by the aggregation core, the upstream modules and
//! the HTTP surface.

use alloy::primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    NATIVE_DECIMALS, NETWORK_ARBITRUM, NETWORK_BASE, NETWORK_ETHEREUM, NETWORK_OPTIMISM,
    NETWORK_POLYGON,
};

// ═══════════════════════════════════════════════════════════════════════
//  NETWORK
// ═══════════════════════════════════════════════════════════════════════

/// Static facts about a supported chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkPreset {
    pub name: &'static str,
    pub native_symbol: &'static str,
    /// CoinGecko coin id of the native asset.
    pub native_price_id: &'static str,
    /// CoinGecko asset platform for contract prices.
    pub price_platform: &'static str,
    /// Alchemy subdomain, e.g. `eth-mainnet`.
    pub alchemy_slug: &'static str,
}

pub const NETWORK_PRESETS: &[NetworkPreset] = &[
    NetworkPreset {
        name: NETWORK_ETHEREUM,
        native_symbol: "ETH",
        native_price_id: "ethereum",
        price_platform: "ethereum",
        alchemy_slug: "eth-mainnet",
    },
    NetworkPreset {
        name: NETWORK_ARBITRUM,
        native_symbol: "ETH",
        native_price_id: "ethereum",
        price_platform: "arbitrum-one",
        alchemy_slug: "arb-mainnet",
    },
    NetworkPreset {
        name: NETWORK_BASE,
        native_symbol: "ETH",
        native_price_id: "ethereum",
        price_platform: "base",
        alchemy_slug: "base-mainnet",
    },
    NetworkPreset {
        name: NETWORK_OPTIMISM,
        native_symbol: "ETH",
        native_price_id: "ethereum",
        price_platform: "optimistic-ethereum",
        alchemy_slug: "opt-mainnet",
    },
    NetworkPreset {
        name: NETWORK_POLYGON,
        native_symbol: "POL",
        native_price_id: "polygon-ecosystem-token",
        price_platform: "polygon-pos",
        alchemy_slug: "polygon-mainnet",
    },
];

impl NetworkPreset {
    /// Look up a preset by network name (case-insensitive).
    pub fn find(name: &str) -> Option<&'static NetworkPreset> {
        NETWORK_PRESETS
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name.trim()))
    }
}

/// A configured chain: identity, RPC endpoint and pricing coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    pub rpc_url: String,
    pub native_symbol: String,
    pub native_price_id: String,
    #[serde(default = "default_native_decimals")]
    pub native_decimals: u8,
    pub price_platform: String,
    /// Contracts always probed with `balanceOf`, even when the provider's
    /// enumeration does not report them. Stored lowercase.
    #[serde(default)]
    pub tracked_tokens: Vec<String>,
}

fn default_native_decimals() -> u8 {
    NATIVE_DECIMALS
}

impl Network {
    /// Build a network from its preset.
    pub fn from_preset(preset: &NetworkPreset, rpc_url: impl Into<String>) -> Self {
        Self {
            name: preset.name.to_string(),
            rpc_url: rpc_url.into(),
            native_symbol: preset.native_symbol.to_string(),
            native_price_id: preset.native_price_id.to_string(),
            native_decimals: NATIVE_DECIMALS,
            price_platform: preset.price_platform.to_string(),
            tracked_tokens: Vec::new(),
        }
    }

    pub fn with_tracked_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tracked_tokens = tokens
            .into_iter()
            .map(|t| crate::address::canonical(t.as_ref()))
            .filter(|t| !t.is_empty())
            .collect();
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  BALANCES & METADATA
// ═══════════════════════════════════════════════════════════════════════

/// Identity of a holding within a network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetKey {
    Native,
    /// Lowercase contract address.
    Contract(String),
}

impl AssetKey {
    pub fn contract(address: &str) -> Self {
        AssetKey::Contract(crate::address::canonical(address))
    }

    pub fn contract_address(&self) -> Option<&str> {
        match self {
            AssetKey::Native => None,
            AssetKey::Contract(addr) => Some(addr),
        }
    }
}

/// A nonzero token balance as reported by a chain provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTokenBalance {
    /// Lowercase contract address.
    pub contract_address: String,
    pub balance: U256,
}

impl RawTokenBalance {
    pub fn new(contract_address: &str, balance: U256) -> Self {
        Self {
            contract_address: crate::address::canonical(contract_address),
            balance,
        }
    }
}

/// Identity of a token contract. Immutable once observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub symbol: String,
    pub decimals: u8,
}

/// A raw on-chain holding, identified and ready to be priced.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBalance {
    pub network: String,
    pub asset: AssetKey,
    pub symbol: String,
    pub raw: U256,
    pub decimals: u8,
}

impl TokenBalance {
    /// Balance in whole units: `raw / 10^decimals`.
    pub fn amount(&self) -> f64 {
        to_decimal_amount(self.raw, self.decimals)
    }
}

/// Convert base units into a decimal amount.
pub fn to_decimal_amount(raw: U256, decimals: u8) -> f64 {
    let base: f64 = raw.to_string().parse().unwrap_or(0.0);
    base / 10f64.powi(i32::from(decimals))
}

// ═══════════════════════════════════════════════════════════════════════
//  OUTPUT
// ═══════════════════════════════════════════════════════════════════════

/// One priced holding in the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioEntry {
    pub symbol: String,
    pub network: String,
    /// `None` for the network's native asset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
    pub balance: f64,
    pub price: f64,
    pub value: f64,
}

/// A configured network that could not be read during one aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkFailure {
    pub network: String,
    pub code: String,
    pub message: String,
}

/// The complete priced view of one address across the selected networks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSnapshot {
    pub address: String,
    pub tokens: Vec<PortfolioEntry>,
    pub total: f64,
    pub fetched_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<NetworkFailure>,
}
