//! Address validation and canonicalization.
//!
//! Every address used as a lookup or dedup key is lowercase `0x`-prefixed hex.

use alloy::primitives::Address;

use crate::error::{PortfolioError, PortfolioResult};

/// Canonical form of an EVM address string: trimmed, lowercase.
pub fn canonical(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

/// Validate a user-supplied wallet address and return its canonical form.
///
/// Accepts `0x` + 40 hex digits. Mixed-case input must carry a valid
/// EIP-55 checksum; all-lowercase and all-uppercase input is accepted as is.
pub fn validate_address(input: &str) -> PortfolioResult<String> {
    let trimmed = input.trim();
    let invalid = || PortfolioError::InvalidAddress(trimmed.to_string());

    let hex = trimmed.strip_prefix("0x").ok_or_else(invalid)?;
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let has_lower = hex.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        Address::parse_checksummed(trimmed, None).map_err(|_| invalid())?;
    }

    Ok(canonical(trimmed))
}

/// Parse a canonical address string into an alloy [`Address`].
pub fn parse_address(input: &str) -> PortfolioResult<Address> {
    input
        .trim()
        .parse::<Address>()
        .map_err(|_| PortfolioError::InvalidAddress(input.to_string()))
}
