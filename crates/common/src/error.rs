//! Universal error types for chainfolio.
//!
//! Structured error model. Every error carries:
//! - **code**: machine-readable error code (e.g. `INVALID_ADDRESS`)
//! - **category**: error class (`validation`, `network`, `timeout`, `upstream`, `config`, `system`)
//! - **recoverable**: whether the caller can retry or fix the request
//!
//! JSON output format:
//! ```json
//! {
//!   "ok": false,
//!   "error": {
//!     "code": "AGGREGATION_TIMEOUT",
//!     "message": "Aggregation exceeded deadline of 30000ms",
//!     "category": "timeout",
//!     "recoverable": true
//!   }
//! }
//! ```
//!
//! Only call-level variants ever reach an HTTP caller. `MetadataResolution`
//! and `PriceLookupMiss` are item-level: they are logged and the holding is
//! dropped from the snapshot.

use serde::Serialize;
use thiserror::Error;

/// Error category — determines the HTTP status and recovery strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Validation,
    Network,
    Upstream,
    Timeout,
    Config,
    System,
}

impl ErrorCategory {
    /// HTTP status code for this category.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCategory::Validation => 400,
            ErrorCategory::Upstream => 502,
            ErrorCategory::Network => 503,
            ErrorCategory::Timeout => 504,
            ErrorCategory::Config => 500,
            ErrorCategory::System => 500,
        }
    }
}

/// Structured error detail for JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    pub category: ErrorCategory,
    pub recoverable: bool,
}

/// Top-level error type for all chainfolio operations.
#[derive(Debug, Error)]
pub enum PortfolioError {
    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),

    // ── Item-level ───────────────────────────────────────────────────
    #[error("Metadata resolution failed for {contract} on {network}: {message}")]
    MetadataResolution {
        network: String,
        contract: String,
        message: String,
    },

    #[error("No price for {id}: {message}")]
    PriceLookupMiss { id: String, message: String },

    // ── Network ─────────────────────────────────────────────────────
    #[error("Network {network} unavailable: {message}")]
    NetworkUnavailable { network: String, message: String },

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Aggregation exceeded deadline of {0}ms")]
    AggregationTimeout(u64),

    // ── Config / System ─────────────────────────────────────────────
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PortfolioError {
    /// Get the structured error detail for JSON output.
    pub fn detail(&self) -> ErrorDetail {
        let (code, category, recoverable) = match self {
            PortfolioError::InvalidAddress(_) => ("INVALID_ADDRESS", ErrorCategory::Validation, true),
            PortfolioError::UnsupportedNetwork(_) => {
                ("UNSUPPORTED_NETWORK", ErrorCategory::Validation, true)
            }
            PortfolioError::MetadataResolution { .. } => {
                ("METADATA_RESOLUTION_FAILURE", ErrorCategory::Upstream, false)
            }
            PortfolioError::PriceLookupMiss { .. } => {
                ("PRICE_LOOKUP_MISS", ErrorCategory::Upstream, true)
            }
            PortfolioError::NetworkUnavailable { .. } => {
                ("NETWORK_UNAVAILABLE", ErrorCategory::Network, true)
            }
            PortfolioError::Rpc(_) => ("RPC_ERROR", ErrorCategory::Network, true),
            PortfolioError::Upstream(_) => ("UPSTREAM_ERROR", ErrorCategory::Upstream, true),
            PortfolioError::AggregationTimeout(_) => {
                ("AGGREGATION_TIMEOUT", ErrorCategory::Timeout, true)
            }
            PortfolioError::Config(_) => ("CONFIG_ERROR", ErrorCategory::Config, false),
            PortfolioError::Internal(_) => ("INTERNAL_ERROR", ErrorCategory::System, false),
        };

        ErrorDetail {
            code: code.into(),
            message: self.to_string(),
            category,
            recoverable,
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> String {
        self.detail().code
    }

    /// HTTP status for this error.
    pub fn http_status(&self) -> u16 {
        self.detail().category.http_status()
    }

    /// Serialize this error as the JSON error envelope.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "ok": false,
            "error": self.detail(),
        })
    }
}

pub type PortfolioResult<T> = Result<T, PortfolioError>;
