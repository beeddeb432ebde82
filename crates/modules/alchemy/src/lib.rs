//! Alchemy JSON-RPC chain provider.

mod client;

pub use client::AlchemyRpc;
