//! In-process cache layer — TTL-based caching for upstream responses.

use std::time::Duration;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;

struct Entry {
    expires_at: Instant,
    value: serde_json::Value,
}

/// JSON values with a per-entry TTL. Expired entries are dropped on read.
#[derive(Default)]
pub struct Cache {
    entries: DashMap<String, Entry>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a live value, deserializing from JSON.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let hit = self.entries.get(key).map(|e| (e.expires_at, e.value.clone()));
        match hit {
            Some((expires_at, value)) if Instant::now() < expires_at => {
                serde_json::from_value(value).ok()
            }
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Set a value with TTL, serializing to JSON.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> anyhow::Result<()> {
        let value = serde_json::to_value(value)?;
        self.entries.insert(
            key.to_string(),
            Entry {
                expires_at: Instant::now() + ttl,
                value,
            },
        );
        tracing::debug!("cache SET {key} (ttl={}s)", ttl.as_secs());
        Ok(())
    }

    /// Build a cache key with namespace.
    pub fn key(namespace: &str, parts: &[&str]) -> String {
        format!("chainfolio:{}:{}", namespace, parts.join(":"))
    }
}
