//! Driver Module
//!
//! Contract for the external key-value store the orchestrator sits in
//! front of, plus an in-process reference implementation.

mod memory;

pub use memory::MemoryDriver;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;

// == Driver Trait ==
/// Pluggable storage backend.
///
/// All primitive operations must be atomic at the backend for the
/// orchestrator's concurrency guarantees to hold. TTL introspection
/// (`ttl`/`expire`) is an optional capability: implementations that cannot
/// support it return `false` from [`supports_expiry`](Driver::supports_expiry),
/// which silently disables hot-key renewal.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Reads raw bytes for a key; `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Bulk read; the result contains only the keys that were present.
    async fn get_multiple(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>>;

    /// Stores raw bytes with an optional TTL in seconds.
    async fn set(&self, key: &str, value: &[u8], ttl_seconds: Option<u64>) -> Result<bool>;

    /// Bulk write with one shared TTL; `true` only if every entry was stored.
    async fn set_multiple(
        &self,
        entries: &HashMap<String, Vec<u8>>,
        ttl_seconds: Option<u64>,
    ) -> Result<bool>;

    /// Removes a key; `true` if it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Checks for a live (non-expired) entry.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Atomically adds `delta` to a counter and returns the new value.
    ///
    /// A delta of zero reads the counter without changing it. Missing
    /// counters start at zero.
    async fn incr(&self, key: &str, delta: i64) -> Result<i64>;

    /// Remaining TTL in seconds.
    ///
    /// Returns `-2` for a missing or expired key and `-1` for a key with
    /// no expiry; both are ≤ 0 and mean "nothing to renew".
    async fn ttl(&self, key: &str) -> Result<i64>;

    /// Replaces a live key's expiry; `true` if the key existed.
    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<bool>;

    /// Bulk expiry update; returns how many keys were updated.
    ///
    /// The default implementation loops [`expire`](Driver::expire); backends
    /// with a native bulk operation should override it.
    async fn expire_multiple(&self, keys: &[String], ttl_seconds: u64) -> Result<u64> {
        let mut updated = 0;
        for key in keys {
            if self.expire(key, ttl_seconds).await? {
                updated += 1;
            }
        }
        Ok(updated)
    }

    /// Lists live keys matching a `*`-wildcard pattern.
    async fn scan(&self, pattern: &str) -> Result<Vec<String>>;

    /// Deletes all keys matching a `*`-wildcard pattern; returns the count.
    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64>;

    /// Whether `ttl`/`expire` are supported.
    fn supports_expiry(&self) -> bool {
        true
    }
}
