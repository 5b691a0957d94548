//! In-Memory Driver
//!
//! Reference driver backed by a HashMap with epoch-millisecond expiry.
//! Expired entries are dropped lazily on access; the background sweeper in
//! [`crate::tasks`] reclaims the rest.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::driver::Driver;
use crate::error::{CacheError, Result};

// == Store Entry ==
/// One stored value with optional expiry.
#[derive(Debug, Clone)]
struct StoreEntry {
    /// Raw value bytes
    value: Vec<u8>,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    expires_at: Option<u64>,
}

impl StoreEntry {
    fn new(value: Vec<u8>, ttl_seconds: Option<u64>) -> Self {
        let expires_at = ttl_seconds.map(|ttl| current_timestamp_ms() + ttl * 1000);
        Self { value, expires_at }
    }

    /// An entry is expired once the current time reaches its expiry.
    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => current_timestamp_ms() >= expires,
            None => false,
        }
    }

    /// Remaining TTL in whole seconds, rounded up so a live entry never
    /// reports zero.
    fn ttl_remaining_secs(&self) -> i64 {
        match self.expires_at {
            Some(expires) => {
                let now = current_timestamp_ms();
                if expires > now {
                    ((expires - now) as i64 + 999) / 1000
                } else {
                    -2
                }
            }
            None => -1,
        }
    }
}

/// Returns current Unix timestamp in milliseconds.
fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}

// == Memory Driver ==
/// In-process [`Driver`] implementation.
///
/// Counters share the key space with regular entries and are mutated under
/// the write lock, which makes `incr` atomic.
#[derive(Debug, Default)]
pub struct MemoryDriver {
    entries: RwLock<HashMap<String, StoreEntry>>,
}

impl MemoryDriver {
    // == Constructor ==
    /// Creates an empty driver.
    pub fn new() -> Self {
        Self::default()
    }

    // == Cleanup Expired ==
    /// Removes all expired entries; returns the number removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        before - entries.len()
    }

    // == Length ==
    /// Current number of entries, expired ones included until swept.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => Ok(Some(entry.value.clone())),
            _ => Ok(None),
        }
    }

    async fn get_multiple(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        let entries = self.entries.read().await;
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = entries.get(key) {
                if !entry.is_expired() {
                    found.insert(key.clone(), entry.value.clone());
                }
            }
        }
        Ok(found)
    }

    async fn set(&self, key: &str, value: &[u8], ttl_seconds: Option<u64>) -> Result<bool> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), StoreEntry::new(value.to_vec(), ttl_seconds));
        Ok(true)
    }

    async fn set_multiple(
        &self,
        batch: &HashMap<String, Vec<u8>>,
        ttl_seconds: Option<u64>,
    ) -> Result<bool> {
        let mut entries = self.entries.write().await;
        for (key, value) in batch {
            entries.insert(key.clone(), StoreEntry::new(value.clone(), ttl_seconds));
        }
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        Ok(entries.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).map(|e| !e.is_expired()).unwrap_or(false))
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64> {
        let mut entries = self.entries.write().await;

        let current = match entries.get(key) {
            Some(entry) if !entry.is_expired() => std::str::from_utf8(&entry.value)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| {
                    CacheError::Driver(format!("key '{key}' does not hold a counter"))
                })?,
            _ => 0,
        };

        let updated = current + delta;
        if delta != 0 {
            entries.insert(
                key.to_string(),
                StoreEntry::new(updated.to_string().into_bytes(), None),
            );
        }
        Ok(updated)
    }

    async fn ttl(&self, key: &str) -> Result<i64> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => Ok(entry.ttl_remaining_secs()),
            _ => Ok(-2),
        }
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<bool> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                entry.expires_at = Some(current_timestamp_ms() + ttl_seconds * 1000);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired() && wildcard_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !wildcard_match(pattern, key));
        Ok((before - entries.len()) as u64)
    }
}

// == Wildcard Matching ==
/// Matches a key against a pattern where `*` spans any character sequence.
fn wildcard_match(pattern: &str, input: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == input;
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let mut pos = 0;

    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            // Anchored prefix
            if !input.starts_with(part) {
                return false;
            }
            pos = part.len();
        } else if i == parts.len() - 1 {
            // Anchored suffix, must not overlap already-consumed input
            return input.len() >= pos + part.len() && input.ends_with(part);
        } else {
            match input[pos..].find(part) {
                Some(idx) => pos = pos + idx + part.len(),
                None => return false,
            }
        }
    }

    // Pattern ended with '*'
    true
}
