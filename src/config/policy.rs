//! Cache Policy Types
//!
//! Defines the fully resolved per-key policy and the partial override layer
//! used by the global → group → key inheritance chain.

use serde::{Deserialize, Serialize};

// == Constants ==
/// Fallback TTL in seconds for keys without a policy or explicit override.
pub const DEFAULT_TTL: u64 = 3600;

// == Policy Config ==
/// Fully resolved caching policy for one key.
///
/// Immutable once resolved; built exactly once at configuration load by
/// merging the global, group and key layers field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// TTL in seconds for stored values
    pub ttl: u64,
    /// Whether "producer returned nothing" is cached as a null sentinel
    pub enable_null_cache: bool,
    /// TTL in seconds for the null sentinel (kept short on purpose)
    pub null_cache_ttl: u64,
    /// Upper bound of random jitter (in seconds) added to the TTL on write
    pub ttl_random_range: u64,
    /// Whether hit/miss/set/delete statistics are recorded for this key
    pub enable_stats: bool,
    /// Whether frequently accessed keys get their TTL extended on hits
    pub hot_key_auto_renewal: bool,
    /// Access-frequency threshold above which a key counts as hot
    pub hot_key_threshold: u64,
    /// Target TTL in seconds when extending a hot key
    pub hot_key_extend_ttl: u64,
    /// Hard ceiling for any renewed TTL
    pub hot_key_max_ttl: u64,
    /// Optional namespace prefix for this key's frequency counter
    pub tag_prefix: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            enable_null_cache: false,
            null_cache_ttl: 60,
            ttl_random_range: 0,
            enable_stats: true,
            hot_key_auto_renewal: false,
            hot_key_threshold: 100,
            hot_key_extend_ttl: 1800,
            hot_key_max_ttl: 7200,
            tag_prefix: String::new(),
        }
    }
}

// == Policy Override ==
/// Partial policy layer as written in the configuration source.
///
/// Every field is optional; a set field overrides the same field of the
/// layer below it, an unset field inherits. Used for the `global:` block
/// and for group-level and key-level `cache:` blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyOverride {
    #[serde(default)]
    pub ttl: Option<u64>,
    #[serde(default)]
    pub enable_null_cache: Option<bool>,
    #[serde(default)]
    pub null_cache_ttl: Option<u64>,
    #[serde(default)]
    pub ttl_random_range: Option<u64>,
    #[serde(default)]
    pub enable_stats: Option<bool>,
    #[serde(default)]
    pub hot_key_auto_renewal: Option<bool>,
    #[serde(default)]
    pub hot_key_threshold: Option<u64>,
    #[serde(default)]
    pub hot_key_extend_ttl: Option<u64>,
    #[serde(default)]
    pub hot_key_max_ttl: Option<u64>,
    #[serde(default)]
    pub tag_prefix: Option<String>,
}

impl PolicyOverride {
    // == Apply ==
    /// Merges this override onto a base policy, field by field.
    ///
    /// Set fields win; unset fields keep the base value. This is a shallow
    /// key-wise override, never whole-object replacement.
    pub fn apply(&self, base: &PolicyConfig) -> PolicyConfig {
        PolicyConfig {
            ttl: self.ttl.unwrap_or(base.ttl),
            enable_null_cache: self.enable_null_cache.unwrap_or(base.enable_null_cache),
            null_cache_ttl: self.null_cache_ttl.unwrap_or(base.null_cache_ttl),
            ttl_random_range: self.ttl_random_range.unwrap_or(base.ttl_random_range),
            enable_stats: self.enable_stats.unwrap_or(base.enable_stats),
            hot_key_auto_renewal: self
                .hot_key_auto_renewal
                .unwrap_or(base.hot_key_auto_renewal),
            hot_key_threshold: self.hot_key_threshold.unwrap_or(base.hot_key_threshold),
            hot_key_extend_ttl: self.hot_key_extend_ttl.unwrap_or(base.hot_key_extend_ttl),
            hot_key_max_ttl: self.hot_key_max_ttl.unwrap_or(base.hot_key_max_ttl),
            tag_prefix: self
                .tag_prefix
                .clone()
                .unwrap_or_else(|| base.tag_prefix.clone()),
        }
    }
}
