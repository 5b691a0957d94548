//! Cache Orchestrator
//!
//! The cache-aside engine. Every operation takes a [`ResolvedCacheKey`]
//! carrying its merged policy, reads or writes through the [`Driver`], and
//! applies the policy: TTL resolution, null-sentinel caching, hot-key TTL
//! renewal and statistics.
//!
//! The orchestrator holds no mutable state of its own; counters are
//! delegated to the driver, so one instance is safe to share across tasks
//! and processes as long as the driver's primitives are atomic.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{CacheConfig, PolicyConfig, DEFAULT_TTL};
use crate::driver::Driver;
use crate::error::{CacheError, Result};
use crate::stats::StatsTracker;
use crate::template::{
    CacheKeyResolver, KeyTemplateRegistry, Params, ResolvedCacheKey,
};

// == Constants ==
/// Reserved stored value meaning "the producer returned no value".
///
/// Real payloads are JSON-encoded, so these raw bytes can never collide
/// with a cached value.
pub const NULL_SENTINEL: &[u8] = b"__cachekey_null__";

// == Cached Outcome ==
/// Result of a cache read, keeping "cached as empty" and "never cached"
/// apart instead of overloading a null value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cached<T> {
    /// A cached or freshly produced value
    Value(T),
    /// The null sentinel: a producer previously reported no value
    Empty,
    /// Never cached, and no producer was supplied
    Missing,
}

impl<T> Cached<T> {
    /// Collapses the outcome into an `Option`, losing the
    /// `Empty`/`Missing` distinction.
    pub fn into_option(self) -> Option<T> {
        match self {
            Cached::Value(value) => Some(value),
            Cached::Empty | Cached::Missing => None,
        }
    }

    /// Borrows the value when present.
    pub fn value(&self) -> Option<&T> {
        match self {
            Cached::Value(value) => Some(value),
            _ => None,
        }
    }

    /// True for `Cached::Value`.
    pub fn is_value(&self) -> bool {
        matches!(self, Cached::Value(_))
    }

    /// True for `Cached::Empty`.
    pub fn is_empty(&self) -> bool {
        matches!(self, Cached::Empty)
    }

    /// True for `Cached::Missing`.
    pub fn is_missing(&self) -> bool {
        matches!(self, Cached::Missing)
    }
}

// == Cache Orchestrator ==
/// Cache-aside orchestration over a pluggable driver.
///
/// Constructed from a resolved configuration and a driver handle; callers
/// hold the instance and pass it where needed, there is no process-wide
/// accessor.
pub struct CacheOrchestrator {
    driver: Arc<dyn Driver>,
    resolver: CacheKeyResolver,
    stats: StatsTracker,
}

impl CacheOrchestrator {
    // == Constructor ==
    /// Builds an orchestrator from a resolved configuration.
    pub fn new(config: CacheConfig, driver: Arc<dyn Driver>) -> Self {
        let stats = StatsTracker::new(
            Arc::clone(&driver),
            config.app_prefix.clone(),
            config.separator.clone(),
        );
        let registry = Arc::new(KeyTemplateRegistry::new(&config));

        Self {
            driver,
            resolver: CacheKeyResolver::new(registry),
            stats,
        }
    }

    // == Accessors ==
    /// The key resolver, for callers that want to render keys up front.
    pub fn resolver(&self) -> &CacheKeyResolver {
        &self.resolver
    }

    /// The statistics tracker.
    pub fn stats(&self) -> &StatsTracker {
        &self.stats
    }

    // == Resolve ==
    /// Renders a `group.key` template name into a [`ResolvedCacheKey`].
    pub fn resolve(&self, name: &str, params: &Params) -> Result<ResolvedCacheKey> {
        self.resolver.render(name, params)
    }

    /// Renders a batch of parameter maps for one template name.
    pub fn resolve_many(
        &self,
        name: &str,
        params_list: &[serde_json::Value],
    ) -> Result<HashMap<String, ResolvedCacheKey>> {
        self.resolver.render_many(name, params_list)
    }

    // == Get ==
    /// Plain cache read. Returns [`Cached::Missing`] on a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &ResolvedCacheKey) -> Result<Cached<T>> {
        self.probe(key).await
    }

    /// Cache-aside read: on a miss the producer runs once and its result is
    /// cached with the key's effective TTL (or the null sentinel when the
    /// policy enables null caching).
    ///
    /// There is no at-most-once guarantee under concurrency: parallel
    /// misses for the same key may each invoke their producer.
    ///
    /// # Errors
    /// Producer failures propagate as [`CacheError::Producer`]; nothing is
    /// cached in that case.
    pub async fn get_with<T, F, Fut>(&self, key: &ResolvedCacheKey, producer: F) -> Result<Cached<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<T>>>,
    {
        self.get_produced(key, producer, None).await
    }

    /// Like [`get_with`](Self::get_with) with an explicit TTL that takes
    /// precedence over the key's policy.
    pub async fn get_with_ttl<T, F, Fut>(
        &self,
        key: &ResolvedCacheKey,
        producer: F,
        ttl_override: u64,
    ) -> Result<Cached<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<T>>>,
    {
        self.get_produced(key, producer, Some(ttl_override)).await
    }

    async fn get_produced<T, F, Fut>(
        &self,
        key: &ResolvedCacheKey,
        producer: F,
        ttl_override: Option<u64>,
    ) -> Result<Cached<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<T>>>,
    {
        match self.probe(key).await? {
            Cached::Missing => {
                debug!(key = key.rendered(), "cache miss, invoking producer");
                let produced = producer().await.map_err(CacheError::Producer)?;
                match produced {
                    Some(value) => {
                        self.write(key, Some(&value), ttl_override).await?;
                        Ok(Cached::Value(value))
                    }
                    None => {
                        self.write::<T>(key, None, ttl_override).await?;
                        Ok(Cached::Empty)
                    }
                }
            }
            outcome => Ok(outcome),
        }
    }

    /// Reads the stored state for a key: value, sentinel, or nothing.
    async fn probe<T: DeserializeOwned>(&self, key: &ResolvedCacheKey) -> Result<Cached<T>> {
        match self.driver.get(key.rendered()).await? {
            Some(bytes) if bytes == NULL_SENTINEL => {
                self.note_hit(key).await;
                Ok(Cached::Empty)
            }
            Some(bytes) => {
                self.note_hit(key).await;
                self.maybe_renew(key).await;
                Ok(Cached::Value(serde_json::from_slice(&bytes)?))
            }
            None => {
                self.note_miss(key).await;
                Ok(Cached::Missing)
            }
        }
    }

    // == Set ==
    /// Stores a value with the key's effective TTL.
    pub async fn set<T: Serialize>(&self, key: &ResolvedCacheKey, value: &T) -> Result<bool> {
        self.write(key, Some(value), None).await
    }

    /// Stores a value with an explicit TTL.
    pub async fn set_with_ttl<T: Serialize>(
        &self,
        key: &ResolvedCacheKey,
        value: &T,
        ttl_seconds: u64,
    ) -> Result<bool> {
        self.write(key, Some(value), Some(ttl_seconds)).await
    }

    /// Stores the null sentinel ("no upstream value") when the key's policy
    /// enables null caching; otherwise does nothing and returns `false`.
    pub async fn set_empty(&self, key: &ResolvedCacheKey) -> Result<bool> {
        self.write::<()>(key, None, None).await
    }

    async fn write<T: Serialize>(
        &self,
        key: &ResolvedCacheKey,
        value: Option<&T>,
        ttl_override: Option<u64>,
    ) -> Result<bool> {
        match value {
            Some(value) => {
                let ttl = self.effective_ttl(key, ttl_override);
                let bytes = serde_json::to_vec(value)?;
                let stored = self.driver.set(key.rendered(), &bytes, Some(ttl)).await?;
                self.note_set(key).await;
                Ok(stored)
            }
            None => match key.policy() {
                Some(policy) if policy.enable_null_cache => {
                    let stored = self
                        .driver
                        .set(key.rendered(), NULL_SENTINEL, Some(policy.null_cache_ttl))
                        .await?;
                    self.note_set(key).await;
                    Ok(stored)
                }
                _ => Ok(false),
            },
        }
    }

    // == Delete / Exists ==
    /// Removes a key; `true` if it existed.
    pub async fn delete(&self, key: &ResolvedCacheKey) -> Result<bool> {
        let removed = self.driver.delete(key.rendered()).await?;
        self.note_delete(key).await;
        Ok(removed)
    }

    /// Checks whether a key is currently cached (sentinel included).
    pub async fn exists(&self, key: &ResolvedCacheKey) -> Result<bool> {
        self.driver.exists(key.rendered()).await
    }

    /// Deletes every stored key matching a template rendered with possibly
    /// partial parameters (unbound placeholders become wildcards); returns
    /// the number removed.
    pub async fn delete_by_prefix(&self, name: &str, params: &Params) -> Result<u64> {
        let pattern = self.resolver.render_pattern(name, params)?;
        self.driver.delete_by_pattern(&pattern).await
    }

    // == Batch Get ==
    /// Bulk read; the result contains only the keys with a cached value
    /// (sentinel entries count as hits but stay absent).
    pub async fn get_many<T: DeserializeOwned>(
        &self,
        keys: &[ResolvedCacheKey],
    ) -> Result<HashMap<String, T>> {
        let (found, _) = self.probe_many(keys).await?;
        Ok(found)
    }

    /// Bulk cache-aside read.
    ///
    /// One bulk driver read partitions the keys into hits and misses. The
    /// producer runs at most once, with exactly the missing keys, and must
    /// return a map keyed by rendered string; keys it omits stay absent
    /// from the result (no sentinel is written for them). Produced values
    /// are grouped by effective TTL, one bulk write per group.
    pub async fn get_many_with<T, F, Fut>(
        &self,
        keys: &[ResolvedCacheKey],
        producer: F,
    ) -> Result<HashMap<String, T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Vec<ResolvedCacheKey>) -> Fut,
        Fut: Future<Output = anyhow::Result<HashMap<String, T>>>,
    {
        let (mut result, missing) = self.probe_many(keys).await?;
        if missing.is_empty() {
            return Ok(result);
        }

        debug!(misses = missing.len(), "bulk cache miss, invoking producer");
        let mut produced = producer(missing.clone()).await.map_err(CacheError::Producer)?;

        // Group fresh values by their per-key effective TTL and issue one
        // bulk write per group.
        let mut groups: HashMap<u64, HashMap<String, Vec<u8>>> = HashMap::new();
        let mut written = 0u64;
        for key in &missing {
            if let Some(value) = produced.get(key.rendered()) {
                let ttl = self.effective_ttl(key, None);
                groups
                    .entry(ttl)
                    .or_default()
                    .insert(key.rendered().to_string(), serde_json::to_vec(value)?);
                if Self::stats_enabled(key) {
                    written += 1;
                }
            }
        }
        for (ttl, batch) in &groups {
            if !self.driver.set_multiple(batch, Some(*ttl)).await? {
                return Err(CacheError::Driver("bulk write rejected".to_string()));
            }
        }
        self.note_sets(written).await;

        for key in &missing {
            if let Some(value) = produced.remove(key.rendered()) {
                result.insert(key.rendered().to_string(), value);
            }
        }
        Ok(result)
    }

    /// Bulk read returning (decoded hits, missing keys), with batch stats
    /// and batch hot-key renewal applied.
    async fn probe_many<T: DeserializeOwned>(
        &self,
        keys: &[ResolvedCacheKey],
    ) -> Result<(HashMap<String, T>, Vec<ResolvedCacheKey>)> {
        if keys.is_empty() {
            return Ok((HashMap::new(), Vec::new()));
        }

        let rendered: Vec<String> = keys.iter().map(|k| k.rendered().to_string()).collect();
        let raw = self.driver.get_multiple(&rendered).await?;

        let mut found = HashMap::with_capacity(raw.len());
        let mut hits = Vec::new();
        let mut renewable = Vec::new();
        let mut missing = Vec::new();

        for key in keys {
            match raw.get(key.rendered()) {
                Some(bytes) if bytes.as_slice() == NULL_SENTINEL => hits.push(key.clone()),
                Some(bytes) => {
                    found.insert(key.rendered().to_string(), serde_json::from_slice(bytes)?);
                    hits.push(key.clone());
                    renewable.push(key.clone());
                }
                None => missing.push(key.clone()),
            }
        }

        self.note_hits(&hits).await;
        self.note_misses(&missing).await;
        // Renewal applies to real values only; a sentinel hit counts for
        // stats but keeps its short TTL.
        self.renew_many(&renewable).await;

        Ok((found, missing))
    }

    // == Batch Set ==
    /// Bulk write. `None` values store the null sentinel for keys whose
    /// policy enables null caching and are skipped otherwise. Writes are
    /// grouped by effective TTL; success requires every group to succeed.
    pub async fn set_many<T: Serialize>(
        &self,
        entries: &[(ResolvedCacheKey, Option<T>)],
    ) -> Result<bool> {
        self.write_many(entries, None).await
    }

    /// Like [`set_many`](Self::set_many) with an explicit TTL for the
    /// non-sentinel entries.
    pub async fn set_many_with_ttl<T: Serialize>(
        &self,
        entries: &[(ResolvedCacheKey, Option<T>)],
        ttl_seconds: u64,
    ) -> Result<bool> {
        self.write_many(entries, Some(ttl_seconds)).await
    }

    async fn write_many<T: Serialize>(
        &self,
        entries: &[(ResolvedCacheKey, Option<T>)],
        ttl_override: Option<u64>,
    ) -> Result<bool> {
        let mut groups: HashMap<u64, HashMap<String, Vec<u8>>> = HashMap::new();
        let mut written = 0u64;

        for (key, value) in entries {
            match value {
                Some(value) => {
                    let ttl = self.effective_ttl(key, ttl_override);
                    groups
                        .entry(ttl)
                        .or_default()
                        .insert(key.rendered().to_string(), serde_json::to_vec(value)?);
                    if Self::stats_enabled(key) {
                        written += 1;
                    }
                }
                None => {
                    if let Some(policy) = key.policy() {
                        if policy.enable_null_cache {
                            groups
                                .entry(policy.null_cache_ttl)
                                .or_default()
                                .insert(key.rendered().to_string(), NULL_SENTINEL.to_vec());
                            if Self::stats_enabled(key) {
                                written += 1;
                            }
                        }
                    }
                }
            }
        }

        let mut all_stored = true;
        for (ttl, batch) in &groups {
            all_stored &= self.driver.set_multiple(batch, Some(*ttl)).await?;
        }
        self.note_sets(written).await;
        Ok(all_stored)
    }

    // == Effective TTL ==
    /// TTL precedence: explicit override, then the policy TTL (with random
    /// jitter when configured), then the crate fallback. Unmanaged keys
    /// only see the override or the fallback.
    fn effective_ttl(&self, key: &ResolvedCacheKey, ttl_override: Option<u64>) -> u64 {
        if let Some(ttl) = ttl_override {
            return ttl;
        }
        match key.policy() {
            Some(policy) => jittered_ttl(policy),
            None => DEFAULT_TTL,
        }
    }

    // == Hot-Key Renewal ==
    /// Hit-path TTL renewal. Best-effort: never surfaces an error.
    async fn maybe_renew(&self, key: &ResolvedCacheKey) {
        let Some(policy) = key.policy() else { return };
        if !policy.hot_key_auto_renewal || !self.driver.supports_expiry() {
            return;
        }

        match self.renewal_target(key, policy).await {
            Ok(Some(new_ttl)) => {
                if let Err(e) = self.driver.expire(key.rendered(), new_ttl).await {
                    warn!(key = key.rendered(), error = %e, "hot-key renewal failed");
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(key = key.rendered(), error = %e, "hot-key renewal check failed");
            }
        }
    }

    /// Batch renewal: keys landing on the same clamped TTL share one bulk
    /// expiry call. Best-effort like the single-key path.
    async fn renew_many(&self, hits: &[ResolvedCacheKey]) {
        if !self.driver.supports_expiry() {
            return;
        }

        let mut groups: HashMap<u64, Vec<String>> = HashMap::new();
        for key in hits {
            let Some(policy) = key.policy() else { continue };
            if !policy.hot_key_auto_renewal {
                continue;
            }
            match self.renewal_target(key, policy).await {
                Ok(Some(new_ttl)) => groups
                    .entry(new_ttl)
                    .or_default()
                    .push(key.rendered().to_string()),
                Ok(None) => {}
                Err(e) => {
                    warn!(key = key.rendered(), error = %e, "hot-key renewal check failed");
                }
            }
        }

        for (ttl, keys) in groups {
            if let Err(e) = self.driver.expire_multiple(&keys, ttl).await {
                warn!(ttl, error = %e, "hot-key bulk renewal failed");
            }
        }
    }

    /// Decides whether a key qualifies for renewal and to what TTL.
    async fn renewal_target(
        &self,
        key: &ResolvedCacheKey,
        policy: &PolicyConfig,
    ) -> Result<Option<u64>> {
        let frequency = self.stats.frequency(&self.freq_name(key)).await?;
        if frequency < policy.hot_key_threshold {
            return Ok(None);
        }
        let current = self.driver.ttl(key.rendered()).await?;
        if current <= 0 {
            return Ok(None);
        }
        Ok(renewed_ttl(current as u64, policy))
    }

    // == Stats Plumbing ==
    fn stats_enabled(key: &ResolvedCacheKey) -> bool {
        key.policy().map(|p| p.enable_stats).unwrap_or(false)
    }

    /// Frequency counter name, namespaced by the policy's tag prefix when
    /// one is configured.
    fn freq_name(&self, key: &ResolvedCacheKey) -> String {
        match key.policy() {
            Some(policy) if !policy.tag_prefix.is_empty() => {
                format!("{}{}", policy.tag_prefix, key.rendered())
            }
            _ => key.rendered().to_string(),
        }
    }

    async fn note_hit(&self, key: &ResolvedCacheKey) {
        if Self::stats_enabled(key) {
            if let Err(e) = self.stats.record_hit(&self.freq_name(key)).await {
                warn!(key = key.rendered(), error = %e, "stats recording failed");
            }
        }
    }

    async fn note_miss(&self, key: &ResolvedCacheKey) {
        if Self::stats_enabled(key) {
            if let Err(e) = self.stats.record_miss(&self.freq_name(key)).await {
                warn!(key = key.rendered(), error = %e, "stats recording failed");
            }
        }
    }

    async fn note_set(&self, key: &ResolvedCacheKey) {
        if Self::stats_enabled(key) {
            if let Err(e) = self.stats.record_set(key.rendered()).await {
                warn!(key = key.rendered(), error = %e, "stats recording failed");
            }
        }
    }

    async fn note_delete(&self, key: &ResolvedCacheKey) {
        if Self::stats_enabled(key) {
            if let Err(e) = self.stats.record_delete(key.rendered()).await {
                warn!(key = key.rendered(), error = %e, "stats recording failed");
            }
        }
    }

    async fn note_hits(&self, keys: &[ResolvedCacheKey]) {
        let names: Vec<String> = keys
            .iter()
            .filter(|k| Self::stats_enabled(k))
            .map(|k| self.freq_name(k))
            .collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        if let Err(e) = self.stats.record_hits(&refs).await {
            warn!(error = %e, "batch stats recording failed");
        }
    }

    async fn note_misses(&self, keys: &[ResolvedCacheKey]) {
        let names: Vec<String> = keys
            .iter()
            .filter(|k| Self::stats_enabled(k))
            .map(|k| self.freq_name(k))
            .collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        if let Err(e) = self.stats.record_misses(&refs).await {
            warn!(error = %e, "batch stats recording failed");
        }
    }

    async fn note_sets(&self, count: u64) {
        if let Err(e) = self.stats.record_sets(count).await {
            warn!(error = %e, "batch stats recording failed");
        }
    }
}

// == TTL Helpers ==
/// Policy TTL plus random jitter, spreading expiries of keys written
/// together.
fn jittered_ttl(policy: &PolicyConfig) -> u64 {
    if policy.ttl_random_range == 0 {
        policy.ttl
    } else {
        policy.ttl + rand::thread_rng().gen_range(0..=policy.ttl_random_range)
    }
}

/// Clamped renewal target for a hot key.
///
/// Monotonic: the result never shrinks the current TTL and never exceeds
/// the policy ceiling; `None` means "leave the expiry alone".
fn renewed_ttl(current: u64, policy: &PolicyConfig) -> Option<u64> {
    if current >= policy.hot_key_max_ttl {
        return None;
    }
    let target = policy
        .hot_key_extend_ttl
        .clamp(current, policy.hot_key_max_ttl);
    (target > current).then_some(target)
}
