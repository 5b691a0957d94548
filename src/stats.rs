//! Cache Statistics Module
//!
//! Tracks hit/miss/set/delete counters and per-key access frequency.
//! Counters live in the external store as atomic counters, so counts stay
//! correct across concurrent processes sharing one backend.

use std::sync::Arc;

use serde::Serialize;

use crate::driver::Driver;
use crate::error::Result;

// == Stats Snapshot ==
/// Point-in-time view of the global counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsSnapshot {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals
    pub misses: u64,
    /// Number of stored values
    pub sets: u64,
    /// Number of deletions
    pub deletes: u64,
    /// hits / (hits + misses), 0.0 when no reads have happened
    pub hit_rate: f64,
}

// == Stats Tracker ==
/// Driver-backed statistics recorder.
///
/// Whether a given key records statistics at all is the orchestrator's
/// decision (per-key policy); a disabled key never reaches this type.
#[derive(Clone)]
pub struct StatsTracker {
    driver: Arc<dyn Driver>,
    namespace: String,
    separator: String,
}

impl StatsTracker {
    // == Constructor ==
    /// Creates a tracker whose counters live under
    /// `<namespace><sep>stats<sep>…` in the external store. The `stats`
    /// group prefix is rejected at configuration load, so rendered cache
    /// keys cannot land in this namespace.
    pub fn new(driver: Arc<dyn Driver>, namespace: impl Into<String>, separator: impl Into<String>) -> Self {
        Self {
            driver,
            namespace: namespace.into(),
            separator: separator.into(),
        }
    }

    fn counter_key(&self, name: &str) -> String {
        let sep = &self.separator;
        format!("{}{sep}stats{sep}{name}", self.namespace)
    }

    fn freq_key(&self, rendered: &str) -> String {
        let sep = &self.separator;
        format!("{}{sep}stats{sep}freq{sep}{rendered}", self.namespace)
    }

    // == Recording ==
    /// Records one hit and bumps the key's access frequency.
    pub async fn record_hit(&self, rendered: &str) -> Result<()> {
        self.driver.incr(&self.counter_key("hits"), 1).await?;
        self.driver.incr(&self.freq_key(rendered), 1).await?;
        Ok(())
    }

    /// Records one miss and bumps the key's access frequency.
    pub async fn record_miss(&self, rendered: &str) -> Result<()> {
        self.driver.incr(&self.counter_key("misses"), 1).await?;
        self.driver.incr(&self.freq_key(rendered), 1).await?;
        Ok(())
    }

    /// Records one stored value.
    pub async fn record_set(&self, _rendered: &str) -> Result<()> {
        self.driver.incr(&self.counter_key("sets"), 1).await?;
        Ok(())
    }

    /// Records one deletion.
    pub async fn record_delete(&self, _rendered: &str) -> Result<()> {
        self.driver.incr(&self.counter_key("deletes"), 1).await?;
        Ok(())
    }

    // == Batch Recording ==
    /// Records hits for a batch of keys.
    pub async fn record_hits(&self, rendered: &[&str]) -> Result<()> {
        if rendered.is_empty() {
            return Ok(());
        }
        self.driver
            .incr(&self.counter_key("hits"), rendered.len() as i64)
            .await?;
        for key in rendered {
            self.driver.incr(&self.freq_key(key), 1).await?;
        }
        Ok(())
    }

    /// Records misses for a batch of keys.
    pub async fn record_misses(&self, rendered: &[&str]) -> Result<()> {
        if rendered.is_empty() {
            return Ok(());
        }
        self.driver
            .incr(&self.counter_key("misses"), rendered.len() as i64)
            .await?;
        for key in rendered {
            self.driver.incr(&self.freq_key(key), 1).await?;
        }
        Ok(())
    }

    /// Records a batch of stored values.
    pub async fn record_sets(&self, count: u64) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        self.driver.incr(&self.counter_key("sets"), count as i64).await?;
        Ok(())
    }

    // == Frequency ==
    /// Access frequency of one rendered key.
    pub async fn frequency(&self, rendered: &str) -> Result<u64> {
        let count = self.driver.incr(&self.freq_key(rendered), 0).await?;
        Ok(count.max(0) as u64)
    }

    // == Snapshot ==
    /// Reads the global counters.
    pub async fn snapshot(&self) -> Result<StatsSnapshot> {
        let hits = self.read_counter("hits").await?;
        let misses = self.read_counter("misses").await?;
        let sets = self.read_counter("sets").await?;
        let deletes = self.read_counter("deletes").await?;

        let total = hits + misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };

        Ok(StatsSnapshot {
            hits,
            misses,
            sets,
            deletes,
            hit_rate,
        })
    }

    async fn read_counter(&self, name: &str) -> Result<u64> {
        let count = self.driver.incr(&self.counter_key(name), 0).await?;
        Ok(count.max(0) as u64)
    }

    // == Hot Keys ==
    /// The most frequently accessed keys, highest first.
    pub async fn hot_keys(&self, limit: usize) -> Result<Vec<(String, u64)>> {
        let prefix = self.freq_key("");
        let pattern = format!("{prefix}*");

        let mut ranked = Vec::new();
        for counter in self.driver.scan(&pattern).await? {
            let count = self.driver.incr(&counter, 0).await?.max(0) as u64;
            let rendered = counter[prefix.len()..].to_string();
            ranked.push((rendered, count));
        }

        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit);
        Ok(ranked)
    }

    // == Reset ==
    /// Clears every counter under this tracker's namespace; returns the
    /// number of counters removed.
    pub async fn reset(&self) -> Result<u64> {
        let sep = &self.separator;
        let pattern = format!("{}{sep}stats{sep}*", self.namespace);
        self.driver.delete_by_pattern(&pattern).await
    }
}
