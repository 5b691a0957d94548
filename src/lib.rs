//! cachekey - Templated cache-aside orchestration
//!
//! A cache-aside layer in front of a pluggable key-value store. Cache
//! entries are described symbolically as `"group.key"` templates plus a
//! parameter map; the crate renders canonical storage keys, applies a
//! three-level policy hierarchy (global, group, key), and orchestrates
//! read-through flows with null-sentinel caching, hot-key TTL renewal and
//! hit/miss statistics.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cachekey::{CacheConfig, CacheOrchestrator, Cached, MemoryDriver, Params};
//!
//! # async fn demo() -> cachekey::Result<()> {
//! let config = CacheConfig::from_yaml_str(r#"
//! app_prefix: app
//! groups:
//!   user:
//!     prefix: usr
//!     version: v1
//!     keys:
//!       profile:
//!         template: "profile:{id}"
//!         cache:
//!           ttl: 600
//!           enable_null_cache: true
//! "#)?;
//!
//! let cache = CacheOrchestrator::new(config, Arc::new(MemoryDriver::new()));
//!
//! let mut params = Params::new();
//! params.insert("id".to_string(), 123.into());
//! let key = cache.resolve("user.profile", &params)?;
//!
//! let profile: Cached<String> = cache
//!     .get_with(&key, || async { Ok(Some("Alice".to_string())) })
//!     .await?;
//! assert_eq!(profile.value().map(String::as_str), Some("Alice"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod orchestrator;
pub mod stats;
pub mod tasks;
pub mod template;

pub use config::{CacheConfig, PolicyConfig, PolicyOverride};
pub use driver::{Driver, MemoryDriver};
pub use error::{CacheError, Result};
pub use orchestrator::{CacheOrchestrator, Cached};
pub use stats::{StatsSnapshot, StatsTracker};
pub use tasks::spawn_cleanup_task;
pub use template::{CacheKeyResolver, KeyTemplateRegistry, Params, ResolvedCacheKey};
