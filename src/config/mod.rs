//! Configuration Module
//!
//! Declarative YAML configuration with three-level policy inheritance:
//! global defaults, group overrides, key overrides.

mod policy;
mod raw;
mod resolver;

// Re-export public types
pub use policy::{PolicyConfig, PolicyOverride, DEFAULT_TTL};
pub use raw::{RawConfig, RawGroup, RawKey};
pub use resolver::CacheConfig;
