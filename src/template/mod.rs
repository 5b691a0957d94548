//! Template Module
//!
//! Key template registry and the rendering engine that turns dotted
//! `group.key` names plus parameters into canonical storage keys.

mod registry;
mod render;


// Re-export public types
pub use registry::{GroupDefinition, KeyDefinition, KeyTemplateRegistry};
pub use render::{CacheKeyResolver, Params, ResolvedCacheKey};
