//! Configuration Resolver
//!
//! Validates the raw configuration tree and resolves the three-level policy
//! inheritance (global → group → key) into immutable definitions. This is
//! the only place the merge runs; every later cache operation reads the
//! precomputed result.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::policy::{PolicyConfig, PolicyOverride};
use crate::config::raw::RawConfig;
use crate::error::{CacheError, Result};
use crate::template::{GroupDefinition, KeyDefinition};

/// Group prefix reserved for the statistics counter namespace; a group
/// using it would render keys under `<app_prefix><sep>stats<sep>…` and
/// collide with the counters stored there.
const RESERVED_STATS_PREFIX: &str = "stats";

// == Cache Config ==
/// Fully resolved configuration: validated groups with merged policies.
///
/// Built once at startup, read-only afterwards.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Application-wide key prefix
    pub app_prefix: String,
    /// Key segment separator
    pub separator: String,
    /// Global policy (built-in defaults overridden by the `global:` block)
    pub global_policy: PolicyConfig,
    /// Resolved groups by name
    pub groups: HashMap<String, Arc<GroupDefinition>>,
}

impl CacheConfig {
    // == From YAML String ==
    /// Parses and resolves a YAML configuration source.
    pub fn from_yaml_str(source: &str) -> Result<Self> {
        let raw: RawConfig = serde_yaml::from_str(source)
            .map_err(|e| CacheError::config("<root>", e.to_string()))?;
        Self::resolve(raw)
    }

    // == From File ==
    /// Reads and resolves a YAML configuration file.
    ///
    /// The single read performed here is the only I/O of configuration
    /// loading.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| CacheError::config(path.display().to_string(), e.to_string()))?;
        Self::from_yaml_str(&source)
    }

    // == Resolve ==
    /// Validates a raw tree and computes every merged policy.
    ///
    /// # Errors
    /// `CacheError::Config` naming the dotted path of any group missing
    /// `prefix`/`version`, any key missing `template`, or a group using
    /// the reserved `stats` prefix.
    pub fn resolve(raw: RawConfig) -> Result<Self> {
        let global_policy = raw.global.apply(&PolicyConfig::default());

        let mut groups = HashMap::with_capacity(raw.groups.len());
        for (group_name, raw_group) in raw.groups {
            let prefix = raw_group.prefix.ok_or_else(|| {
                CacheError::config(format!("groups.{group_name}.prefix"), "missing required field")
            })?;
            if prefix == RESERVED_STATS_PREFIX {
                return Err(CacheError::config(
                    format!("groups.{group_name}.prefix"),
                    "'stats' is reserved for the statistics counter namespace",
                ));
            }
            let version = raw_group.version.ok_or_else(|| {
                CacheError::config(format!("groups.{group_name}.version"), "missing required field")
            })?;

            // Group layer: consulted only as an inheritance base, never at runtime
            let group_base = raw_group
                .cache
                .as_ref()
                .map(|layer| layer.apply(&global_policy))
                .unwrap_or_else(|| global_policy.clone());

            let mut keys = HashMap::with_capacity(raw_group.keys.len());
            for (key_name, raw_key) in raw_group.keys {
                let template = raw_key.template.ok_or_else(|| {
                    CacheError::config(
                        format!("groups.{group_name}.keys.{key_name}.template"),
                        "missing required field",
                    )
                })?;

                // A key opts into management by declaring a cache block,
                // even an empty one. No block at all => unmanaged.
                let policy = raw_key
                    .cache
                    .as_ref()
                    .map(|layer: &PolicyOverride| layer.apply(&group_base));

                keys.insert(
                    key_name.clone(),
                    Arc::new(KeyDefinition {
                        group: group_name.clone(),
                        key: key_name,
                        template,
                        description: raw_key.description,
                        policy,
                    }),
                );
            }

            groups.insert(
                group_name.clone(),
                Arc::new(GroupDefinition {
                    name: group_name,
                    prefix,
                    version,
                    keys,
                }),
            );
        }

        Ok(Self {
            app_prefix: raw.app_prefix,
            separator: raw.separator,
            global_policy,
            groups,
        })
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const INHERITANCE_SOURCE: &str = r#"
global:
  ttl: 3600
groups:
  user:
    prefix: usr
    version: v1
    cache:
      ttl: 7200
    keys:
      profile:
        template: "profile:{id}"
        cache:
          ttl: 10800
      settings:
        template: "settings:{id}"
        cache: {}
  order:
    prefix: ord
    version: v1
    keys:
      detail:
        template: "detail:{id}"
        cache: {}
      raw:
        template: "raw:{id}"
"#;

    #[test]
    fn test_inheritance_precedence() {
        let config = CacheConfig::from_yaml_str(INHERITANCE_SOURCE).unwrap();

        // Key-level override wins
        let profile = &config.groups["user"].keys["profile"];
        assert_eq!(profile.policy.as_ref().unwrap().ttl, 10800);

        // Sibling without a key-level override inherits the group layer
        let settings = &config.groups["user"].keys["settings"];
        assert_eq!(settings.policy.as_ref().unwrap().ttl, 7200);

        // Key in a group without an override inherits the global layer
        let detail = &config.groups["order"].keys["detail"];
        assert_eq!(detail.policy.as_ref().unwrap().ttl, 3600);
    }

    #[test]
    fn test_key_without_cache_block_is_unmanaged() {
        let config = CacheConfig::from_yaml_str(INHERITANCE_SOURCE).unwrap();
        assert!(config.groups["order"].keys["raw"].policy.is_none());
    }

    #[test]
    fn test_non_ttl_fields_inherit_through_layers() {
        let source = r#"
global:
  enable_null_cache: true
  null_cache_ttl: 30
groups:
  user:
    prefix: usr
    version: v1
    cache:
      hot_key_threshold: 10
    keys:
      profile:
        template: "profile:{id}"
        cache:
          ttl: 120
"#;
        let config = CacheConfig::from_yaml_str(source).unwrap();
        let policy = config.groups["user"].keys["profile"]
            .policy
            .as_ref()
            .unwrap();

        assert_eq!(policy.ttl, 120);
        assert_eq!(policy.hot_key_threshold, 10);
        assert!(policy.enable_null_cache);
        assert_eq!(policy.null_cache_ttl, 30);
    }

    #[test]
    fn test_missing_prefix_names_path() {
        let source = "groups:\n  user:\n    version: v1\n    keys: {}\n";
        let err = CacheConfig::from_yaml_str(source).unwrap_err();
        match err {
            CacheError::Config { path, .. } => assert_eq!(path, "groups.user.prefix"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_reserved_stats_prefix_rejected() {
        let source = r#"
groups:
  metrics:
    prefix: stats
    version: v1
    keys: {}
"#;
        let err = CacheConfig::from_yaml_str(source).unwrap_err();
        match err {
            CacheError::Config { path, message } => {
                assert_eq!(path, "groups.metrics.prefix");
                assert!(message.contains("reserved"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_version_names_path() {
        let source = "groups:\n  user:\n    prefix: usr\n    keys: {}\n";
        let err = CacheConfig::from_yaml_str(source).unwrap_err();
        match err {
            CacheError::Config { path, .. } => assert_eq!(path, "groups.user.version"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_template_names_path() {
        let source = r#"
groups:
  user:
    prefix: usr
    version: v1
    keys:
      profile:
        description: "no template here"
"#;
        let err = CacheConfig::from_yaml_str(source).unwrap_err();
        match err {
            CacheError::Config { path, .. } => {
                assert_eq!(path, "groups.user.keys.profile.template")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_yaml_is_config_error() {
        let err = CacheConfig::from_yaml_str("groups: [not, a, map]").unwrap_err();
        assert!(matches!(err, CacheError::Config { .. }));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(INHERITANCE_SOURCE.as_bytes()).unwrap();

        let config = CacheConfig::from_file(file.path()).unwrap();
        assert!(config.groups.contains_key("user"));
        assert_eq!(config.global_policy.ttl, 3600);
    }

    #[test]
    fn test_from_file_missing() {
        let err = CacheConfig::from_file("/nonexistent/cache.yml").unwrap_err();
        assert!(matches!(err, CacheError::Config { .. }));
    }
}
