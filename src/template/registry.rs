//! Key Template Registry
//!
//! Holds the resolved group and key definitions and answers dotted
//! `group.key` lookups.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{CacheConfig, PolicyConfig};
use crate::error::{CacheError, Result};

// == Key Definition ==
/// One resolved key template inside a group.
///
/// `policy` is the fully merged global → group → key policy, computed once
/// at configuration load. `None` marks an unmanaged key: renderable, but
/// the orchestrator applies no policy-driven behavior to it.
#[derive(Debug, Clone)]
pub struct KeyDefinition {
    /// Owning group name
    pub group: String,
    /// Key name inside the group
    pub key: String,
    /// Template string with `{param}` placeholders
    pub template: String,
    /// Free-form description from the configuration source
    pub description: Option<String>,
    /// Merged policy, `None` for unmanaged keys
    pub policy: Option<PolicyConfig>,
}

// == Group Definition ==
/// One resolved cache group.
#[derive(Debug, Clone)]
pub struct GroupDefinition {
    /// Group name as used in dotted lookups
    pub name: String,
    /// Storage prefix segment
    pub prefix: String,
    /// Version segment
    pub version: String,
    /// Key definitions, looked up by name
    pub keys: HashMap<String, Arc<KeyDefinition>>,
}

// == Key Template Registry ==
/// Registry of all groups and key templates, built from a resolved
/// configuration and read-only for the process lifetime.
#[derive(Debug, Clone)]
pub struct KeyTemplateRegistry {
    app_prefix: String,
    separator: String,
    groups: HashMap<String, Arc<GroupDefinition>>,
}

impl KeyTemplateRegistry {
    // == Constructor ==
    /// Builds a registry from a resolved configuration.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            app_prefix: config.app_prefix.clone(),
            separator: config.separator.clone(),
            groups: config.groups.clone(),
        }
    }

    // == Lookup ==
    /// Resolves a dotted `group.key` name to its definitions.
    ///
    /// # Errors
    /// `CacheError::UnknownTemplate` when the name is not dotted, the group
    /// is unknown, or the key is unknown within the group.
    pub fn lookup(&self, name: &str) -> Result<(Arc<GroupDefinition>, Arc<KeyDefinition>)> {
        let (group_name, key_name) = name
            .split_once('.')
            .ok_or_else(|| CacheError::UnknownTemplate(format!("{name} (expected group.key)")))?;

        let group = self
            .groups
            .get(group_name)
            .ok_or_else(|| CacheError::UnknownTemplate(format!("{name} (unknown group '{group_name}')")))?;

        let key = group
            .keys
            .get(key_name)
            .ok_or_else(|| CacheError::UnknownTemplate(format!("{name} (unknown key '{key_name}')")))?;

        Ok((Arc::clone(group), Arc::clone(key)))
    }

    // == Contains ==
    /// Checks whether a dotted name resolves without constructing an error.
    pub fn contains(&self, name: &str) -> bool {
        match name.split_once('.') {
            Some((group, key)) => self
                .groups
                .get(group)
                .map(|g| g.keys.contains_key(key))
                .unwrap_or(false),
            None => false,
        }
    }

    // == Accessors ==
    /// Application-wide key prefix.
    pub fn app_prefix(&self) -> &str {
        &self.app_prefix
    }

    /// Key segment separator.
    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Names of all registered groups.
    pub fn group_names(&self) -> Vec<&str> {
        self.groups.keys().map(String::as_str).collect()
    }
}
