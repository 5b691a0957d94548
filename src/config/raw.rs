//! Raw Configuration Source
//!
//! serde structs mirroring the declarative YAML source exactly as written.
//! Mandatory fields are `Option` here so that validation can report the
//! full dotted path instead of a bare deserialization failure.

use std::collections::HashMap;

use serde::Deserialize;

use crate::config::policy::PolicyOverride;

// == Raw Config Root ==
/// Top level of the configuration source.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    /// Application-wide key prefix, first segment of every rendered key
    #[serde(default = "default_app_prefix")]
    pub app_prefix: String,
    /// Segment separator used in rendered keys
    #[serde(default = "default_separator")]
    pub separator: String,
    /// Global policy defaults, bottom layer of the inheritance chain
    #[serde(default)]
    pub global: PolicyOverride,
    /// Named cache groups
    #[serde(default)]
    pub groups: HashMap<String, RawGroup>,
}

// == Raw Group ==
/// One `groups.<name>` block.
#[derive(Debug, Clone, Deserialize)]
pub struct RawGroup {
    /// Storage prefix for this group (required, validated by the resolver)
    #[serde(default)]
    pub prefix: Option<String>,
    /// Version segment for this group (required, validated by the resolver)
    #[serde(default)]
    pub version: Option<String>,
    /// Group-level partial policy, middle layer of the inheritance chain
    #[serde(default)]
    pub cache: Option<PolicyOverride>,
    /// Key definitions in this group
    #[serde(default)]
    pub keys: HashMap<String, RawKey>,
}

// == Raw Key ==
/// One `groups.<group>.keys.<name>` block.
///
/// A key without a `cache:` block is unmanaged: it can still be rendered
/// but carries no resolved policy.
#[derive(Debug, Clone, Deserialize)]
pub struct RawKey {
    /// Key template with `{param}` placeholders (required)
    #[serde(default)]
    pub template: Option<String>,
    /// Free-form description, not interpreted
    #[serde(default)]
    pub description: Option<String>,
    /// Key-level partial policy, top layer of the inheritance chain
    #[serde(default)]
    pub cache: Option<PolicyOverride>,
}

// Default must agree with the serde field defaults above.
impl Default for RawConfig {
    fn default() -> Self {
        Self {
            app_prefix: default_app_prefix(),
            separator: default_separator(),
            global: PolicyOverride::default(),
            groups: HashMap::new(),
        }
    }
}

fn default_app_prefix() -> String {
    "app".to_string()
}

fn default_separator() -> String {
    ":".to_string()
}
