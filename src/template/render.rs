//! Cache Key Rendering
//!
//! Turns a dotted `group.key` name plus a parameter map into the
//! fully-qualified storage key:
//! `app_prefix SEP group_prefix SEP version SEP rendered_template`.
//!
//! Rendering is pure and deterministic: the same name and parameters always
//! produce the same string, regardless of call order or prior state.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{CacheError, Result};
use crate::template::registry::{KeyDefinition, KeyTemplateRegistry};

// == Type Aliases ==
/// Parameter map supplied with every render call.
pub type Params = serde_json::Map<String, Value>;

/// Number of hex characters kept from a composite-value hash.
const COMPOSITE_HASH_LEN: usize = 16;

// == Resolved Cache Key ==
/// A rendered storage key plus a reference to its definition.
///
/// Created per request and discarded after the call; equality and hashing
/// are defined by the rendered string alone.
#[derive(Debug, Clone)]
pub struct ResolvedCacheKey {
    group: String,
    key: String,
    rendered: String,
    definition: Arc<KeyDefinition>,
}

impl ResolvedCacheKey {
    /// The fully-qualified storage key.
    pub fn rendered(&self) -> &str {
        &self.rendered
    }

    /// Owning group name.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Key name inside the group.
    pub fn key_name(&self) -> &str {
        &self.key
    }

    /// The key's definition, including its merged policy.
    pub fn definition(&self) -> &KeyDefinition {
        &self.definition
    }

    /// Merged policy, `None` for unmanaged keys.
    pub fn policy(&self) -> Option<&crate::config::PolicyConfig> {
        self.definition.policy.as_ref()
    }
}

impl PartialEq for ResolvedCacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.rendered == other.rendered
    }
}

impl Eq for ResolvedCacheKey {}

impl std::hash::Hash for ResolvedCacheKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.rendered.hash(state);
    }
}

impl std::fmt::Display for ResolvedCacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.rendered)
    }
}

// == Cache Key Resolver ==
/// Renders dotted template names into storage keys.
#[derive(Debug, Clone)]
pub struct CacheKeyResolver {
    registry: Arc<KeyTemplateRegistry>,
}

impl CacheKeyResolver {
    // == Constructor ==
    pub fn new(registry: Arc<KeyTemplateRegistry>) -> Self {
        Self { registry }
    }

    /// The underlying template registry.
    pub fn registry(&self) -> &KeyTemplateRegistry {
        &self.registry
    }

    // == Render ==
    /// Renders one storage key.
    ///
    /// Every `{name}` placeholder in the template must have an entry in
    /// `params`; extra parameters are silently ignored.
    ///
    /// # Errors
    /// `CacheError::UnknownTemplate` for an unknown dotted name,
    /// `CacheError::MissingParameter` for an unbound placeholder.
    pub fn render(&self, name: &str, params: &Params) -> Result<ResolvedCacheKey> {
        let (group, key) = self.registry.lookup(name)?;
        let separator = self.registry.separator();

        let body = substitute(&key.template, |param| {
            params
                .get(param)
                .map(|value| coerce(value, separator))
                .ok_or_else(|| CacheError::MissingParameter(param.to_string()))
        })?;

        let rendered = [
            self.registry.app_prefix(),
            group.prefix.as_str(),
            group.version.as_str(),
            body.as_str(),
        ]
        .join(separator);

        Ok(ResolvedCacheKey {
            group: key.group.clone(),
            key: key.key.clone(),
            rendered,
            definition: key,
        })
    }

    // == Render Many ==
    /// Renders a batch of parameter maps for one template name.
    ///
    /// Entries that are not JSON objects are skipped rather than raising,
    /// so heterogeneous input lists degrade gracefully. An empty input
    /// yields an empty map.
    pub fn render_many(
        &self,
        name: &str,
        params_list: &[Value],
    ) -> Result<HashMap<String, ResolvedCacheKey>> {
        let mut resolved = HashMap::with_capacity(params_list.len());
        for entry in params_list {
            let Value::Object(params) = entry else {
                continue;
            };
            let key = self.render(name, params)?;
            resolved.insert(key.rendered().to_string(), key);
        }
        Ok(resolved)
    }

    // == Render Pattern ==
    /// Renders a wildcard pattern from possibly partial parameters.
    ///
    /// Bound placeholders substitute normally; unbound ones become `*`,
    /// making the result suitable for pattern deletion.
    pub fn render_pattern(&self, name: &str, params: &Params) -> Result<String> {
        let (group, key) = self.registry.lookup(name)?;
        let separator = self.registry.separator();

        let body = substitute(&key.template, |param| {
            Ok(params
                .get(param)
                .map(|value| coerce(value, separator))
                .unwrap_or_else(|| "*".to_string()))
        })?;

        Ok([
            self.registry.app_prefix(),
            group.prefix.as_str(),
            group.version.as_str(),
            body.as_str(),
        ]
        .join(separator))
    }
}

// == Placeholder Substitution ==
/// Replaces every `{name}` in `template` using `bind`.
///
/// Braces without a matching close are copied literally.
fn substitute<F>(template: &str, mut bind: F) -> Result<String>
where
    F: FnMut(&str) -> Result<String>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        match rest[open + 1..].find('}') {
            Some(close) => {
                let param = &rest[open + 1..open + 1 + close];
                out.push_str(&bind(param)?);
                rest = &rest[open + 1 + close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

// == Value Coercion ==
/// Renders one parameter value as a key fragment.
///
/// Booleans become `"1"`/`"0"`, null becomes the literal `"null"`,
/// composites (arrays/objects) become a deterministic hash of their
/// canonical JSON form, everything else renders via its natural string
/// form. The result is always sanitized.
fn coerce(value: &Value, separator: &str) -> String {
    let fragment = match value {
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => composite_hash(value),
    };
    sanitize(&fragment, separator)
}

/// Hashes a composite value over its canonical JSON serialization.
///
/// serde_json keeps object keys sorted, so equal composites always yield
/// the same fragment.
fn composite_hash(value: &Value) -> String {
    let canonical = serde_json::to_string(value).unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(digest)[..COMPOSITE_HASH_LEN].to_string()
}

/// Replaces any character outside the conservative safe set
/// (letters, digits, the separator, `-`, `_`) with `_` so generated keys
/// stay portable across backends.
fn sanitize(fragment: &str, separator: &str) -> String {
    fragment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || separator.contains(c) {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use serde_json::json;

    fn test_resolver() -> CacheKeyResolver {
        let config = CacheConfig::from_yaml_str(
            r#"
app_prefix: app
groups:
  user:
    prefix: usr
    version: v1
    keys:
      profile:
        template: "profile:{id}"
        cache: {}
      prefs:
        template: "prefs:{id}:{scope}"
        cache: {}
"#,
        )
        .unwrap();
        CacheKeyResolver::new(Arc::new(KeyTemplateRegistry::new(&config)))
    }

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_render_round_trip_shape() {
        let resolver = test_resolver();
        let key = resolver
            .render("user.profile", &params(json!({"id": 123})))
            .unwrap();

        assert_eq!(key.rendered(), "app:usr:v1:profile:123");
        assert_eq!(key.group(), "user");
        assert_eq!(key.key_name(), "profile");
    }

    #[test]
    fn test_render_missing_parameter() {
        let resolver = test_resolver();
        let err = resolver.render("user.profile", &Params::new()).unwrap_err();
        match err {
            CacheError::MissingParameter(name) => assert_eq!(name, "id"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_render_unknown_template() {
        let resolver = test_resolver();
        let err = resolver
            .render("ghost.key", &params(json!({"id": 1})))
            .unwrap_err();
        assert!(matches!(err, CacheError::UnknownTemplate(_)));
    }

    #[test]
    fn test_render_extra_params_ignored() {
        let resolver = test_resolver();
        let with_extra = resolver
            .render("user.profile", &params(json!({"id": 1, "unused": "x"})))
            .unwrap();
        let without = resolver
            .render("user.profile", &params(json!({"id": 1})))
            .unwrap();
        assert_eq!(with_extra, without);
    }

    #[test]
    fn test_bool_and_null_coercion() {
        let resolver = test_resolver();
        let key = resolver
            .render("user.prefs", &params(json!({"id": true, "scope": null})))
            .unwrap();
        assert_eq!(key.rendered(), "app:usr:v1:prefs:1:null");

        let key = resolver
            .render("user.prefs", &params(json!({"id": false, "scope": "web"})))
            .unwrap();
        assert_eq!(key.rendered(), "app:usr:v1:prefs:0:web");
    }

    #[test]
    fn test_composite_params_hash_deterministically() {
        let resolver = test_resolver();
        let a = resolver
            .render("user.profile", &params(json!({"id": {"b": 2, "a": 1}})))
            .unwrap();
        let b = resolver
            .render("user.profile", &params(json!({"id": {"a": 1, "b": 2}})))
            .unwrap();
        // serde_json sorts object keys, so field order cannot matter
        assert_eq!(a, b);

        let c = resolver
            .render("user.profile", &params(json!({"id": {"a": 1, "b": 3}})))
            .unwrap();
        assert_ne!(a, c);

        // Fragment is a short hex digest, not the literal value
        let fragment = a.rendered().rsplit(':').next().unwrap();
        assert_eq!(fragment.len(), COMPOSITE_HASH_LEN);
        assert!(fragment.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn test_unsafe_characters_replaced() {
        let resolver = test_resolver();
        let key = resolver
            .render("user.profile", &params(json!({"id": "a b/c@d"})))
            .unwrap();
        assert_eq!(key.rendered(), "app:usr:v1:profile:a_b_c_d");
    }

    #[test]
    fn test_separator_survives_sanitization() {
        let resolver = test_resolver();
        let key = resolver
            .render("user.profile", &params(json!({"id": "x:y"})))
            .unwrap();
        assert_eq!(key.rendered(), "app:usr:v1:profile:x:y");
    }

    #[test]
    fn test_equality_by_rendered_string() {
        let resolver = test_resolver();
        let a = resolver
            .render("user.profile", &params(json!({"id": 1})))
            .unwrap();
        let b = resolver
            .render("user.profile", &params(json!({"id": 1})))
            .unwrap();
        let c = resolver
            .render("user.profile", &params(json!({"id": 2})))
            .unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_render_many() {
        let resolver = test_resolver();
        let list = vec![
            json!({"id": 1}),
            json!("not an object"),
            json!({"id": 2}),
            json!(42),
        ];

        let resolved = resolver.render_many("user.profile", &list).unwrap();
        assert_eq!(resolved.len(), 2);
        assert!(resolved.contains_key("app:usr:v1:profile:1"));
        assert!(resolved.contains_key("app:usr:v1:profile:2"));
    }

    #[test]
    fn test_render_many_empty_input() {
        let resolver = test_resolver();
        let resolved = resolver.render_many("user.profile", &[]).unwrap();
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_render_pattern_unbound_becomes_wildcard() {
        let resolver = test_resolver();

        let full = resolver.render_pattern("user.profile", &Params::new()).unwrap();
        assert_eq!(full, "app:usr:v1:profile:*");

        let partial = resolver
            .render_pattern("user.prefs", &params(json!({"id": 7})))
            .unwrap();
        assert_eq!(partial, "app:usr:v1:prefs:7:*");
    }

    #[test]
    fn test_unclosed_brace_copied_literally() {
        let out = substitute("seg:{id", |_| Ok("x".to_string())).unwrap();
        assert_eq!(out, "seg:{id");
    }
}
