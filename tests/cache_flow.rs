//! Integration Tests for the Cache Orchestration Flow
//!
//! Exercises the full path from a YAML configuration through key
//! rendering, policy application and driver storage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use cachekey::{
    CacheConfig, CacheError, CacheOrchestrator, Cached, Driver, MemoryDriver, Params,
};

// == Helper Functions ==

const CONFIG_SOURCE: &str = r#"
app_prefix: app
separator: ":"
global:
  ttl: 3600
  enable_stats: true
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
          ttl: 600
          enable_null_cache: true
          null_cache_ttl: 30
      settings:
        template: "settings:{id}"
        cache: {}
  session:
    prefix: ses
    version: v2
    keys:
      token:
        template: "token:{hash}"
        cache:
          ttl: 900
          hot_key_auto_renewal: true
          hot_key_threshold: 2
          hot_key_extend_ttl: 1800
          hot_key_max_ttl: 3600
"#;

fn build_cache() -> (CacheOrchestrator, Arc<MemoryDriver>) {
    let config = CacheConfig::from_yaml_str(CONFIG_SOURCE).unwrap();
    let driver = Arc::new(MemoryDriver::new());
    (CacheOrchestrator::new(config, driver.clone()), driver)
}

fn params(value: serde_json::Value) -> Params {
    match value {
        serde_json::Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Profile {
    id: u64,
    name: String,
}

// == Round-Trip Scenario ==

#[tokio::test]
async fn test_round_trip_through_rendered_key() {
    let (cache, driver) = build_cache();

    let key = cache
        .resolve("user.profile", &params(json!({"id": 123})))
        .unwrap();
    assert_eq!(key.rendered(), "app:usr:v1:profile:123");

    let alice = Profile {
        id: 123,
        name: "Alice".to_string(),
    };

    let produced: Cached<Profile> = cache
        .get_with_ttl(&key, || async { Ok(Some(alice.clone())) }, 600)
        .await
        .unwrap();
    assert_eq!(produced.value(), Some(&alice));

    // Stored under the rendered key with the requested TTL
    let remaining = driver.ttl("app:usr:v1:profile:123").await.unwrap();
    assert!(remaining > 0 && remaining <= 600);

    // Second read hits the cache; no producer anywhere
    let cached: Cached<Profile> = cache.get(&key).await.unwrap();
    assert_eq!(cached.value(), Some(&alice));
}

// == Configuration Inheritance ==

#[tokio::test]
async fn test_policy_inheritance_drives_ttl() {
    let (cache, driver) = build_cache();

    // Key-level ttl (600) beats the group layer
    let profile = cache
        .resolve("user.profile", &params(json!({"id": 1})))
        .unwrap();
    cache.set(&profile, &"v".to_string()).await.unwrap();
    let ttl = driver.ttl(profile.rendered()).await.unwrap();
    assert!(ttl > 0 && ttl <= 600);

    // Sibling with an empty cache block inherits the group ttl (7200)
    let settings = cache
        .resolve("user.settings", &params(json!({"id": 1})))
        .unwrap();
    cache.set(&settings, &"v".to_string()).await.unwrap();
    let ttl = driver.ttl(settings.rendered()).await.unwrap();
    assert!(ttl > 600 && ttl <= 7200);
}

// == Error Surfaces ==

#[tokio::test]
async fn test_unknown_template_rejected() {
    let (cache, _) = build_cache();
    let result = cache.resolve("ghost.key", &params(json!({"id": 1})));
    assert!(matches!(result, Err(CacheError::UnknownTemplate(_))));
}

#[tokio::test]
async fn test_missing_parameter_rejected() {
    let (cache, _) = build_cache();
    let err = cache.resolve("user.profile", &Params::new()).unwrap_err();
    match err {
        CacheError::MissingParameter(name) => assert_eq!(name, "id"),
        other => panic!("unexpected error: {other}"),
    }
}

// == Null-Sentinel Caching ==

#[tokio::test]
async fn test_penetration_defense_across_calls() {
    let (cache, _) = build_cache();
    let key = cache
        .resolve("user.profile", &params(json!({"id": 404})))
        .unwrap();
    let calls = AtomicUsize::new(0);

    let first: Cached<Profile> = cache
        .get_with(&key, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        })
        .await
        .unwrap();
    assert!(first.is_empty());

    // The sentinel answers the second call; the producer stays cold
    let second: Cached<Profile> = cache
        .get_with(&key, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        })
        .await
        .unwrap();
    assert!(second.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The sentinel also satisfies exists(), unlike a true miss
    assert!(cache.exists(&key).await.unwrap());
}

// == Hot-Key Renewal ==

#[tokio::test]
async fn test_hot_key_ttl_extension_end_to_end() {
    let (cache, driver) = build_cache();

    let key = cache
        .resolve("session.token", &params(json!({"hash": "abc"})))
        .unwrap();
    cache.set_with_ttl(&key, &"v".to_string(), 60).await.unwrap();

    // Two hits cross the threshold; TTL jumps to the extend target
    let _: Cached<String> = cache.get(&key).await.unwrap();
    let _: Cached<String> = cache.get(&key).await.unwrap();

    let extended = driver.ttl(key.rendered()).await.unwrap();
    assert!(extended > 60, "TTL should have been extended, got {extended}");
    assert!(extended <= 1800);

    // Renewal is monotonic: more hits never shrink the TTL
    let _: Cached<String> = cache.get(&key).await.unwrap();
    let after = driver.ttl(key.rendered()).await.unwrap();
    assert!(after >= extended - 1);
    assert!(after <= 3600);
}

// == Batch Operations ==

#[tokio::test]
async fn test_bulk_get_mixes_cache_and_producer() {
    let (cache, _) = build_cache();

    let keys: Vec<_> = (0..5)
        .map(|i| {
            cache
                .resolve("user.profile", &params(json!({"id": i})))
                .unwrap()
        })
        .collect();

    for key in keys.iter().take(2) {
        cache.set(key, &"cached".to_string()).await.unwrap();
    }

    let calls = AtomicUsize::new(0);
    let result = cache
        .get_many_with(&keys, |missing| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                assert_eq!(missing.len(), 3);
                let mut produced = HashMap::new();
                for key in missing {
                    produced.insert(key.rendered().to_string(), "fresh".to_string());
                }
                Ok(produced)
            }
        })
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.len(), 5);
    assert_eq!(result["app:usr:v1:profile:0"], "cached");
    assert_eq!(result["app:usr:v1:profile:4"], "fresh");

    // Produced values are cached for the next bulk read
    let followup: HashMap<String, String> = cache.get_many(&keys).await.unwrap();
    assert_eq!(followup.len(), 5);
}

#[tokio::test]
async fn test_prefix_deletion_with_partial_params() {
    let (cache, _) = build_cache();

    for i in 0..3 {
        let key = cache
            .resolve("user.profile", &params(json!({"id": i})))
            .unwrap();
        cache.set(&key, &"v".to_string()).await.unwrap();
    }
    let other = cache
        .resolve("user.settings", &params(json!({"id": 0})))
        .unwrap();
    cache.set(&other, &"v".to_string()).await.unwrap();

    let removed = cache
        .delete_by_prefix("user.profile", &Params::new())
        .await
        .unwrap();
    assert_eq!(removed, 3);
    assert!(cache.exists(&other).await.unwrap());
}

// == Statistics ==

#[tokio::test]
async fn test_stats_snapshot_reflects_traffic() {
    let (cache, _) = build_cache();
    let key = cache
        .resolve("user.profile", &params(json!({"id": 1})))
        .unwrap();

    let _: Cached<String> = cache.get(&key).await.unwrap(); // miss
    cache.set(&key, &"v".to_string()).await.unwrap(); // set
    let _: Cached<String> = cache.get(&key).await.unwrap(); // hit
    cache.delete(&key).await.unwrap(); // delete

    let snap = cache.stats().snapshot().await.unwrap();
    assert_eq!(snap.hits, 1);
    assert_eq!(snap.misses, 1);
    assert_eq!(snap.sets, 1);
    assert_eq!(snap.deletes, 1);
    assert!((snap.hit_rate - 0.5).abs() < 1e-9);

    let hot = cache.stats().hot_keys(10).await.unwrap();
    assert_eq!(hot[0].0, "app:usr:v1:profile:1");
    assert_eq!(hot[0].1, 2);
}

// == Driver Interplay ==

#[tokio::test]
async fn test_values_stored_as_json_bytes() {
    let (cache, driver) = build_cache();
    let key = cache
        .resolve("user.profile", &params(json!({"id": 9})))
        .unwrap();

    let bob = Profile {
        id: 9,
        name: "Bob".to_string(),
    };
    cache.set(&key, &bob).await.unwrap();

    let raw = driver.get(key.rendered()).await.unwrap().unwrap();
    let decoded: Profile = serde_json::from_slice(&raw).unwrap();
    assert_eq!(decoded, bob);
}
