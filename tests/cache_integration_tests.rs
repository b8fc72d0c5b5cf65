//! Integration Tests for the public cache API
//!
//! Exercises the cache through the crate's public surface only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};
use tag_cache::{
    Cache, CacheError, Config, Entry, EntryFilter, Finder, GetOptions, KeyNormalizer, ManualClock,
    SetOptions, StorageBackend,
};

// == Helper Functions ==

const START: i64 = 1_700_000_000_000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("tag_cache=debug")
        .with_test_writer()
        .try_init();
}

fn lazy_config() -> Config {
    Config::default().with_clear_interval(Duration::ZERO)
}

fn clocked_cache<K, V>(config: Config) -> (Cache<K, V>, Arc<ManualClock>)
where
    K: Serialize + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    init_tracing();
    let clock = Arc::new(ManualClock::new(START));
    let cache = Cache::builder().config(config).clock(clock.clone()).build();
    (cache, clock)
}

#[derive(Debug, Clone, Serialize)]
struct UserQuery {
    tenant: String,
    user_id: u64,
    filters: HashMap<String, String>,
}

/// Backend recording every operation it receives.
#[derive(Default)]
struct RecordingBackend {
    entries: RwLock<HashMap<String, Entry<Value, String>>>,
    writes: AtomicUsize,
}

impl StorageBackend<Value, String> for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn set_value(&self, id: &str, entry: Entry<Value, String>) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.entries.write().insert(id.to_string(), entry);
    }

    fn get_value(&self, id: &str) -> Option<Entry<Value, String>> {
        self.entries.read().get(id).cloned()
    }

    fn all_keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    fn remove(&self, id: &str) {
        self.entries.write().remove(id);
    }
}

/// Case-insensitive normalizer for string keys.
struct CaseInsensitive;

impl KeyNormalizer<String> for CaseInsensitive {
    fn normalize(&self, key: &String) -> tag_cache::Result<String> {
        Ok(key.to_lowercase())
    }
}

// == Expiration ==

#[test]
fn test_default_ttl_scenario() -> anyhow::Result<()> {
    let (cache, clock) =
        clocked_cache::<String, i32>(lazy_config().with_cache_time(Duration::from_millis(1000)));

    cache.set("a".to_string(), 1, SetOptions::default())?;
    assert_eq!(cache.get(&"a".to_string(), GetOptions::default())?, Some(1));

    clock.advance(Duration::from_millis(1500));
    assert_eq!(cache.get(&"a".to_string(), GetOptions::default())?, None);
    assert!(!cache.has(&"a".to_string())?);
    Ok(())
}

#[test]
fn test_sliding_window_keeps_hot_entries() -> anyhow::Result<()> {
    let (cache, clock) = clocked_cache::<&str, &str>(lazy_config());
    let ttl = Duration::from_millis(1000);

    cache.set("session", "token", SetOptions::new().cache_time(ttl).refresh(true))?;

    for _ in 0..10 {
        clock.advance(Duration::from_millis(900));
        assert_eq!(cache.get(&"session", GetOptions::default())?, Some("token"));
    }

    clock.advance(Duration::from_millis(1001));
    assert_eq!(cache.get(&"session", GetOptions::default())?, None);
    Ok(())
}

#[test]
fn test_background_sweep_needs_no_reads() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let (cache, clock) = clocked_cache::<u32, u32>(
            Config::default().with_clear_interval(Duration::from_millis(10)),
        );
        for i in 0..5 {
            cache.set(i, i, SetOptions::new().cache_time(Duration::from_millis(50)))?;
        }
        cache.set(99, 99, SetOptions::default())?;

        clock.advance(Duration::from_millis(51));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().expirations, 5);
        Ok::<(), anyhow::Error>(())
    })
}

// == Key Normalization ==

#[test]
fn test_structurally_equal_keys_share_an_entry() -> anyhow::Result<()> {
    let (cache, _) = clocked_cache::<Value, &str>(lazy_config());

    cache.set(json!({"a": 1, "b": 2}), "first", SetOptions::default())?;
    cache.set(json!({"b": 2, "a": 1}), "second", SetOptions::default())?;

    assert_eq!(cache.len(), 1);
    assert_eq!(
        cache.get(&json!({"a": 1, "b": 2}), GetOptions::default())?,
        Some("second")
    );
    Ok(())
}

#[test]
fn test_struct_keys_with_maps() -> anyhow::Result<()> {
    let (cache, _) = clocked_cache::<UserQuery, Vec<u64>>(lazy_config());

    let mut filters = HashMap::new();
    filters.insert("status".to_string(), "active".to_string());
    filters.insert("role".to_string(), "admin".to_string());
    let query = UserQuery {
        tenant: "acme".to_string(),
        user_id: 7,
        filters,
    };

    let mut reordered = HashMap::new();
    reordered.insert("role".to_string(), "admin".to_string());
    reordered.insert("status".to_string(), "active".to_string());
    let same_query = UserQuery {
        filters: reordered,
        ..query.clone()
    };

    cache.set(query, vec![1, 2, 3], SetOptions::default())?;
    let hit = cache
        .get(&same_query, GetOptions::default())?
        .context("reordered query should hit")?;
    assert_eq!(hit, vec![1, 2, 3]);
    Ok(())
}

#[test]
fn test_unserializable_key_is_reported() {
    let (cache, _) = clocked_cache::<HashMap<(u8, u8), u8>, u8>(lazy_config());
    let mut key = HashMap::new();
    key.insert((1, 2), 3);

    let result = cache.set(key, 1, SetOptions::default());
    assert!(matches!(result, Err(CacheError::KeyNormalization(_))));
}

#[test]
fn test_custom_normalizer() -> anyhow::Result<()> {
    let cache: Cache<String, u8> = Cache::builder()
        .config(lazy_config())
        .normalizer(CaseInsensitive)
        .build();

    cache.set("Alice".to_string(), 1, SetOptions::default())?;
    assert!(cache.has(&"ALICE".to_string())?);
    Ok(())
}

// == Queries ==

#[test]
fn test_tag_invalidation() -> anyhow::Result<()> {
    let (cache, _) = clocked_cache::<String, u32>(lazy_config());

    cache.set("user:1".into(), 1, SetOptions::new().tags(["users", "tenant:a"]))?;
    cache.set("user:2".into(), 2, SetOptions::new().tags(["users", "tenant:b"]))?;
    cache.set("post:1".into(), 3, SetOptions::new().tags(["posts", "tenant:a"]))?;

    let tenant_a_users = Finder::from(EntryFilter::new().every_tag(["users", "tenant:a"]));
    let found = cache.find(&tenant_a_users)?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].key, "user:1");

    let tenant_a = Finder::from(EntryFilter::new().some_tag(["tenant:a"]));
    assert_eq!(cache.remove_by_finder(&tenant_a)?, 2);

    let remaining: Vec<String> = cache.all().into_iter().map(|e| e.key).collect();
    assert_eq!(remaining, vec!["user:2".to_string()]);
    Ok(())
}

#[test]
fn test_find_by_keys_uses_normalized_identity() -> anyhow::Result<()> {
    let (cache, _) = clocked_cache::<Value, u8>(lazy_config());

    cache.set(json!({"x": 1, "y": 2}), 1, SetOptions::default())?;
    cache.set(json!({"x": 3}), 2, SetOptions::default())?;

    let finder = Finder::from(EntryFilter::new().keys([json!({"y": 2, "x": 1})]));
    let found = cache.find(&finder)?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].value, 1);
    Ok(())
}

#[test]
fn test_empty_filter_never_wipes_the_cache() -> anyhow::Result<()> {
    let (cache, _) = clocked_cache::<u8, u8>(lazy_config());
    cache.set(1, 1, SetOptions::default())?;

    assert_eq!(cache.remove_by_finder(&Finder::from(EntryFilter::new()))?, 0);
    assert_eq!(cache.len(), 1);
    Ok(())
}

#[test]
fn test_find_skips_expired_entries() -> anyhow::Result<()> {
    let (cache, clock) = clocked_cache::<u8, u8>(lazy_config());
    cache.set(1, 1, SetOptions::new().tags(["t"]).cache_time(Duration::from_millis(5)))?;
    cache.set(2, 2, SetOptions::new().tags(["t"]))?;

    clock.advance(Duration::from_millis(10));
    let found = cache.find(&Finder::predicate(|entry: &Entry<u8, u8>| entry.has_tag("t")))?;
    assert_eq!(found.len(), 1);
    assert_eq!(cache.len(), 1);
    Ok(())
}

// == Loading ==

#[test]
fn test_get_or_set_with_anyhow_errors() -> anyhow::Result<()> {
    let (cache, _) = clocked_cache::<String, String>(lazy_config());

    let failed: anyhow::Result<String> = cache.get_or_set(
        "config".to_string(),
        || Err(anyhow!("upstream unavailable")),
        SetOptions::default(),
    );
    assert!(failed.is_err());
    assert!(!cache.has(&"config".to_string())?);

    let loaded = cache.get_or_set(
        "config".to_string(),
        || Ok::<_, anyhow::Error>("v1".to_string()),
        SetOptions::default(),
    )?;
    assert_eq!(loaded, "v1");

    let cached = cache.get_or_set(
        "config".to_string(),
        || Err(anyhow!("must not be called")),
        SetOptions::default(),
    )?;
    assert_eq!(cached, "v1");
    Ok(())
}

// == Backends ==

#[test]
fn test_custom_backend_sees_refresh_writes() -> anyhow::Result<()> {
    init_tracing();
    let backend = Arc::new(RecordingBackend::default());
    let clock = Arc::new(ManualClock::new(START));
    let cache: Cache<Value, String> = Cache::builder()
        .config(lazy_config())
        .backend(backend.clone())
        .clock(clock.clone())
        .build();

    let key = json!(["report", 2024]);
    cache.set(
        key.clone(),
        "pdf".to_string(),
        SetOptions::new().cache_time(Duration::from_secs(60)).refresh(true),
    )?;
    clock.advance(Duration::from_secs(30));
    cache.get(&key, GetOptions::default())?;

    assert_eq!(backend.writes.load(Ordering::SeqCst), 2);
    let stored = backend.get_value(&backend.all_keys()[0]).context("entry stored")?;
    assert_eq!(stored.expires_at, Some(START + 90_000));

    cache.clear();
    assert!(backend.all_keys().is_empty());
    Ok(())
}
