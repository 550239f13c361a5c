//! Integration Tests for the Persistent Cache
//!
//! Exercises the public API end to end over file-backed storage, the system
//! clock, and a fault-injecting backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use persistent_cache::{
    CacheConfig, FileStorage, MemoryStorage, PersistentCache, SetOptions, StorageBackend,
    StorageError,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tempfile::TempDir;

// == Helper Functions ==

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn file_cache() -> (TempDir, Arc<FileStorage>, PersistentCache) {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(FileStorage::open(dir.path()).await.unwrap());
    let cache = PersistentCache::new(storage.clone());
    (dir, storage, cache)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Settings {
    theme: String,
    notifications: bool,
    volume: Option<u8>,
}

/// Memory backend that fails selected operations on demand.
#[derive(Default)]
struct FaultyStorage {
    inner: MemoryStorage,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_removes: AtomicBool,
}

impl FaultyStorage {
    fn fault(flag: &AtomicBool, op: &str) -> Result<(), StorageError> {
        if flag.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable(format!("injected {} failure", op)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StorageBackend for FaultyStorage {
    fn name(&self) -> &'static str {
        "faulty"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Self::fault(&self.fail_reads, "get")?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        Self::fault(&self.fail_writes, "set")?;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        Self::fault(&self.fail_removes, "remove")?;
        self.inner.remove(key).await
    }

    async fn remove_many(&self, keys: &[String]) -> Result<(), StorageError> {
        Self::fault(&self.fail_removes, "remove_many")?;
        self.inner.remove_many(keys).await
    }

    async fn all_keys(&self) -> Result<Vec<String>, StorageError> {
        Self::fault(&self.fail_reads, "all_keys")?;
        self.inner.all_keys().await
    }
}

// == File Storage Tests ==

#[tokio::test]
async fn test_file_roundtrip_struct() {
    let (_dir, _, cache) = file_cache().await;
    let settings = Settings {
        theme: "dark".to_string(),
        notifications: false,
        volume: None,
    };

    cache.set("settings", &settings, SetOptions::default()).await;

    assert_eq!(cache.get::<Settings>("settings").await, Some(settings));
}

#[tokio::test]
async fn test_file_roundtrip_json_values() {
    let (_dir, _, cache) = file_cache().await;
    let value = json!({
        "list": [1, -2, 3.5, null, "four"],
        "nested": {"empty": {}, "flag": true},
        "unicode": "héllo ✓"
    });

    cache.set("doc", &value, SetOptions::default()).await;

    assert_eq!(cache.get::<serde_json::Value>("doc").await, Some(value));
}

#[tokio::test]
async fn test_entries_survive_new_cache_instance() {
    let (dir, _, cache) = file_cache().await;
    cache.set("token", "abc123", SetOptions::default()).await;
    drop(cache);

    let reopened = PersistentCache::new(Arc::new(FileStorage::open(dir.path()).await.unwrap()));

    assert_eq!(reopened.get::<String>("token").await.as_deref(), Some("abc123"));
}

#[tokio::test]
async fn test_expiry_with_system_clock() {
    let (_dir, _, cache) = file_cache().await;

    cache.set("short", "v", SetOptions::expiry_ms(100)).await;
    cache.set("forever", "v", SetOptions::default()).await;
    assert_eq!(cache.get::<String>("short").await.as_deref(), Some("v"));

    // Wait for expiration
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(cache.get::<String>("short").await, None);
    assert_eq!(cache.keys().await, vec!["forever".to_string()]);
    assert_eq!(cache.get::<String>("forever").await.as_deref(), Some("v"));
}

#[tokio::test]
async fn test_file_clear_spares_foreign_keys() {
    let (_dir, storage, cache) = file_cache().await;
    storage.set("auth_session", "keep me").await.unwrap();
    cache.set("k1", &1, SetOptions::default()).await;
    cache.set("k2", &2, SetOptions::default()).await;

    let mut keys = cache.keys().await;
    keys.sort();
    assert_eq!(keys, vec!["k1".to_string(), "k2".to_string()]);

    cache.clear().await;

    assert_eq!(cache.get::<i32>("k1").await, None);
    assert_eq!(cache.get::<i32>("k2").await, None);
    assert!(cache.keys().await.is_empty());
    assert_eq!(
        storage.get("auth_session").await.unwrap().as_deref(),
        Some("keep me")
    );
}

#[tokio::test]
async fn test_file_long_url_key_round_trips() {
    let (_dir, _, cache) = file_cache().await;
    let query: Vec<String> = (0..20).map(|i| format!("field{}=value{}", i, i)).collect();
    let key = format!(
        "https://api.example.com/v2/organizations/1234/members?{}",
        query.join("&")
    );
    assert!(key.len() >= 200);

    cache.set(&key, &vec!["ada", "grace"], SetOptions::default()).await;
    cache.set("short", &1, SetOptions::default()).await;

    assert_eq!(
        cache.get::<Vec<String>>(&key).await,
        Some(vec!["ada".to_string(), "grace".to_string()])
    );
    let mut keys = cache.keys().await;
    keys.sort();
    assert_eq!(keys, vec![key.clone(), "short".to_string()]);

    cache.remove(&key).await;
    assert_eq!(cache.get::<Vec<String>>(&key).await, None);
    assert_eq!(cache.keys().await, vec!["short".to_string()]);
}

#[tokio::test]
async fn test_file_clear_removes_what_it_can() {
    let (_dir, storage, cache) = file_cache().await;
    cache.set("a", &1, SetOptions::default()).await;
    cache.set("c", &3, SetOptions::default()).await;
    // Same file name FileStorage uses for raw key "cache_b", as a directory
    let stuck = storage.dir().join(format!("{}.entry", hex::encode("cache_b")));
    std::fs::create_dir(&stuck).unwrap();

    let mut keys = cache.keys().await;
    keys.sort();
    assert_eq!(keys, vec!["a", "b", "c"]);

    assert!(cache.try_clear().await.is_err());
    assert_eq!(cache.keys().await, vec!["b".to_string()]);

    cache.set("d", &4, SetOptions::default()).await;
    cache.clear().await;
    assert_eq!(cache.keys().await, vec!["b".to_string()]);
    assert_eq!(cache.get::<i32>("d").await, None);
}

#[tokio::test]
async fn test_corrupt_file_reads_as_miss() {
    let (_dir, storage, cache) = file_cache().await;
    storage.set("cache_broken", "\u{0}garbage").await.unwrap();

    assert_eq!(cache.get::<String>("broken").await, None);
    assert_eq!(cache.keys().await, vec!["broken".to_string()]);

    cache.set("broken", "fixed", SetOptions::default()).await;
    assert_eq!(cache.get::<String>("broken").await.as_deref(), Some("fixed"));
}

#[tokio::test]
async fn test_from_config_uses_prefix_and_dir() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = CacheConfig {
        prefix: "app:".to_string(),
        storage_dir: dir.path().join("nested").join("cache"),
    };

    let cache = PersistentCache::from_config(&config).await.unwrap();
    cache.set("k", "v", SetOptions::default()).await;

    assert_eq!(cache.prefix(), "app:");
    let raw = FileStorage::open(&config.storage_dir).await.unwrap();
    assert_eq!(raw.all_keys().await.unwrap(), vec!["app:k".to_string()]);
}

// == Fault Containment Tests ==

#[tokio::test]
async fn test_failed_write_resolves_without_error() {
    init_tracing();
    let storage = Arc::new(FaultyStorage::default());
    let cache = PersistentCache::new(storage.clone());
    storage.fail_writes.store(true, Ordering::SeqCst);

    cache.set("k", "v", SetOptions::default()).await;
    assert!(cache.try_set("k", "v", SetOptions::default()).await.is_err());

    storage.fail_writes.store(false, Ordering::SeqCst);
    assert_eq!(cache.get::<String>("k").await, None);
}

#[tokio::test]
async fn test_failed_read_is_miss_and_keeps_entry() {
    init_tracing();
    let storage = Arc::new(FaultyStorage::default());
    let cache = PersistentCache::new(storage.clone());
    cache.set("k", "v", SetOptions::default()).await;

    storage.fail_reads.store(true, Ordering::SeqCst);
    assert_eq!(cache.get::<String>("k").await, None);
    assert!(cache.keys().await.is_empty());

    storage.fail_reads.store(false, Ordering::SeqCst);
    assert_eq!(cache.get::<String>("k").await.as_deref(), Some("v"));
}

#[tokio::test]
async fn test_failed_removes_are_swallowed() {
    init_tracing();
    let storage = Arc::new(FaultyStorage::default());
    let cache = PersistentCache::new(storage.clone());
    cache.set("a", "1", SetOptions::default()).await;
    cache.set("b", "2", SetOptions::default()).await;

    storage.fail_removes.store(true, Ordering::SeqCst);
    cache.remove("a").await;
    cache.clear().await;

    let mut keys = cache.keys().await;
    keys.sort();
    assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test]
async fn test_failed_purge_on_stale_read_still_misses() {
    init_tracing();
    let storage = Arc::new(FaultyStorage::default());
    let clock = persistent_cache::ManualClock::new(1_000);
    let cache = PersistentCache::new(storage.clone()).with_clock(Arc::new(clock.clone()));
    cache.set("k", "v", SetOptions::expiry_ms(10)).await;
    clock.advance(Duration::from_millis(11));

    storage.fail_removes.store(true, Ordering::SeqCst);
    assert_eq!(cache.get::<String>("k").await, None);
    assert_eq!(cache.keys().await, vec!["k".to_string()]);

    storage.fail_removes.store(false, Ordering::SeqCst);
    assert_eq!(cache.get::<String>("k").await, None);
    assert!(cache.keys().await.is_empty());
}

// == Concurrency Tests ==

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_on_distinct_keys() {
    let (_dir, _, cache) = file_cache().await;

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .set(&format!("item:{}", i), &i, SetOptions::default())
                    .await;
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(cache.keys().await.len(), 32);
    for i in 0..32 {
        assert_eq!(cache.get::<i32>(&format!("item:{}", i)).await, Some(i));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_on_same_key_last_write_wins() {
    let (_dir, _, cache) = file_cache().await;

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache.set("shared", &i, SetOptions::default()).await;
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let value = cache.get::<i32>("shared").await.expect("some write should land");
    assert!((0..16).contains(&value));
    assert_eq!(cache.keys().await, vec!["shared".to_string()]);
}
