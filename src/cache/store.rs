//! Cache Store Module
//!
//! The persistent cache: namespacing, entry envelopes and lazy TTL expiry
//! layered over an injected storage backend.
//!
//! Each operation comes in two forms. The `try_*` form returns every failure
//! as a [`CacheError`]; the plain form logs the failure and falls back to a
//! safe default, so a broken backend only ever looks like a cache miss.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::namespace::Namespace;
use crate::cache::{CacheEntry, Clock, SystemClock, DEFAULT_PREFIX};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::storage::{FileStorage, StorageBackend};

// == Set Options ==
/// Per-write options for [`PersistentCache::set`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Lifetime in milliseconds, None = never expires
    pub expiry_ms: Option<u64>,
}

impl SetOptions {
    /// Entry expires `ttl` after it is written.
    pub fn expiring_in(ttl: Duration) -> Self {
        Self::expiry_ms(ttl.as_millis() as u64)
    }

    /// Entry expires `ms` milliseconds after it is written.
    pub fn expiry_ms(ms: u64) -> Self {
        Self {
            expiry_ms: Some(ms),
        }
    }
}

// == Lookup ==
/// Detailed outcome of a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    /// Live entry found
    Hit(T),
    /// No entry under the key
    Miss,
    /// Entry was stale and has been deleted from the backend
    ExpiredAndPurged,
}

impl<T> Lookup<T> {
    /// Collapses the outcome to the value, if any.
    pub fn into_value(self) -> Option<T> {
        match self {
            Lookup::Hit(value) => Some(value),
            Lookup::Miss | Lookup::ExpiredAndPurged => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }
}

// == Persistent Cache ==
/// Namespaced, optionally expiring cache over a [`StorageBackend`].
///
/// Cloning is cheap and every clone shares the same backend and namespace.
/// No locking is done here: concurrent writes to one key race at the
/// backend and the last one to land wins.
#[derive(Clone)]
pub struct PersistentCache {
    storage: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
    namespace: Namespace,
}

impl fmt::Debug for PersistentCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentCache")
            .field("backend", &self.storage.name())
            .field("prefix", &self.namespace.prefix())
            .finish()
    }
}

impl PersistentCache {
    // == Constructors ==
    /// Creates a cache over `storage` with the default prefix and system clock.
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            storage,
            clock: Arc::new(SystemClock),
            namespace: Namespace::new(DEFAULT_PREFIX),
        }
    }

    /// Replaces the namespace prefix.
    ///
    /// An empty prefix is ignored and the current one kept: it would claim
    /// every key in the backend, so `clear` would wipe data the cache does
    /// not own.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        if prefix.is_empty() {
            warn!(kept = self.namespace.prefix(), "Ignoring empty cache prefix");
            return self;
        }
        self.namespace = Namespace::new(prefix);
        self
    }

    /// Replaces the clock used for write stamps and expiry checks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Opens file storage at the configured directory and builds a cache on it.
    pub async fn from_config(config: &CacheConfig) -> Result<Self> {
        let storage = FileStorage::open(&config.storage_dir).await?;
        Ok(Self::new(Arc::new(storage)).with_prefix(config.prefix.clone()))
    }

    /// The namespace prefix in use.
    pub fn prefix(&self) -> &str {
        self.namespace.prefix()
    }

    // == Fallible Operations ==
    /// Writes `value` under `key`, replacing any previous entry.
    pub async fn try_set<T>(&self, key: &str, value: &T, options: SetOptions) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        validate_key(key)?;

        let entry = CacheEntry::new(value, self.clock.now_ms(), options.expiry_ms);
        let raw = serde_json::to_string(&entry).map_err(|source| CacheError::Serialize {
            key: key.to_string(),
            source,
        })?;

        self.storage.set(&self.namespace.raw_key(key), &raw).await?;
        Ok(())
    }

    /// Reads `key`, deleting it first if it turns out to be stale.
    ///
    /// The purge completes before this returns, so a stale entry is gone from
    /// [`keys`](Self::keys) once a lookup has reported it.
    pub async fn try_lookup<T>(&self, key: &str) -> Result<Lookup<T>>
    where
        T: DeserializeOwned,
    {
        validate_key(key)?;

        let raw_key = self.namespace.raw_key(key);
        let Some(raw) = self.storage.get(&raw_key).await? else {
            return Ok(Lookup::Miss);
        };

        // Liveness is judged on the envelope alone so a stale entry is purged
        // even when its payload no longer matches `T`.
        let envelope: CacheEntry<IgnoredAny> =
            serde_json::from_str(&raw).map_err(|source| CacheError::CorruptEntry {
                key: key.to_string(),
                source,
            })?;

        if !envelope.is_live_at(self.clock.now_ms()) {
            self.storage.remove(&raw_key).await?;
            debug!(key, "Purged expired entry on read");
            return Ok(Lookup::ExpiredAndPurged);
        }

        let entry: CacheEntry<T> =
            serde_json::from_str(&raw).map_err(|source| CacheError::CorruptEntry {
                key: key.to_string(),
                source,
            })?;
        let value = entry.data;
        Ok(Lookup::Hit(value))
    }

    /// Deletes `key`. Absent keys are not an error.
    pub async fn try_remove(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.storage.remove(&self.namespace.raw_key(key)).await?;
        Ok(())
    }

    /// Deletes every entry in the namespace, returning how many were targeted.
    pub async fn try_clear(&self) -> Result<usize> {
        let raw_keys = self.namespaced_raw_keys().await?;
        if raw_keys.is_empty() {
            return Ok(0);
        }

        self.storage.remove_many(&raw_keys).await?;
        debug!("Cleared {} cache entries", raw_keys.len());
        Ok(raw_keys.len())
    }

    /// Lists logical keys physically present, stale ones included.
    pub async fn try_keys(&self) -> Result<Vec<String>> {
        let keys = self
            .storage
            .all_keys()
            .await?
            .iter()
            .filter_map(|raw| self.namespace.logical_key(raw))
            .map(str::to_string)
            .collect();
        Ok(keys)
    }

    /// Deletes every stale entry in the namespace, returning the count.
    ///
    /// Entries that cannot be read or parsed are skipped and left in place.
    pub async fn try_purge_expired(&self) -> Result<usize> {
        let now = self.clock.now_ms();
        let mut stale = Vec::new();

        for raw_key in self.namespaced_raw_keys().await? {
            let raw = match self.storage.get(&raw_key).await {
                Ok(Some(raw)) => raw,
                // Removed since listing
                Ok(None) => continue,
                Err(e) => {
                    warn!(key = %raw_key, error = %e, "Skipping unreadable entry during purge");
                    continue;
                }
            };

            match serde_json::from_str::<CacheEntry<IgnoredAny>>(&raw) {
                Ok(entry) if !entry.is_live_at(now) => stale.push(raw_key),
                Ok(_) => {}
                Err(e) => debug!(key = %raw_key, error = %e, "Skipping corrupt entry during purge"),
            }
        }

        if !stale.is_empty() {
            self.storage.remove_many(&stale).await?;
        }
        debug!("Purged {} expired cache entries", stale.len());
        Ok(stale.len())
    }

    // == Best-effort Operations ==
    /// Stores `value` under `key`. Failures are logged and swallowed.
    pub async fn set<T>(&self, key: &str, value: &T, options: SetOptions)
    where
        T: Serialize + ?Sized,
    {
        if let Err(e) = self.try_set(key, value, options).await {
            self.log_failure("set", key, &e);
        }
    }

    /// Returns the live value under `key`, or None on miss, expiry or failure.
    ///
    /// A stale entry is deleted from the backend before this returns.
    pub async fn get<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        match self.try_lookup(key).await {
            Ok(lookup) => lookup.into_value(),
            Err(e) => {
                self.log_failure("get", key, &e);
                None
            }
        }
    }

    /// Deletes `key` if present. Failures are logged and swallowed.
    pub async fn remove(&self, key: &str) {
        if let Err(e) = self.try_remove(key).await {
            self.log_failure("remove", key, &e);
        }
    }

    /// Deletes every entry in the namespace. Keys outside it are untouched.
    pub async fn clear(&self) {
        if let Err(e) = self.try_clear().await {
            self.log_failure("clear", "*", &e);
        }
    }

    /// Logical keys physically present; empty if the backend cannot list.
    pub async fn keys(&self) -> Vec<String> {
        match self.try_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                self.log_failure("keys", "*", &e);
                Vec::new()
            }
        }
    }

    /// Deletes stale entries now rather than waiting for them to be read.
    /// Returns the number removed, 0 on failure.
    pub async fn purge_expired(&self) -> usize {
        match self.try_purge_expired().await {
            Ok(count) => count,
            Err(e) => {
                self.log_failure("purge_expired", "*", &e);
                0
            }
        }
    }

    /// Returns the cached value for `key`, or fetches, caches and returns it.
    ///
    /// Errors from `fetch` are passed through untouched; storing the fetched
    /// value is best-effort like [`set`](Self::set).
    pub async fn get_or_insert_with<T, E, F, Fut>(
        &self,
        key: &str,
        options: SetOptions,
        fetch: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        let value = fetch().await?;
        self.set(key, &value, options).await;
        Ok(value)
    }

    // == Helpers ==
    async fn namespaced_raw_keys(&self) -> Result<Vec<String>> {
        let keys = self
            .storage
            .all_keys()
            .await?
            .into_iter()
            .filter(|raw| self.namespace.logical_key(raw).is_some())
            .collect();
        Ok(keys)
    }

    fn log_failure(&self, op: &'static str, key: &str, err: &CacheError) {
        warn!(
            op,
            key,
            backend = self.storage.name(),
            error = %err,
            "Cache operation failed, falling back to default"
        );
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("Key cannot be empty".to_string()));
    }
    Ok(())
}
