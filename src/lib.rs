//! Persistent Cache - namespaced key/value caching with TTL expiry
//!
//! A thin policy layer over an injected async storage backend. Entries are
//! JSON envelopes stored under a fixed key prefix and expire lazily on read.
//! Every public cache operation is best-effort: backend failures degrade to
//! a cache miss instead of surfacing to the caller.

pub mod cache;
pub mod config;
pub mod error;
pub mod storage;

pub use cache::{
    CacheEntry, Clock, Lookup, ManualClock, PersistentCache, SetOptions, SystemClock,
    DEFAULT_PREFIX,
};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use storage::{FileStorage, MemoryStorage, StorageBackend, StorageError};
