//! Storage Module
//!
//! The async key/value contract the cache is layered over, plus the two
//! backends shipped with the crate.

mod file;
mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use file::FileStorage;
pub use memory::MemoryStorage;

// == Storage Error ==
/// Failure reported by a storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Filesystem operation failed
    #[error("I/O error during {op} on {key}: {source}")]
    Io {
        op: &'static str,
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Stored bytes do not match the backend's own file layout
    #[error("Corrupt storage record for {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Backend cannot serve the request
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

// == Storage Backend ==
/// Raw string key/value store with eventual persistence.
///
/// Keys and values are opaque strings at this layer; the cache imposes the
/// namespace prefix and entry envelope on top. Implementations must allow
/// concurrent operations on distinct keys.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short backend name used in log fields.
    fn name(&self) -> &'static str;

    /// Returns the raw value, or `None` if the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Stores the raw value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Deletes the key. Deleting an absent key succeeds.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Deletes every listed key. Not atomic: on error some keys may be gone.
    async fn remove_many(&self, keys: &[String]) -> Result<(), StorageError>;

    /// Lists every key currently stored, in no particular order.
    async fn all_keys(&self) -> Result<Vec<String>, StorageError>;
}
