//! Error types for the cache
//!
//! Provides unified error handling using thiserror. None of these reach the
//! caller of the public cache operations; they exist for the `try_*` layer.

use thiserror::Error;

use crate::storage::StorageError;

// == Cache Error Enum ==
/// Unified error type for cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Logical key rejected before touching the backend
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Value could not be encoded into an entry envelope
    #[error("Failed to serialize entry for key {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Stored payload is not a valid entry envelope for the requested type
    #[error("Corrupt entry for key {key}: {source}")]
    CorruptEntry {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Backend read, write or delete failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
