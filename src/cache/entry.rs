//! Cache Entry Module
//!
//! Defines the envelope every cached value is stored in.

use serde::{Deserialize, Serialize};

// == Cache Entry ==
/// A cached value with its write time and optional lifetime.
///
/// Serialized as `{"data": .., "writtenAtMs": .., "ttlMs": ..}`; `ttlMs` is
/// omitted when the entry never expires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    /// The stored value
    pub data: T,
    /// Write timestamp (Unix milliseconds)
    pub written_at_ms: u64,
    /// Lifetime in milliseconds, None = no expiration
    #[serde(default, alias = "expiryMs", skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<u64>,
}

impl<T> CacheEntry<T> {
    // == Constructor ==
    /// Creates an entry stamped with `now_ms`.
    pub fn new(data: T, now_ms: u64, ttl_ms: Option<u64>) -> Self {
        Self {
            data,
            written_at_ms: now_ms,
            ttl_ms,
        }
    }

    /// Milliseconds since the write. A clock behind the write time reads as 0.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.written_at_ms)
    }

    // == Liveness ==
    /// Checks whether the entry may still be served at `now_ms`.
    ///
    /// Boundary condition: an entry whose age equals its TTL is still live;
    /// it turns stale one millisecond later.
    pub fn is_live_at(&self, now_ms: u64) -> bool {
        match self.ttl_ms {
            Some(ttl) => self.age_ms(now_ms) <= ttl,
            None => true,
        }
    }

    // == Time To Live ==
    /// Returns remaining lifetime in milliseconds.
    ///
    /// # Returns
    /// - `Some(0)` if the entry is stale or exactly at its boundary
    /// - `Some(remaining_ms)` if the entry has a TTL and is live
    /// - `None` if the entry never expires
    pub fn ttl_remaining_ms(&self, now_ms: u64) -> Option<u64> {
        self.ttl_ms.map(|ttl| ttl.saturating_sub(self.age_ms(now_ms)))
    }
}
