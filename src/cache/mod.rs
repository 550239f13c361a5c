//! Cache Module
//!
//! Provides namespaced caching with lazy TTL expiration over pluggable storage.

mod clock;
mod entry;
mod namespace;
mod store;


// Re-export public types
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::CacheEntry;
pub use store::{Lookup, PersistentCache, SetOptions};

// == Public Constants ==
/// Namespace prefix used unless one is configured
pub const DEFAULT_PREFIX: &str = "cache_";
