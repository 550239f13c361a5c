//! Configuration Module
//!
//! Handles loading cache configuration from environment variables.

use std::env;
use std::path::PathBuf;

use crate::cache::DEFAULT_PREFIX;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Namespace prefix applied to every logical key
    pub prefix: String,
    /// Directory backing the file storage
    pub storage_dir: PathBuf,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_PREFIX` - Namespace prefix (default: `cache_`)
    /// - `CACHE_DIR` - File storage directory (default: user cache dir)
    ///
    /// Empty values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            prefix: non_empty_var("CACHE_PREFIX").unwrap_or(defaults.prefix),
            storage_dir: non_empty_var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_dir),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            storage_dir: default_storage_dir(),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn default_storage_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(env::temp_dir)
        .join("persistent_cache")
}
