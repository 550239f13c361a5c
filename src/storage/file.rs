//! Directory-backed storage backend.
//!
//! Each raw key maps to one file. Short keys are stored under the hex
//! encoding of the key, so any string is a valid key regardless of
//! filesystem naming rules. Keys whose hex name would not fit a file name
//! are stored under their SHA-256 digest instead, with the key recorded
//! inside the file so listing can recover it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};

use super::{StorageBackend, StorageError};

const ENTRY_EXTENSION: &str = "entry";
const DIGEST_EXTENSION: &str = "digest";

/// Longest hex stem used as a file name; leaves room for the temp suffix
/// under the common 255-byte file name limit.
const MAX_HEX_NAME_LEN: usize = 200;

/// On-disk layout of a digest-named file.
#[derive(Serialize, Deserialize)]
struct KeyedValue<S> {
    key: S,
    value: S,
}

// == File Storage ==
/// Persists every raw key as a file in a single directory.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
    /// Suffix source for temp files so concurrent writes never share one
    write_seq: AtomicU64,
}

impl FileStorage {
    /// Opens the store at `dir`, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|source| StorageError::Io {
            op: "open",
            key: dir.display().to_string(),
            source,
        })?;
        debug!(dir = %dir.display(), "File storage opened");

        Ok(Self {
            dir,
            write_seq: AtomicU64::new(0),
        })
    }

    /// Directory holding the entry files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(file_name(key))
    }

    async fn remove_file(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                op: "remove",
                key: key.to_string(),
                source,
            }),
        }
    }

    /// Reads the key recorded in a digest-named file.
    async fn recorded_key(&self, path: &Path) -> Option<String> {
        let name = path.file_name()?.to_str()?;
        let contents = match fs::read_to_string(path).await {
            Ok(contents) => contents,
            // Removed since listing
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable entry file");
                return None;
            }
        };

        match serde_json::from_str::<KeyedValue<String>>(&contents) {
            Ok(record) if file_name(&record.key) == name => Some(record.key),
            _ => {
                debug!(path = %path.display(), "Skipping foreign digest file");
                None
            }
        }
    }
}

#[async_trait]
impl StorageBackend for FileStorage {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let contents = match fs::read_to_string(self.entry_path(key)).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StorageError::Io {
                    op: "get",
                    key: key.to_string(),
                    source,
                })
            }
        };

        if !is_digest_named(key) {
            return Ok(Some(contents));
        }

        let record: KeyedValue<String> =
            serde_json::from_str(&contents).map_err(|source| StorageError::Corrupt {
                key: key.to_string(),
                source,
            })?;
        // A digest collision is reported as absence rather than another key's value
        Ok((record.key == key).then_some(record.value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let name = file_name(key);
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self.dir.join(format!("{}.{}.tmp", name, seq));
        let io_err = |source| StorageError::Io {
            op: "set",
            key: key.to_string(),
            source,
        };

        let contents = if is_digest_named(key) {
            serde_json::to_string(&KeyedValue { key, value }).map_err(|source| {
                StorageError::Corrupt {
                    key: key.to_string(),
                    source,
                }
            })?
        } else {
            value.to_string()
        };

        fs::write(&tmp, contents).await.map_err(io_err)?;
        if let Err(source) = fs::rename(&tmp, self.dir.join(name)).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(io_err(source));
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.remove_file(key).await
    }

    async fn remove_many(&self, keys: &[String]) -> Result<(), StorageError> {
        let mut first_err = None;
        let mut failed = 0usize;

        for key in keys {
            if let Err(e) = self.remove_file(key).await {
                failed += 1;
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => {
                warn!(failed, total = keys.len(), "Bulk remove left some entries behind");
                Err(e)
            }
            None => Ok(()),
        }
    }

    async fn all_keys(&self) -> Result<Vec<String>, StorageError> {
        let io_err = |source| StorageError::Io {
            op: "all_keys",
            key: String::new(),
            source,
        };

        let mut dir = fs::read_dir(&self.dir).await.map_err(io_err)?;
        let mut keys = Vec::new();

        while let Some(item) = dir.next_entry().await.map_err(io_err)? {
            let os_name = item.file_name();
            let Some(name) = os_name.to_str() else {
                continue;
            };

            if let Some(stem) = strip_extension(name, ENTRY_EXTENSION) {
                if let Some(key) = decode_key(stem) {
                    keys.push(key);
                }
            } else if strip_extension(name, DIGEST_EXTENSION).is_some() {
                if let Some(key) = self.recorded_key(&item.path()).await {
                    keys.push(key);
                }
            }
        }

        Ok(keys)
    }
}

// == Key Encoding ==
fn is_digest_named(key: &str) -> bool {
    key.len() * 2 > MAX_HEX_NAME_LEN
}

fn file_name(key: &str) -> String {
    if is_digest_named(key) {
        format!("{}.{}", hex::encode(Sha256::digest(key.as_bytes())), DIGEST_EXTENSION)
    } else {
        format!("{}.{}", encode_key(key), ENTRY_EXTENSION)
    }
}

fn strip_extension<'a>(name: &'a str, extension: &str) -> Option<&'a str> {
    name.strip_suffix(extension)?.strip_suffix('.')
}

fn encode_key(key: &str) -> String {
    hex::encode(key.as_bytes())
}

/// Inverse of `encode_key` for names this backend wrote itself.
fn decode_key(encoded: &str) -> Option<String> {
    let key = String::from_utf8(hex::decode(encoded).ok()?).ok()?;
    (!is_digest_named(&key) && encode_key(&key) == encoded).then_some(key)
}
