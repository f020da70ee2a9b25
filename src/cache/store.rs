use crate::error::CacheError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};
use xxhash_rust::xxh64::xxh64;

const RECORD_EXT: &str = "cache";
const SKIP_EXT: &str = "skip";

/// What the prober said about one file at one byte length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub byte_length: u64,
    pub name: String,
    pub module_type: String,
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheRecord {
    /// Playable module, valid while the file keeps this length.
    Module(CacheEntry),
    /// Checked and rejected; never re-probed until evicted.
    Skip,
}

/// Keyed persistence for validity records.
///
/// Implementations must tolerate concurrent calls for different keys.
/// Calls for the same key are serialized by the caller.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<CacheRecord>, CacheError>;

    /// Replace whatever is stored for `key`.
    fn put(&self, key: &str, record: &CacheRecord) -> Result<(), CacheError>;

    /// Returns whether anything was removed.
    fn remove(&self, key: &str) -> Result<bool, CacheError>;

    fn clear(&self) -> Result<(), CacheError>;
}

/// Flat directory of small files: one JSON record plus one skip marker per source file.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct DiskRecord {
    path: String,
    #[serde(flatten)]
    entry: CacheEntry,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        if !root.exists() {
            fs::create_dir_all(&root)?;
            info!("Created module cache directory: {}", root.display());
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // Hashed names keep URIs and deep paths flat; the key inside the file guards collisions
    fn slot(&self, key: &str, ext: &str) -> PathBuf {
        let hash = format!("{:016x}", xxh64(key.as_bytes(), 0));
        self.root.join(&hash[..2]).join(format!("{}.{}", hash, ext))
    }

    fn read_record(&self, key: &str, path: &Path) -> Result<Option<CacheEntry>, CacheError> {
        let content = fs::read_to_string(path)?;
        let record: DiskRecord = serde_json::from_str(&content).map_err(|e| CacheError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        if record.path != key {
            debug!("Cache slot {} belongs to {}, not {}", path.display(), record.path, key);
            return Ok(None);
        }
        Ok(Some(record.entry))
    }

    fn marker_matches(&self, key: &str, path: &Path) -> Result<bool, CacheError> {
        let content = fs::read_to_string(path)?;
        Ok(content.is_empty() || content == key)
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl CacheStore for DirStore {
    fn get(&self, key: &str) -> Result<Option<CacheRecord>, CacheError> {
        let record_path = self.slot(key, RECORD_EXT);
        let skip_path = self.slot(key, SKIP_EXT);

        if record_path.is_file() {
            // A positive record supersedes a leftover skip marker; the next
            // locked `put` or `remove` for this key cleans the marker up
            if let Some(entry) = self.read_record(key, &record_path)? {
                return Ok(Some(CacheRecord::Module(entry)));
            }
        }

        if skip_path.is_file() && self.marker_matches(key, &skip_path)? {
            return Ok(Some(CacheRecord::Skip));
        }

        Ok(None)
    }

    fn put(&self, key: &str, record: &CacheRecord) -> Result<(), CacheError> {
        match record {
            CacheRecord::Module(entry) => {
                let disk = DiskRecord {
                    path: key.to_string(),
                    entry: entry.clone(),
                };
                let json = serde_json::to_vec_pretty(&disk)?;
                self.write_atomic(&self.slot(key, RECORD_EXT), &json)?;
                remove_if_exists(&self.slot(key, SKIP_EXT))?;
            }
            CacheRecord::Skip => {
                self.write_atomic(&self.slot(key, SKIP_EXT), key.as_bytes())?;
                remove_if_exists(&self.slot(key, RECORD_EXT))?;
            }
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let record = remove_if_exists(&self.slot(key, RECORD_EXT))?;
        let skip = remove_if_exists(&self.slot(key, SKIP_EXT))?;
        Ok(record || skip)
    }

    fn clear(&self) -> Result<(), CacheError> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        fs::create_dir_all(&self.root)?;
        info!("Cleared module cache at {}", self.root.display());
        Ok(())
    }
}

fn remove_if_exists(path: &Path) -> Result<bool, CacheError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Process-local store for hosts without persistence, and for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, CacheRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<CacheRecord>, CacheError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(key).cloned())
    }

    fn put(&self, key: &str, record: &CacheRecord) -> Result<(), CacheError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.insert(key.to_string(), record.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.remove(key).is_some())
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clear();
        Ok(())
    }
}
