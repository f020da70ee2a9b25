// Validity cache - remembers which files are playable modules, and what they are called
// Keyed by path + byte length; cache trouble degrades to a live probe, never to an error

pub mod background; // off-thread probing with a timeout
#[cfg(feature = "sqlite")]
pub mod sqlite; // embedded DB backend
pub mod store; // CacheStore trait + flat-file backend

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
pub use store::{CacheEntry, CacheRecord, CacheStore, DirStore, MemoryStore};

use crate::config::{CacheBackend, CacheConfig};
use crate::error::{CacheError, InvalidModule};
use crate::module::{ModInfo, ModuleProber};
use crate::storage::Storage;
use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, PoisonError};
use tracing::{debug, info, warn};
use xxhash_rust::xxh64::xxh64;

/// What the cache knows about a file without probing it.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Known(ModInfo),
    Rejected,
    Unknown,
}

pub struct ValidityCache {
    store: Box<dyn CacheStore>,
    prober: Box<dyn ModuleProber>,
    storage: Box<dyn Storage>,
    locks: KeyLocks,
}

impl ValidityCache {
    pub fn new(
        store: impl CacheStore + 'static,
        prober: impl ModuleProber + 'static,
        storage: impl Storage + 'static,
    ) -> Self {
        Self {
            store: Box::new(store),
            prober: Box::new(prober),
            storage: Box::new(storage),
            locks: KeyLocks::default(),
        }
    }

    /// Cheap check used for existence tests: no probe is ever run.
    ///
    /// A missing file evicts its cache entries and reports `false`; a file
    /// with a negative entry reports `false`; anything else (cached as a
    /// module, or not seen yet) reports `true`.
    pub fn is_valid(&self, path: &Path) -> bool {
        if !self.storage.is_file(path) {
            self.invalidate(path);
            return false;
        }
        !matches!(self.lookup(path), CacheLookup::Rejected)
    }

    /// Cached verdict for `path`, validated against the current file length.
    pub fn lookup(&self, path: &Path) -> CacheLookup {
        let key = cache_key(path);
        match self.store.get(&key) {
            Ok(Some(CacheRecord::Skip)) => CacheLookup::Rejected,
            Ok(Some(CacheRecord::Module(entry))) => match self.storage.byte_length(path) {
                Ok(len) if len == entry.byte_length => CacheLookup::Known(entry_info(entry)),
                _ => CacheLookup::Unknown,
            },
            Ok(None) => CacheLookup::Unknown,
            Err(e) => {
                warn!("Cache read failed for {}: {}", path.display(), e);
                CacheLookup::Unknown
            }
        }
    }

    /// Authoritative check; runs the prober only when the cache can't answer.
    pub fn probe(&self, path: &Path) -> Result<ModInfo, InvalidModule> {
        let key = cache_key(path);
        let _guard = self.locks.acquire(&key);
        self.probe_locked(&key, path)
    }

    /// Drop a negative verdict and probe again, for when supported formats changed.
    pub fn force_revalidate(&self, path: &Path) -> Result<ModInfo, InvalidModule> {
        let key = cache_key(path);
        let _guard = self.locks.acquire(&key);

        if let Ok(Some(CacheRecord::Skip)) = self.store.get(&key) {
            debug!("Dropping skip marker for {}", path.display());
            self.remove_quietly(&key);
        }
        self.probe_locked(&key, path)
    }

    /// Evict whatever is cached for `path`. Returns whether anything was removed.
    pub fn invalidate(&self, path: &Path) -> bool {
        let key = cache_key(path);
        let _guard = self.locks.acquire(&key);
        self.remove_quietly(&key)
    }

    /// Returns how many paths had entries.
    pub fn invalidate_all<P: AsRef<Path>>(&self, paths: &[P]) -> usize {
        paths.iter().filter(|p| self.invalidate(p.as_ref())).count()
    }

    /// Wipe the whole store (user-triggered).
    pub fn clear_all(&self) -> Result<(), CacheError> {
        self.store.clear()?;
        info!("Module validity cache cleared");
        Ok(())
    }

    /// Delete the file itself and forget it.
    pub fn delete_file(&self, path: &Path) -> bool {
        self.invalidate(path);
        match self.storage.remove(path) {
            Ok(()) => {
                info!("Deleted {}", path.display());
                true
            }
            Err(e) => {
                warn!("Failed to delete {}: {}", path.display(), e);
                false
            }
        }
    }

    fn probe_locked(&self, key: &str, path: &Path) -> Result<ModInfo, InvalidModule> {
        match self.store.get(key) {
            Ok(Some(CacheRecord::Skip)) => {
                debug!("Skip marker hit for {}", path.display());
                return Err(InvalidModule::Skipped {
                    path: path.to_path_buf(),
                });
            }
            Ok(Some(CacheRecord::Module(entry))) => match self.storage.byte_length(path) {
                Ok(len) if len == entry.byte_length => {
                    debug!("Cache hit for {}", path.display());
                    return Ok(entry_info(entry));
                }
                Ok(len) => {
                    debug!(
                        "Stale cache for {} ({} bytes cached, {} now)",
                        path.display(),
                        entry.byte_length,
                        len
                    );
                    self.remove_quietly(key);
                }
                // Unreadable now; the live probe below records the failure
                Err(_) => {}
            },
            Ok(None) => {}
            Err(e) => warn!("Cache read failed for {}, probing: {}", path.display(), e),
        }

        self.probe_live(key, path)
    }

    fn probe_live(&self, key: &str, path: &Path) -> Result<ModInfo, InvalidModule> {
        let opened = self
            .storage
            .byte_length(path)
            .and_then(|len| self.storage.open(path).map(|source| (len, source)));

        let (byte_length, mut source) = match opened {
            Ok(opened) => opened,
            Err(source) => {
                warn!("Cannot read {}: {}", path.display(), source);
                self.store_quietly(key, &CacheRecord::Skip);
                return Err(InvalidModule::Unreadable {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        match self.prober.test_module(source.as_mut()) {
            Some(info) => {
                debug!("Probed {}: {} [{}]", path.display(), info.name, info.module_type);
                let entry = CacheEntry {
                    byte_length,
                    name: info.name.clone(),
                    module_type: info.module_type.clone(),
                    cached_at: Utc::now(),
                };
                self.store_quietly(key, &CacheRecord::Module(entry));
                Ok(info)
            }
            None => {
                debug!("Probe rejected {}", path.display());
                self.store_quietly(key, &CacheRecord::Skip);
                Err(InvalidModule::Rejected {
                    path: path.to_path_buf(),
                })
            }
        }
    }

    fn store_quietly(&self, key: &str, record: &CacheRecord) {
        if let Err(e) = self.store.put(key, record) {
            warn!("Cache write failed for {}: {}", key, e);
        }
    }

    fn remove_quietly(&self, key: &str) -> bool {
        match self.store.remove(key) {
            Ok(removed) => removed,
            Err(e) => {
                warn!("Cache eviction failed for {}: {}", key, e);
                false
            }
        }
    }
}

/// Open the configured backing store.
pub fn open_store(config: &CacheConfig) -> Result<Box<dyn CacheStore>, CacheError> {
    match config.backend {
        CacheBackend::Files => Ok(Box::new(DirStore::new(&config.directory)?)),
        #[cfg(feature = "sqlite")]
        CacheBackend::Sqlite => {
            let db_path = config.directory.join("modules.db");
            Ok(Box::new(SqliteStore::new(db_path)?))
        }
        #[cfg(not(feature = "sqlite"))]
        CacheBackend::Sqlite => {
            warn!("Built without sqlite support, using the file cache instead");
            Ok(Box::new(DirStore::new(&config.directory)?))
        }
    }
}

impl CacheStore for Box<dyn CacheStore> {
    fn get(&self, key: &str) -> Result<Option<CacheRecord>, CacheError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, record: &CacheRecord) -> Result<(), CacheError> {
        (**self).put(key, record)
    }

    fn remove(&self, key: &str) -> Result<bool, CacheError> {
        (**self).remove(key)
    }

    fn clear(&self) -> Result<(), CacheError> {
        (**self).clear()
    }
}

/// Store key for `path`. Paths that aren't valid UTF-8 get a hash of their
/// raw bytes appended so two of them never share a key.
pub fn cache_key(path: &Path) -> String {
    let raw = path.as_os_str();
    match raw.to_str() {
        Some(key) => key.to_string(),
        None => format!(
            "{}#{:016x}",
            raw.to_string_lossy(),
            xxh64(raw.as_encoded_bytes(), 0)
        ),
    }
}

fn entry_info(entry: CacheEntry) -> ModInfo {
    ModInfo {
        name: entry.name,
        module_type: entry.module_type,
    }
}

/// Per-key mutual exclusion; different keys never wait on each other.
#[derive(Default)]
struct KeyLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    key: String,
}

impl KeyLocks {
    fn acquire(&self, key: &str) -> KeyGuard<'_> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while held.contains(key) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held.insert(key.to_string());
        KeyGuard {
            locks: self,
            key: key.to_string(),
        }
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        let mut held = self.locks.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.remove(&self.key);
        self.locks.released.notify_all();
    }
}
