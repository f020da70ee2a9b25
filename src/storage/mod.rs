// Storage access - existence, byte identity and read-only handles for candidate files
// Kept behind a trait so hosts with scoped file access can plug in their own

use crate::module::ModuleSource;
use std::fs;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

// Nothing a tracker module can sensibly be; matches the library scanner cutoff
const MAX_CANDIDATE_BYTES: u64 = 1_000_000_000;

pub trait Storage: Send + Sync {
    fn is_file(&self, path: &Path) -> bool;

    /// Current length in bytes, the cache's notion of file identity.
    fn byte_length(&self, path: &Path) -> io::Result<u64>;

    fn open(&self, path: &Path) -> io::Result<Box<dyn ModuleSource>>;

    fn remove(&self, path: &Path) -> io::Result<()>;
}

impl<S: Storage + ?Sized> Storage for Arc<S> {
    fn is_file(&self, path: &Path) -> bool {
        (**self).is_file(path)
    }

    fn byte_length(&self, path: &Path) -> io::Result<u64> {
        (**self).byte_length(path)
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn ModuleSource>> {
        (**self).open(path)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        (**self).remove(path)
    }
}

/// Plain local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorage;

impl Storage for LocalStorage {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn byte_length(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn ModuleSource>> {
        let file = fs::File::open(path)?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

/// Expand files and directories into an ordered candidate list.
///
/// Directories are walked recursively in name order; hidden files and
/// directories, empty files and absurdly large files are dropped. Explicit
/// file arguments are kept as given so a missing file still reaches the
/// validity check.
pub fn collect_candidates(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    for path in paths {
        if !path.is_dir() {
            candidates.push(path.clone());
            continue;
        }

        let before = candidates.len();
        // Hidden dirs (.git, .cache, ...) are pruned whole; the root itself is
        // always walked even when its own name starts with a dot
        for entry in WalkDir::new(path)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }

            match entry.metadata() {
                Ok(meta) if meta.len() == 0 || meta.len() > MAX_CANDIDATE_BYTES => continue,
                Ok(_) => candidates.push(entry.into_path()),
                Err(_) => continue,
            }
        }
        debug!("Found {} candidates under {}", candidates.len() - before, path.display());
    }

    candidates
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or(false, |n| n.starts_with('.'))
}
