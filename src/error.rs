// Error types for the sequencing core
// Cache errors stay inside the cache layer; callers only ever see InvalidModule

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures of the cache backing store. Never surfaced past `ValidityCache`.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("cache record encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "sqlite")]
    #[error("cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt cache record for {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Why a file was refused as a playable module.
#[derive(Error, Debug)]
pub enum InvalidModule {
    #[error("{} is not a recognized module", path.display())]
    Rejected { path: PathBuf },

    #[error("{} was previously rejected", path.display())]
    Skipped { path: PathBuf },

    #[error("cannot read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("probing {} took longer than {timeout:?}", path.display())]
    TimedOut { path: PathBuf, timeout: Duration },

    #[error("probe of {} aborted: {reason}", path.display())]
    Aborted { path: PathBuf, reason: String },
}

impl InvalidModule {
    pub fn path(&self) -> &PathBuf {
        match self {
            InvalidModule::Rejected { path }
            | InvalidModule::Skipped { path }
            | InvalidModule::Unreadable { path, .. }
            | InvalidModule::TimedOut { path, .. }
            | InvalidModule::Aborted { path, .. } => path,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("playback queue is no longer running")]
    Closed,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("none of the {candidates} candidate files is a playable module")]
    NoPlayableFiles { candidates: usize },

    #[error(transparent)]
    Queue(#[from] QueueError),
}
