// Playback session - glue between the validity cache and the queue actor
// The host asks "what's playing / what's next"; only checked modules ever reach the queue

use crate::cache::background::probe_all;
use crate::cache::ValidityCache;
use crate::config::Config;
use crate::error::{InvalidModule, SessionError};
use crate::module::ModInfo;
use crate::queue::{spawn_queue, PlaybackQueue, QueueHandle, QueueMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One playable file as the queue holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub path: PathBuf,
    pub info: ModInfo,
}

impl QueueEntry {
    /// Module title, or the file stem for untitled modules.
    pub fn title(&self) -> String {
        if !self.info.name.is_empty() {
            return self.info.name.clone();
        }
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub mode: QueueMode,
    pub probe_timeout: Duration,
    pub probe_concurrency: usize,
    pub restart_threshold: Duration,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            mode: QueueMode {
                shuffle: config.playback.shuffle_mode,
                looping: config.playback.loop_mode,
                keep_first: config.playback.keep_first,
            },
            probe_timeout: config.probe.timeout(),
            probe_concurrency: config.probe.concurrency,
            restart_threshold: config.playback.restart_threshold(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

#[derive(Debug)]
pub struct EnqueueReport {
    pub added: usize,
    pub rejected: Vec<InvalidModule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub entry: QueueEntry,
    /// 1-based play-order position.
    pub position: usize,
    pub total: usize,
}

/// What the player should do after the user pressed "back".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackAction {
    /// Seek the current track to its start.
    Restart(QueueEntry),
    /// Load this entry.
    Previous(QueueEntry),
    /// Nothing is loaded.
    Idle,
}

pub struct PlaybackSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    cache: Arc<ValidityCache>,
    queue: QueueHandle<QueueEntry>,
    settings: SessionSettings,
}

impl PlaybackSession {
    /// Validate `candidates` and start a queue on the survivors.
    ///
    /// `start_index` refers to `candidates`; it follows its file through
    /// validation, moving on to the next playable file when the chosen one
    /// is rejected. An index past the end selects the last playable file.
    pub async fn start(
        cache: Arc<ValidityCache>,
        candidates: Vec<PathBuf>,
        start_index: usize,
        settings: SessionSettings,
    ) -> Result<Self, SessionError> {
        let total = candidates.len();
        let outcomes = probe_all(
            Arc::clone(&cache),
            candidates,
            settings.probe_timeout,
            settings.probe_concurrency,
        )
        .await;

        let mut entries = Vec::new();
        let mut start = None;
        for (i, (path, result)) in outcomes.into_iter().enumerate() {
            match result {
                Ok(info) => {
                    if start.is_none() && i >= start_index {
                        start = Some(entries.len());
                    }
                    entries.push(QueueEntry { path, info });
                }
                Err(e) => warn!("Skipping {}", e),
            }
        }

        if entries.is_empty() {
            return Err(SessionError::NoPlayableFiles { candidates: total });
        }

        // Past the end clamps to the last file; a rejected choice with
        // nothing playable after it starts over from the top
        let start = match start {
            Some(start) => start,
            None if start_index >= total => entries.len() - 1,
            None => 0,
        };
        let id = Uuid::new_v4();
        info!(
            "Session {} starting with {}/{} playable files at {} (mode {:?})",
            id,
            entries.len(),
            total,
            start,
            settings.mode
        );

        let queue = spawn_queue(PlaybackQueue::new(entries, start, settings.mode));

        Ok(Self {
            id,
            started_at: Utc::now(),
            cache,
            queue,
            settings,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Handle for other tasks that need to read or drive the same queue.
    pub fn queue(&self) -> QueueHandle<QueueEntry> {
        self.queue.clone()
    }

    pub async fn now_playing(&self) -> Result<Option<NowPlaying>, SessionError> {
        let snapshot = self.queue.snapshot().await?;
        Ok(match (snapshot.current, snapshot.position) {
            (Some(entry), Some(position)) => Some(NowPlaying {
                entry,
                position,
                total: snapshot.len,
            }),
            _ => None,
        })
    }

    /// Move to the next file that still exists and isn't known bad.
    /// `None` once a non-looping queue is used up.
    pub async fn advance(&self) -> Result<Option<QueueEntry>, SessionError> {
        let attempts = self.queue.snapshot().await?.len;

        for _ in 0..attempts {
            let step = self.queue.next().await?;
            let entry = match (step.moved, step.current) {
                (true, Some(entry)) => entry,
                _ => {
                    debug!("Session {} reached the end of the queue", self.id);
                    return Ok(None);
                }
            };

            if self.cache.is_valid(&entry.path) {
                return Ok(Some(entry));
            }
            warn!("{} is no longer playable, skipping", entry.path.display());
        }

        warn!("Session {}: no queued file is playable any more", self.id);
        Ok(None)
    }

    /// Late in a track "back" restarts it; early on it goes to the previous one.
    pub async fn go_back(&self, elapsed: Duration) -> Result<BackAction, SessionError> {
        if elapsed > self.settings.restart_threshold {
            let snapshot = self.queue.snapshot().await?;
            return Ok(snapshot.current.map_or(BackAction::Idle, BackAction::Restart));
        }

        let step = self.queue.step_backward().await?;
        Ok(match (step.moved, step.current) {
            (true, Some(entry)) => BackAction::Previous(entry),
            (false, Some(entry)) => BackAction::Restart(entry),
            (_, None) => BackAction::Idle,
        })
    }

    /// Rewind to before the first file; the next `advance` plays it.
    pub async fn restart(&self) -> Result<(), SessionError> {
        self.queue.restart().await?;
        info!("Session {} rewound", self.id);
        Ok(())
    }

    /// Probe `paths` and append the playable ones in one step.
    pub async fn enqueue(&self, paths: Vec<PathBuf>) -> Result<EnqueueReport, SessionError> {
        let outcomes = probe_all(
            Arc::clone(&self.cache),
            paths,
            self.settings.probe_timeout,
            self.settings.probe_concurrency,
        )
        .await;

        let mut entries = Vec::new();
        let mut rejected = Vec::new();
        for (path, result) in outcomes {
            match result {
                Ok(info) => entries.push(QueueEntry { path, info }),
                Err(e) => {
                    warn!("Not enqueueing {}", e);
                    rejected.push(e);
                }
            }
        }

        let added = if entries.is_empty() {
            0
        } else {
            self.queue.add(entries).await?
        };
        info!("Session {} enqueued {} files ({} rejected)", self.id, added, rejected.len());

        Ok(EnqueueReport { added, rejected })
    }

    /// Whether `path` would currently be accepted, without probing.
    pub fn is_playable(&self, path: &Path) -> bool {
        self.cache.is_valid(path)
    }
}
