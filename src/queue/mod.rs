// Playback queue - the ordered, optionally shuffled, optionally looping list of files
// Pure sequencing: everything handed to it has already passed the validity cache

pub mod actor; // single-writer task + async handle
pub mod shuffle; // permutation from play order to backing index

pub use actor::{spawn_queue, QueueHandle, StepResult};
pub use shuffle::ShuffleIndex;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Mode flags fixed for the lifetime of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueueMode {
    pub shuffle: bool,
    pub looping: bool,
    /// Swap the selected start file to the front and keep it out of the shuffle.
    pub keep_first: bool,
}

/// Consistent view of a queue at one instant, for UI/notification consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot<T> {
    pub current: Option<T>,
    /// 1-based play-order position ("track N of M"), not the backing index.
    pub position: Option<usize>,
    pub len: usize,
}

/// Ordered list of file references plus a logical cursor.
///
/// The cursor lives in `[-1, len]`: `-1` is the rewound state after
/// [`PlaybackQueue::restart`], `len` is the exhausted state after a
/// non-looping [`PlaybackQueue::next`] runs off the end. In both states
/// [`PlaybackQueue::current_file`] returns `None` rather than stale data.
#[derive(Debug, Clone)]
pub struct PlaybackQueue<T> {
    items: Vec<T>,
    cursor: isize,
    order: ShuffleIndex,
    mode: QueueMode,
}

impl<T> PlaybackQueue<T> {
    pub fn new(files: Vec<T>, start_index: usize, mode: QueueMode) -> Self {
        Self::with_rng(files, start_index, mode, StdRng::from_entropy())
    }

    pub fn with_rng(mut files: Vec<T>, start_index: usize, mode: QueueMode, rng: StdRng) -> Self {
        // Out-of-range start clamps to the last file instead of wrapping
        let mut start = start_index.min(files.len().saturating_sub(1));
        let mut pinned = 0;

        if mode.keep_first && !files.is_empty() {
            files.swap(0, start);
            start = 0;
            pinned = 1;
        }

        let order = ShuffleIndex::with_rng(files.len(), pinned, rng);

        Self {
            items: files,
            cursor: start as isize,
            order,
            mode,
        }
    }

    /// The file at the cursor, resolved through the shuffle map when shuffling.
    pub fn current_file(&self) -> Option<&T> {
        self.current_index().map(|idx| &self.items[idx])
    }

    /// Backing-list index of the current file.
    pub fn current_index(&self) -> Option<usize> {
        let position = self.position()?;
        Some(if self.mode.shuffle {
            self.order.resolve(position)
        } else {
            position
        })
    }

    /// Logical cursor when it points at a file.
    pub fn position(&self) -> Option<usize> {
        if self.cursor >= 0 && (self.cursor as usize) < self.items.len() {
            Some(self.cursor as usize)
        } else {
            None
        }
    }

    /// 1-based play-order position for display.
    pub fn index_for_display(&self) -> Option<usize> {
        self.position().map(|p| p + 1)
    }

    /// Raw cursor including the `-1` and `len` sentinels.
    pub fn cursor(&self) -> isize {
        self.cursor
    }

    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn mode(&self) -> QueueMode {
        self.mode
    }

    /// Backing list in insertion order (after any keep-first swap).
    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn shuffle_index(&self) -> &ShuffleIndex {
        &self.order
    }

    /// Advance one position. Returns `false` when a non-looping queue is
    /// exhausted; a looping queue wraps to 0 with a freshly shuffled lap.
    pub fn next(&mut self) -> bool {
        let len = self.items.len() as isize;
        self.cursor += 1;
        if self.cursor < len {
            return true;
        }

        if self.mode.looping && len > 0 {
            self.order.reshuffle_all();
            self.cursor = 0;
            true
        } else {
            self.cursor = len;
            false
        }
    }

    /// Move to the previous position in play order.
    ///
    /// From the first position a looping queue wraps to the last; a
    /// non-looping queue stays put and returns `false`. The rewound and
    /// exhausted states step back from the nearest real position.
    /// Whether "back" means restarting the current track is the caller's call.
    pub fn step_backward(&mut self) -> bool {
        let len = self.items.len() as isize;
        if len == 0 {
            return false;
        }

        let target = self.cursor.clamp(0, len) - 1;
        if target >= 0 {
            self.cursor = target;
            true
        } else if self.mode.looping {
            self.cursor = len - 1;
            true
        } else {
            self.cursor = 0;
            false
        }
    }

    /// Rewind before the first position; call `next()` before reading the current file.
    pub fn restart(&mut self) {
        self.cursor = -1;
    }

    /// Append files. The unplayed tail (everything after the cursor,
    /// including the new arrivals) is reshuffled; history is untouched.
    pub fn add<I>(&mut self, files: I) -> usize
    where
        I: IntoIterator<Item = T>,
    {
        let before = self.items.len();
        self.items.extend(files);
        let added = self.items.len() - before;
        if added > 0 {
            let reshuffle_from = (self.cursor + 1).max(0) as usize;
            self.order.extend(added, reshuffle_from);
        }
        added
    }
}

impl<T: Clone> PlaybackQueue<T> {
    pub fn snapshot(&self) -> QueueSnapshot<T> {
        QueueSnapshot {
            current: self.current_file().cloned(),
            position: self.index_for_display(),
            len: self.items.len(),
        }
    }
}
