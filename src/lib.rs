// modqueue Library - playback sequencing for tracker module players
// Decides which file plays next and remembers which files are worth playing at all

pub mod cache;    // validity cache + backing stores
pub mod config;   // settings and preferences
pub mod error;    // error enums
pub mod module;   // prober interface + header sniffer
pub mod queue;    // ordered/shuffled/looping play queue
pub mod session;  // cache + queue wired together for a player
pub mod storage;  // file access + candidate listing

// Export the stuff hosts actually use
pub use cache::{CacheLookup, ValidityCache};
pub use config::Config;
pub use error::{CacheError, InvalidModule, QueueError, SessionError};
pub use module::{HeaderProber, ModInfo, ModuleProber, ModuleSource};
pub use queue::{PlaybackQueue, QueueHandle, QueueMode, ShuffleIndex};
pub use session::{BackAction, PlaybackSession, QueueEntry, SessionSettings};
pub use storage::{LocalStorage, Storage};
