// Module probing - "is this a tracker module, and what is it called"
// The real decoder lives outside this crate; anything implementing ModuleProber can stand in

pub mod header; // built-in header sniffer for MOD/XM/S3M/IT

pub use header::HeaderProber;

use serde::{Deserialize, Serialize};
use std::io::{Read, Seek};
use std::sync::Arc;

/// Display metadata reported by a prober.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModInfo {
    pub name: String,
    pub module_type: String,
}

impl ModInfo {
    pub fn new(name: impl Into<String>, module_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module_type: module_type.into(),
        }
    }
}

/// Read-only handle given to a prober. Hosts with scoped file access can
/// hand over an open descriptor without exposing a path.
pub trait ModuleSource: Read + Seek + Send {}

impl<T: Read + Seek + Send> ModuleSource for T {}

/// The expensive "test this file" operation of a native module library.
pub trait ModuleProber: Send + Sync {
    /// `Some` when the source is a playable module.
    fn test_module(&self, source: &mut dyn ModuleSource) -> Option<ModInfo>;
}

impl<P: ModuleProber + ?Sized> ModuleProber for Arc<P> {
    fn test_module(&self, source: &mut dyn ModuleSource) -> Option<ModInfo> {
        (**self).test_module(source)
    }
}

impl<P: ModuleProber + ?Sized> ModuleProber for Box<P> {
    fn test_module(&self, source: &mut dyn ModuleSource) -> Option<ModInfo> {
        (**self).test_module(source)
    }
}
