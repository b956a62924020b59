//! Virtual project filesystem.
//!
//! Scripts `require`/`import` sibling files, so the worker needs a uniform
//! path -> content view of the project no matter where the files came from:
//! a drop, a mounted directory, or an explicit in-memory tree.
//!
//! - [`store`]: the `FileStore` capability and the in-memory variant
//! - [`scoped`]: store registered under a scope/prefix, serving mounted
//!   directories, plus the registrar that sets it up and watches it
//! - [`vfs`]: shared read handle (cache first, then store)
//! - [`project`]: entry/alias analysis
//! - [`shim`]: legacy script dialect compatibility
//! - [`guard`]: persisted reload-rate guard
//! - [`manager`]: `FsManager`, the only writer

pub mod guard;
pub mod manager;
pub mod project;
pub mod scoped;
pub mod shim;
pub mod store;
pub mod vfs;

use crate::worker::WorkerError;

pub use guard::{JsonStateFile, MemoryState, ReloadGuard, StateStore};
pub use manager::{FilesOutcome, FsManager, Reloaded, SavePicker};
pub use project::{ProjectInfo, ProjectState};
pub use scoped::{DirRegistrar, DiskHandle, Registered, Registration, ScopedStore, StoreRegistrar};
pub use store::{FileEntry, FileHandle, FileStore, MemoryStore, StoreKind};
pub use vfs::VfsHandle;

/// Filesystem errors
#[derive(Debug, Clone, PartialEq)]
pub enum FsError {
    /// No content for the requested project path
    NotFound(String),
    /// Operation needs a backing store and none is registered
    NoStore,
    Io { path: String, message: String },
    /// Manifest present but unreadable
    Manifest { path: String, message: String },
    /// Backing store could not be registered
    Registration { reason: String, suggest_reload: bool },
    Worker(WorkerError),
}

impl std::fmt::Display for FsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FsError::NotFound(path) => write!(f, "File not found: {}", path),
            FsError::NoStore => write!(f, "No project filesystem registered"),
            FsError::Io { path, message } => write!(f, "I/O error on {}: {}", path, message),
            FsError::Manifest { path, message } => write!(f, "Invalid manifest {}: {}", path, message),
            FsError::Registration { reason, suggest_reload } => {
                write!(f, "Filesystem registration failed: {}", reason)?;
                if *suggest_reload {
                    write!(f, " (reload the page to retry)")?;
                }
                Ok(())
            }
            FsError::Worker(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for FsError {}

impl From<WorkerError> for FsError {
    fn from(err: WorkerError) -> Self {
        FsError::Worker(err)
    }
}

impl FsError {
    pub(crate) fn io(path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        FsError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// One file of a dropped or injected tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectFile {
    pub path: String,
    pub content: String,
}

impl ProjectFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Canonical project path: forward slashes, leading `/`, no `.`/`..`/empty
/// segments. `"a.js"`, `"./a.js"` and `"/x/../a.js"` all become `"/a.js"`.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    format!("/{}", parts.join("/"))
}

/// Last segment of a project path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("a.js"), "/a.js");
        assert_eq!(normalize_path("./lib//b.js"), "/lib/b.js");
        assert_eq!(normalize_path("/x/../a.js"), "/a.js");
        assert_eq!(normalize_path("dir\\c.jscad"), "/dir/c.jscad");
        assert_eq!(normalize_path(""), "/");
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("/lib/b.js"), "b.js");
        assert_eq!(file_name("c.js"), "c.js");
    }

    #[test]
    fn test_registration_message() {
        let err = FsError::Registration {
            reason: "denied".into(),
            suggest_reload: true,
        };
        assert!(err.to_string().contains("reload"));
        let quiet = FsError::Registration {
            reason: "denied".into(),
            suggest_reload: false,
        };
        assert!(!quiet.to_string().contains("reload"));
    }
}
