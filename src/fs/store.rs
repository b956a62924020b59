//! `FileStore` capability and the in-memory variant.
//!
//! The manager only talks to `dyn FileStore`; which variant backs the
//! project is decided once, when the filesystem is initialized.

use indexmap::IndexMap;
use std::sync::Arc;
use std::time::SystemTime;

use super::{FsError, normalize_path};

/// Writable handle to a file in durable storage (save-back target).
pub trait FileHandle: Send + Sync + std::fmt::Debug {
    fn name(&self) -> String;
    fn read(&self) -> Result<String, FsError>;
    fn write(&self, content: &str) -> Result<(), FsError>;
    fn last_modified(&self) -> Result<SystemTime, FsError>;
}

/// Content of a project path, plus a native handle when the store has one.
#[derive(Clone, Debug)]
pub struct FileEntry {
    pub path: String,
    pub content: String,
    pub handle: Option<Arc<dyn FileHandle>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Scoped,
}

pub trait FileStore: Send + Sync {
    fn kind(&self) -> StoreKind;

    /// URL prefix under which the worker resolves project paths
    fn base(&self) -> &str;

    /// All project paths, in a stable order
    fn list(&self) -> Vec<String>;

    /// Paths passed in are already normalized.
    fn read(&self, path: &str) -> Result<FileEntry, FsError>;

    /// Inject content, replacing what was there.
    fn write(&mut self, path: &str, content: &str) -> Result<(), FsError>;

    /// Forget every file.
    fn clear(&mut self);

    fn handle(&self, _path: &str) -> Option<Arc<dyn FileHandle>> {
        None
    }

    fn contains(&self, path: &str) -> bool {
        self.list().iter().any(|p| p == path)
    }
}

/// Plain ordered map, used for one-shot virtual projects.
#[derive(Debug, Default)]
pub struct MemoryStore {
    base: String,
    files: IndexMap<String, String>,
}

impl MemoryStore {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            files: IndexMap::new(),
        }
    }

    pub fn with_files<I, P, C>(base: impl Into<String>, files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: Into<String>,
    {
        let mut store = Self::new(base);
        for (path, content) in files {
            store.files.insert(normalize_path(path.as_ref()), content.into());
        }
        store
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FileStore for MemoryStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Memory
    }

    fn base(&self) -> &str {
        &self.base
    }

    fn list(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    fn read(&self, path: &str) -> Result<FileEntry, FsError> {
        self.files
            .get(path)
            .map(|content| FileEntry {
                path: path.to_string(),
                content: content.clone(),
                handle: None,
            })
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }

    fn write(&mut self, path: &str, content: &str) -> Result<(), FsError> {
        self.files.insert(path.to_string(), content.to_string());
        Ok(())
    }

    fn clear(&mut self) {
        self.files.clear();
    }

    fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }
}
