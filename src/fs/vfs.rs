//! Shared read view of the project: cache first, then the backing store.
//!
//! Workers and the launcher hold clones of [`VfsHandle`]; only the
//! `FsManager` mutates through it.

use log::trace;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::project::ProjectState;
use super::store::{FileEntry, FileHandle, FileStore};
use super::{FsError, normalize_path};
use indexmap::IndexSet;

#[derive(Default)]
pub(crate) struct VfsInner {
    pub(crate) store: Option<Box<dyn FileStore>>,
    pub(crate) state: ProjectState,
}

#[derive(Clone, Default)]
pub struct VfsHandle {
    inner: Arc<RwLock<VfsInner>>,
}

impl std::fmt::Debug for VfsHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.read_inner();
        f.debug_struct("VfsHandle")
            .field("base", &inner.state.base)
            .field("store", &inner.store.as_ref().map(|s| s.kind()))
            .field("cached", &inner.state.cache.len())
            .finish()
    }
}

impl VfsHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_inner(&self) -> RwLockReadGuard<'_, VfsInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn write_inner(&self) -> RwLockWriteGuard<'_, VfsInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Content for a project path.
    ///
    /// Cache hits win (they carry edits and shims). A store read is
    /// memoized and the path becomes tracked for change notifications.
    pub fn read(&self, path: &str) -> Result<FileEntry, FsError> {
        let path = normalize_path(path);
        {
            let inner = self.read_inner();
            if let Some(content) = inner.state.cache.get(&path) {
                trace!("vfs: cache hit {}", path);
                return Ok(FileEntry {
                    path: path.clone(),
                    content: content.clone(),
                    handle: inner.store.as_ref().and_then(|s| s.handle(&path)),
                });
            }
        }

        let mut inner = self.write_inner();
        let entry = match &inner.store {
            Some(store) => store.read(&path)?,
            None => return Err(FsError::NotFound(path)),
        };
        inner.state.cache.insert(path.clone(), entry.content.clone());
        inner.state.track(&path);
        trace!("vfs: loaded {} from store", path);
        Ok(entry)
    }

    /// Like [`read`](Self::read) but leaves cache and tracking untouched.
    pub fn peek(&self, path: &str) -> Result<String, FsError> {
        let path = normalize_path(path);
        let inner = self.read_inner();
        if let Some(content) = inner.state.cache.get(&path) {
            return Ok(content.clone());
        }
        match &inner.store {
            Some(store) => store.read(&path).map(|entry| entry.content),
            None => Err(FsError::NotFound(path)),
        }
    }

    /// Store listing plus cache-only paths.
    pub fn list(&self) -> Vec<String> {
        let inner = self.read_inner();
        let mut paths: IndexSet<String> = inner
            .store
            .as_ref()
            .map(|s| s.list().into_iter().collect())
            .unwrap_or_default();
        paths.extend(inner.state.cache.keys().cloned());
        paths.into_iter().collect()
    }

    pub fn handle(&self, path: &str) -> Option<Arc<dyn FileHandle>> {
        let path = normalize_path(path);
        self.read_inner().store.as_ref().and_then(|s| s.handle(&path))
    }

    pub fn base(&self) -> String {
        self.read_inner().state.base.clone()
    }

    pub fn file_to_run(&self) -> Option<String> {
        self.read_inner().state.file_to_run.clone()
    }

    pub fn has_store(&self) -> bool {
        self.read_inner().store.is_some()
    }

    /// Snapshot of the project state
    pub fn state(&self) -> ProjectState {
        self.read_inner().state.clone()
    }

    /// Drop memoized content so the next read goes to the store.
    pub fn invalidate(&self, paths: &[String]) {
        let mut inner = self.write_inner();
        for path in paths {
            inner.state.cache.shift_remove(&normalize_path(path));
        }
    }

    pub(crate) fn install_store(&self, store: Box<dyn FileStore>) {
        let mut inner = self.write_inner();
        inner.state.base = store.base().to_string();
        inner.store = Some(store);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryStore;

    fn vfs_with(files: &[(&str, &str)]) -> VfsHandle {
        let vfs = VfsHandle::new();
        vfs.install_store(Box::new(MemoryStore::with_files("/swfs/", files.iter().copied())));
        vfs
    }

    #[test]
    fn test_read_memoizes_and_tracks() {
        let vfs = vfs_with(&[("/a.js", "a")]);
        assert_eq!(vfs.base(), "/swfs/");
        assert!(vfs.state().cache.is_empty());

        assert_eq!(vfs.read("a.js").unwrap().content, "a");
        let state = vfs.state();
        assert_eq!(state.cache.get("/a.js").map(String::as_str), Some("a"));
        assert_eq!(state.files_to_check, vec!["/a.js".to_string()]);
    }

    #[test]
    fn test_cache_wins_over_store() {
        let vfs = vfs_with(&[("/a.js", "disk")]);
        vfs.write_inner().state.cache.insert("/a.js".into(), "edited".into());
        assert_eq!(vfs.read("/a.js").unwrap().content, "edited");
        assert_eq!(vfs.peek("/a.js").unwrap(), "edited");

        vfs.invalidate(&["/a.js".to_string()]);
        assert_eq!(vfs.read("/a.js").unwrap().content, "disk");
    }

    #[test]
    fn test_peek_does_not_track() {
        let vfs = vfs_with(&[("/a.js", "a")]);
        assert_eq!(vfs.peek("/a.js").unwrap(), "a");
        assert!(vfs.state().files_to_check.is_empty());
    }

    #[test]
    fn test_without_store() {
        let vfs = VfsHandle::new();
        assert!(!vfs.has_store());
        assert_eq!(vfs.read("/x.js").unwrap_err(), FsError::NotFound("/x.js".into()));
        vfs.write_inner().state.cache.insert("/x.js".into(), "cached".into());
        assert_eq!(vfs.read("/x.js").unwrap().content, "cached");
        assert_eq!(vfs.list(), vec!["/x.js".to_string()]);
    }
}
