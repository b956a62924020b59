//! Store registered under a scope/prefix, serving mounted directories.
//!
//! Requests for `<scope><prefix><project path>` are answered from an overlay
//! of injected files first, then from the mounted roots on disk. Files that
//! come from disk carry a [`DiskHandle`] so edits can be saved back.
//!
//! [`DirRegistrar`] performs the registration and starts a `notify` watcher
//! on the roots; changes are published as [`FilesChanged`] with project
//! paths, for the launcher to feed into `FsManager::on_files_change`.

use indexmap::{IndexMap, IndexSet};
use log::{debug, info, warn};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use super::store::{FileEntry, FileHandle, FileStore, StoreKind};
use super::{FsError, normalize_path};
use crate::core::event_bus::EventEmitter;
use crate::core::events::FilesChanged;

/// Where the store is reachable for the worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    pub scope: String,
    pub prefix: String,
}

impl Registration {
    pub fn new(scope: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            prefix: prefix.into(),
        }
    }

    /// Base URL of the project: scope followed by prefix.
    pub fn base(&self) -> String {
        let scope = self.scope.trim_end_matches('/');
        let prefix = self.prefix.trim_matches('/');
        format!("{}/{}/", scope, prefix)
    }
}

/// Result of a successful registration.
pub struct Registered {
    pub store: Box<dyn FileStore>,
    /// Keeps change notifications flowing while alive
    pub watcher: Option<RecommendedWatcher>,
}

/// Sets up the backing store for a registration.
pub trait StoreRegistrar {
    fn register(&self, registration: &Registration) -> Result<Registered, FsError>;
}

/// File on disk.
#[derive(Clone, Debug)]
pub struct DiskHandle {
    path: PathBuf,
}

impl DiskHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileHandle for DiskHandle {
    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn read(&self) -> Result<String, FsError> {
        std::fs::read_to_string(&self.path).map_err(|e| FsError::io(self.path.display().to_string(), e))
    }

    fn write(&self, content: &str) -> Result<(), FsError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FsError::io(parent.display().to_string(), e))?;
        }
        std::fs::write(&self.path, content).map_err(|e| FsError::io(self.path.display().to_string(), e))
    }

    fn last_modified(&self) -> Result<SystemTime, FsError> {
        std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map_err(|e| FsError::io(self.path.display().to_string(), e))
    }
}

#[derive(Debug, Default)]
pub struct ScopedStore {
    base: String,
    roots: Vec<PathBuf>,
    overlay: IndexMap<String, String>,
}

impl ScopedStore {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            roots: Vec::new(),
            overlay: IndexMap::new(),
        }
    }

    /// Serve the files below `root` as project paths.
    pub fn mount(&mut self, root: impl Into<PathBuf>) {
        let root = root.into();
        if !self.roots.contains(&root) {
            debug!("ScopedStore: mounted {}", root.display());
            self.roots.push(root);
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    fn disk_path(&self, path: &str) -> Option<PathBuf> {
        let relative = path.trim_start_matches('/');
        self.roots
            .iter()
            .map(|root| root.join(relative))
            .find(|candidate| candidate.is_file())
    }
}

impl FileStore for ScopedStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Scoped
    }

    fn base(&self) -> &str {
        &self.base
    }

    fn list(&self) -> Vec<String> {
        let mut paths: IndexSet<String> = self.overlay.keys().cloned().collect();
        for root in &self.roots {
            let mut found: Vec<String> = list_dir(root).into_iter().collect();
            found.sort();
            paths.extend(found);
        }
        paths.into_iter().collect()
    }

    fn read(&self, path: &str) -> Result<FileEntry, FsError> {
        if let Some(content) = self.overlay.get(path) {
            return Ok(FileEntry {
                path: path.to_string(),
                content: content.clone(),
                handle: None,
            });
        }
        let disk = self.disk_path(path).ok_or_else(|| FsError::NotFound(path.to_string()))?;
        let handle = DiskHandle::new(disk);
        Ok(FileEntry {
            path: path.to_string(),
            content: handle.read()?,
            handle: Some(Arc::new(handle)),
        })
    }

    fn write(&mut self, path: &str, content: &str) -> Result<(), FsError> {
        self.overlay.insert(path.to_string(), content.to_string());
        Ok(())
    }

    fn clear(&mut self) {
        self.roots.clear();
        self.overlay.clear();
    }

    fn handle(&self, path: &str) -> Option<Arc<dyn FileHandle>> {
        if self.overlay.contains_key(path) {
            return None;
        }
        self.disk_path(path)
            .map(|disk| Arc::new(DiskHandle::new(disk)) as Arc<dyn FileHandle>)
    }
}

/// Project paths of all regular files below `root`, skipping dot-entries.
pub fn list_dir(root: &Path) -> Vec<String> {
    let pattern = format!("{}/**/*", glob::Pattern::escape(&root.to_string_lossy()));
    let Ok(entries) = glob::glob(&pattern) else {
        warn!("ScopedStore: bad listing pattern {}", pattern);
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .filter_map(|path| project_path(root, &path))
        .filter(|p| !p.split('/').any(|seg| seg.starts_with('.')))
        .collect()
}

/// Map an absolute disk path below `root` to its project path.
pub fn project_path(root: &Path, file: &Path) -> Option<String> {
    file.strip_prefix(root)
        .ok()
        .map(|rel| normalize_path(&rel.to_string_lossy()))
}

/// Registers a [`ScopedStore`] over directories and watches them.
pub struct DirRegistrar {
    roots: Vec<PathBuf>,
    events: Option<EventEmitter>,
}

impl DirRegistrar {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots, events: None }
    }

    /// Publish change notifications on the given emitter.
    pub fn watching(mut self, events: EventEmitter) -> Self {
        self.events = Some(events);
        self
    }
}

impl StoreRegistrar for DirRegistrar {
    fn register(&self, registration: &Registration) -> Result<Registered, FsError> {
        let mut store = ScopedStore::new(registration.base());
        let mut roots = Vec::new();
        for root in &self.roots {
            let canonical = std::fs::canonicalize(root).map_err(|e| FsError::Registration {
                reason: format!("{}: {}", root.display(), e),
                suggest_reload: false,
            })?;
            if !canonical.is_dir() {
                return Err(FsError::Registration {
                    reason: format!("{} is not a directory", root.display()),
                    suggest_reload: false,
                });
            }
            store.mount(canonical.clone());
            roots.push(canonical);
        }

        let watcher = match &self.events {
            Some(events) => Some(start_watcher(&roots, events.clone())?),
            None => None,
        };

        info!(
            "Project filesystem registered at {} ({} root(s), watching={})",
            store.base(),
            roots.len(),
            watcher.is_some()
        );
        Ok(Registered {
            store: Box::new(store),
            watcher,
        })
    }
}

fn start_watcher(roots: &[PathBuf], events: EventEmitter) -> Result<RecommendedWatcher, FsError> {
    let watched = roots.to_vec();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if !is_relevant(&event.kind) {
                return;
            }
            let changed: Vec<String> = event
                .paths
                .iter()
                .filter_map(|path| watched.iter().find_map(|root| project_path(root, path)))
                .collect();
            if !changed.is_empty() {
                debug!("watcher: {:?}", changed);
                events.emit(FilesChanged(changed));
            }
        }
        Err(err) => warn!("project watcher error: {}", err),
    })
    .map_err(|e| FsError::Registration {
        reason: e.to_string(),
        suggest_reload: false,
    })?;

    for root in roots {
        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| FsError::Registration {
                reason: format!("watch {}: {}", root.display(), e),
                suggest_reload: false,
            })?;
    }
    Ok(watcher)
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Create(_)
            | EventKind::Remove(_)
    )
}
