//! `FsManager` - owns the project state and is its only writer.
//!
//! Reads go through the shared [`VfsHandle`] (the worker holds a clone);
//! everything that changes the cache, the tracked files or the backing store
//! happens here.

use indexmap::IndexMap;
use log::{debug, error, info, warn};
use notify::RecommendedWatcher;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use super::guard::{GuardDecision, ReloadGuard, StateStore, now_ms};
use super::project::{self, ProjectInfo};
use super::scoped::{DiskHandle, Registered, Registration, StoreRegistrar};
use super::shim::{is_legacy, legacy_shim};
use super::store::{FileEntry, FileHandle, MemoryStore};
use super::vfs::VfsHandle;
use super::{FsError, ProjectFile, file_name, normalize_path};
use crate::config::Settings;
use crate::worker::{ExecutionRequest, ExecutionResult, ScriptWorker};

/// Saved files keep this much slack before a disk timestamp counts as an
/// external edit.
const SAVE_MARK_SLACK: Duration = Duration::from_millis(500);

/// Where to save a file that has no native handle yet.
pub trait SavePicker {
    /// `Ok(None)` means the user cancelled.
    fn pick(&self, suggested_name: &str) -> Result<Option<Arc<dyn FileHandle>>, FsError>;
}

/// Saves into a fixed directory under the suggested name.
#[derive(Clone, Debug)]
pub struct DiskPicker {
    dir: PathBuf,
}

impl DiskPicker {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SavePicker for DiskPicker {
    fn pick(&self, suggested_name: &str) -> Result<Option<Arc<dyn FileHandle>>, FsError> {
        Ok(Some(Arc::new(DiskHandle::new(self.dir.join(suggested_name)))))
    }
}

#[derive(Debug)]
struct SavedHandle {
    handle: Arc<dyn FileHandle>,
    last_mod: SystemTime,
}

/// Result of a full project reload.
#[derive(Clone, Debug, PartialEq)]
pub struct Reloaded {
    pub info: ProjectInfo,
    /// `None` when the project has no entry script
    pub result: Option<ExecutionResult>,
}

/// What a change notification led to.
#[derive(Clone, Debug, PartialEq)]
pub enum FilesOutcome {
    /// None of the paths is used by the project
    Ignored,
    /// Cache entries dropped, nothing to rerun
    Invalidated(Vec<String>),
    /// Cache entries dropped and the entry script evaluated again
    Rerun {
        invalidated: Vec<String>,
        result: ExecutionResult,
    },
    /// Manifest changed
    Reloaded(Reloaded),
}

pub struct FsManager {
    vfs: VfsHandle,
    settings: Settings,
    guard: ReloadGuard,
    state: Box<dyn StateStore>,
    watcher: Option<RecommendedWatcher>,
    saved: IndexMap<String, SavedHandle>,
}

impl FsManager {
    pub fn new(settings: Settings, state: Box<dyn StateStore>) -> Self {
        let vfs = VfsHandle::new();
        vfs.write_inner().state.project_name = settings.default_project_name.clone();
        Self {
            vfs,
            guard: ReloadGuard::new(settings.reload_guard_ms),
            settings,
            state,
            watcher: None,
            saved: IndexMap::new(),
        }
    }

    /// Shared read handle; clone it into workers.
    pub fn vfs(&self) -> &VfsHandle {
        &self.vfs
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn project_name(&self) -> String {
        self.vfs.state().project_name
    }

    pub fn registration(&self) -> Registration {
        Registration::new(self.settings.scope.clone(), self.settings.prefix.clone())
    }

    pub fn init_filesystem(&mut self, registrar: &dyn StoreRegistrar) -> Result<(), FsError> {
        self.init_filesystem_at(registrar, now_ms())
    }

    /// Register the backing store. On failure the reload guard decides
    /// whether the returned error asks for a manual reload.
    pub fn init_filesystem_at(&mut self, registrar: &dyn StoreRegistrar, now_ms: u64) -> Result<(), FsError> {
        let registration = self.registration();
        match registrar.register(&registration) {
            Ok(Registered { store, watcher }) => {
                info!("Filesystem ready at {} ({:?})", store.base(), store.kind());
                self.vfs.install_store(store);
                self.watcher = watcher;
                Ok(())
            }
            Err(err) => {
                let decision = self.guard.record_failure(self.state.as_mut(), now_ms);
                let reason = match err {
                    FsError::Registration { reason, .. } => reason,
                    other => other.to_string(),
                };
                error!("Filesystem registration failed: {} ({:?})", reason, decision);
                Err(FsError::Registration {
                    reason,
                    suggest_reload: decision == GuardDecision::FirstInWindow,
                })
            }
        }
    }

    /// Entry, alias table and name of the current project. Pure: does not
    /// touch the cache.
    pub fn analyze_project(&self) -> Result<ProjectInfo, FsError> {
        let files = self.vfs.list();
        project::analyze_project(
            &files,
            |path| self.vfs.peek(path),
            &self.settings.manifest,
            &self.settings.default_project_name,
        )
    }

    /// Drop every cached artifact, analyze again and run the entry script.
    pub fn reload_project(&mut self, worker: &dyn ScriptWorker) -> Result<Reloaded, FsError> {
        if !self.vfs.has_store() {
            return Err(FsError::NoStore);
        }

        // Reply not needed; the worker handles requests in order.
        drop(worker.clear_temp_cache());
        {
            let mut inner = self.vfs.write_inner();
            inner.state.cache.clear();
            inner.state.files_to_check.clear();
        }

        let info = self.analyze_project()?;
        {
            let mut inner = self.vfs.write_inner();
            inner.state.file_to_run = info.entry.clone();
            inner.state.project_name = info.project_name.clone();
            inner.state.alias = info.alias.clone();
        }
        info!(
            "Reloading project '{}' (entry: {})",
            info.project_name,
            info.entry.as_deref().unwrap_or("none")
        );

        if !info.alias.is_empty() {
            drop(worker.init(info.alias.clone()));
        }

        let Some(entry) = info.entry.clone() else {
            warn!("Project has no entry script");
            return Ok(Reloaded { info, result: None });
        };

        if let Some(script) = &info.script {
            self.shim_if_legacy(&entry, script);
        }

        let result = self.run_entry(worker, &entry)?;
        Ok(Reloaded {
            info,
            result: Some(result),
        })
    }

    /// React to changed paths reported by the store.
    ///
    /// A manifest change reloads the project. Otherwise the tracked paths are
    /// invalidated (here and in the worker) and the entry runs once.
    pub fn on_files_change(&mut self, paths: &[String], worker: &dyn ScriptWorker) -> Result<FilesOutcome, FsError> {
        let paths: Vec<String> = paths.iter().map(|p| normalize_path(p)).collect();
        let manifest = normalize_path(&self.settings.manifest);
        if paths.contains(&manifest) {
            info!("{} changed, reloading project", manifest);
            return self.reload_project(worker).map(FilesOutcome::Reloaded);
        }

        let state = self.vfs.state();
        let mut invalidated: Vec<String> = Vec::new();
        for path in paths {
            if state.is_tracked(&path) && !invalidated.contains(&path) {
                invalidated.push(path);
            }
        }
        if invalidated.is_empty() {
            debug!("files change ignored, nothing tracked");
            return Ok(FilesOutcome::Ignored);
        }

        debug!("invalidating {:?}", invalidated);
        self.vfs.invalidate(&invalidated);
        drop(worker.clear_file_cache(invalidated.clone(), state.base.clone()));

        let Some(entry) = state.file_to_run else {
            return Ok(FilesOutcome::Invalidated(invalidated));
        };
        if invalidated.contains(&entry) {
            let source = self.vfs.peek(&entry)?;
            self.shim_if_legacy(&entry, &source);
        }

        let result = self.run_entry(worker, &entry)?;
        Ok(FilesOutcome::Rerun { invalidated, result })
    }

    /// Forget the loaded project: cache, tracked files, entry and store
    /// contents.
    pub fn reset_file_refs(&mut self) {
        let mut inner = self.vfs.write_inner();
        inner.state.cache.clear();
        inner.state.files_to_check.clear();
        inner.state.file_to_run = None;
        inner.state.alias.clear();
        if let Some(store) = inner.store.as_mut() {
            store.clear();
        }
        drop(inner);
        self.saved.clear();
        debug!("file refs reset");
    }

    /// Put dropped files into the store (an in-memory one is created when
    /// none is registered) and into the cache.
    pub fn ingest_files(&mut self, files: Vec<ProjectFile>) -> Result<usize, FsError> {
        let base = self.registration().base();
        let mut guard = self.vfs.write_inner();
        let inner = &mut *guard;
        if inner.store.is_none() {
            debug!("no store registered, using memory store at {}", base);
            inner.state.base = base.clone();
            inner.store = Some(Box::new(MemoryStore::new(base)));
        }
        let Some(store) = inner.store.as_mut() else {
            return Err(FsError::NoStore);
        };

        let count = files.len();
        for file in files {
            let path = normalize_path(&file.path);
            store.write(&path, &file.content)?;
            inner.state.track(&path);
            inner.state.cache.insert(path, file.content);
        }
        info!("Ingested {} file(s)", count);
        Ok(count)
    }

    pub fn get_file(&self, path: &str) -> Result<FileEntry, FsError> {
        self.vfs.read(path)
    }

    /// Editor content overrides whatever is cached for `path`.
    pub fn cache_script(&mut self, path: &str, content: &str) {
        let path = normalize_path(path);
        let mut inner = self.vfs.write_inner();
        inner.state.track(&path);
        inner.state.cache.insert(path, content.to_string());
    }

    /// Write editor content back to durable storage.
    ///
    /// Uses the store's native handle, else the handle remembered from an
    /// earlier save, else asks `picker`. Returns `false` if the user cancelled.
    pub fn save_file(&mut self, path: &str, content: &str, picker: &dyn SavePicker) -> Result<bool, FsError> {
        let path = normalize_path(path);
        self.cache_script(&path, content);

        let handle = match self.vfs.handle(&path) {
            Some(handle) => Some(handle),
            None => match self.saved.get(&path) {
                Some(saved) => Some(saved.handle.clone()),
                None => picker.pick(file_name(&path))?,
            },
        };
        let Some(handle) = handle else {
            debug!("save of {} cancelled", path);
            return Ok(false);
        };

        handle.write(content)?;
        info!("Saved {} to {}", path, handle.name());
        self.saved.insert(
            path,
            SavedHandle {
                handle,
                last_mod: SystemTime::now() + SAVE_MARK_SLACK,
            },
        );
        Ok(true)
    }

    /// Saved files whose storage changed since we wrote them, with their
    /// new content. The cache is updated to match.
    pub fn check_file_changes(&mut self) -> Result<Vec<(String, String)>, FsError> {
        let mut changed = Vec::new();
        for (path, saved) in self.saved.iter_mut() {
            let modified = saved.handle.last_modified()?;
            if modified > saved.last_mod {
                saved.last_mod = modified;
                changed.push((path.clone(), saved.handle.read()?));
            }
        }
        for (path, content) in &changed {
            self.cache_script(path, content);
        }
        Ok(changed)
    }

    fn shim_if_legacy(&self, entry: &str, source: &str) {
        if !is_legacy(entry, &self.settings.legacy_extension) {
            return;
        }
        debug!("applying legacy shim to {}", entry);
        let shimmed = legacy_shim(source, &self.settings.compat_module);
        let mut inner = self.vfs.write_inner();
        inner.state.track(entry);
        inner.state.cache.insert(entry.to_string(), shimmed);
    }

    fn run_entry(&self, worker: &dyn ScriptWorker, entry: &str) -> Result<ExecutionResult, FsError> {
        let base = self.vfs.base();
        let request = ExecutionRequest::url(entry, base.clone()).with_root(base);
        Ok(worker.run_script(request).wait_result()?)
    }
}
