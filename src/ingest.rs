//! Drag-and-drop ingestion.
//!
//! A drop replaces the whole project: the dropped paths are flattened into
//! project files, written into the filesystem manager, and the project is
//! reloaded. [`DropOverlay`] is the drop-target affordance shown while a
//! drag hovers the window.

use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::Settings;
use crate::core::debounce::Debouncer;
use crate::fs::scoped::list_dir;
use crate::fs::{FsError, ProjectFile, StoreRegistrar, normalize_path};
use crate::launcher::Launcher;

/// Ingestion failures
#[derive(Debug, Clone, PartialEq)]
pub enum IngestError {
    /// A dropped entry could not be read
    Unreadable { path: String, message: String },
    Fs(FsError),
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::Unreadable { path, message } => write!(f, "Cannot read dropped file {}: {}", path, message),
            IngestError::Fs(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for IngestError {}

impl From<FsError> for IngestError {
    fn from(err: FsError) -> Self {
        IngestError::Fs(err)
    }
}

/// A drop as delivered by the host window.
#[derive(Clone, Debug, Default)]
pub struct DropEvent {
    /// Dropped OS paths; `None` when the drag carried no files (text, links)
    pub payload: Option<Vec<PathBuf>>,
    default_prevented: bool,
}

impl DropEvent {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            payload: Some(paths),
            default_prevented: false,
        }
    }

    /// Drop without a file payload.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Stop the host from handling the drop itself (opening the file).
    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }
}

/// Flattens dropped entries into project files.
pub trait EntryExtractor {
    fn extract(&self, paths: &[PathBuf]) -> Result<Vec<ProjectFile>, IngestError>;
}

/// Reads dropped paths from disk.
///
/// A single dropped directory becomes the project root: `proj/index.js`
/// lands at `/index.js`. When several entries are dropped each keeps its
/// own name as the top segment (`/proj/lib/..`, `/solo.jscad`).
/// Dot-files and dot-directories are skipped.
#[derive(Clone, Debug, Default)]
pub struct PathExtractor;

impl PathExtractor {
    fn read(disk: &Path, project: String) -> Result<ProjectFile, IngestError> {
        let content = std::fs::read_to_string(disk).map_err(|e| IngestError::Unreadable {
            path: disk.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(ProjectFile::new(project, content))
    }
}

impl EntryExtractor for PathExtractor {
    fn extract(&self, paths: &[PathBuf]) -> Result<Vec<ProjectFile>, IngestError> {
        if let [dir] = paths
            && dir.is_dir()
        {
            let files = list_dir(dir)
                .into_iter()
                .map(|rel| Self::read(&dir.join(rel.trim_start_matches('/')), rel))
                .collect::<Result<Vec<_>, _>>()?;
            debug!("Drop: extracted {} files from {}", files.len(), dir.display());
            return Ok(files);
        }

        let mut files = Vec::new();
        for path in paths {
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                warn!("Drop: skipping entry without a name: {}", path.display());
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            if path.is_dir() {
                for rel in list_dir(path) {
                    let disk = path.join(rel.trim_start_matches('/'));
                    files.push(Self::read(&disk, normalize_path(&format!("{}{}", name, rel)))?);
                }
            } else {
                files.push(Self::read(path, normalize_path(&name))?);
            }
        }
        debug!("Drop: extracted {} files from {} entries", files.len(), paths.len());
        Ok(files)
    }
}

/// What a drop did.
#[derive(Debug, Clone, PartialEq)]
pub enum DropOutcome {
    /// Nothing to extract
    Empty,
    /// Files written and project reloaded
    Loaded(usize),
    /// Reported to the error sink; whatever was ingested stays
    Failed(IngestError),
}

pub struct DropHandler {
    extractor: Box<dyn EntryExtractor>,
}

impl Default for DropHandler {
    fn default() -> Self {
        Self::new(Box::new(PathExtractor))
    }
}

impl DropHandler {
    pub fn new(extractor: Box<dyn EntryExtractor>) -> Self {
        Self { extractor }
    }

    /// Replace the project with the dropped files and reload it.
    pub fn handle_drop(
        &self,
        event: &mut DropEvent,
        launcher: &mut Launcher,
        registrar: &dyn StoreRegistrar,
    ) -> DropOutcome {
        event.prevent_default();
        match self.ingest(event, launcher, registrar) {
            Ok(0) => DropOutcome::Empty,
            Ok(count) => DropOutcome::Loaded(count),
            Err(err) => {
                launcher.report_error(&err);
                DropOutcome::Failed(err)
            }
        }
    }

    fn ingest(
        &self,
        event: &DropEvent,
        launcher: &mut Launcher,
        registrar: &dyn StoreRegistrar,
    ) -> Result<usize, IngestError> {
        let Some(paths) = event.payload.as_deref() else {
            debug!("Drop: no file payload, ignoring");
            return Ok(0);
        };
        let files = self.extractor.extract(paths)?;
        if files.is_empty() {
            debug!("Drop: no files, ignoring");
            return Ok(0);
        }

        launcher.fs_mut().reset_file_refs();
        if !launcher.fs().vfs().has_store()
            && let Err(err) = launcher.init_filesystem(registrar)
        {
            // Ingestion falls back to an in-memory store
            warn!("Drop: filesystem init failed: {}", err);
        }

        let count = launcher.fs_mut().ingest_files(files)?;
        info!("Drop: ingested {} files", count);
        launcher.reload_project()?;
        Ok(count)
    }
}

/// Drop-target overlay: shown at once on drag-over, hidden after a quiet
/// period once the drag leaves. Re-entering within that period keeps it up.
#[derive(Debug, Clone)]
pub struct DropOverlay {
    visible: bool,
    hide: Debouncer<()>,
}

impl DropOverlay {
    pub fn new(hide_delay_ms: u64) -> Self {
        Self {
            visible: false,
            hide: Debouncer::new(hide_delay_ms),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.overlay_hide_delay_ms)
    }

    pub fn drag_over(&mut self) {
        self.hide.cancel();
        self.visible = true;
    }

    pub fn drag_leave(&mut self, now: Instant) {
        if self.visible {
            self.hide.schedule_at((), now);
        }
    }

    pub fn drag_end(&mut self, now: Instant) {
        self.drag_leave(now);
    }

    /// Apply an elapsed hide. Returns true when the overlay just went away.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.hide.tick_at(now).is_some() {
            self.visible = false;
            return true;
        }
        false
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }
}
