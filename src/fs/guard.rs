//! Reload-rate guard for filesystem registration failures.
//!
//! A failed registration is answered by asking the user to reload, but a
//! reload that fails again must not turn into a reload storm. The timestamp
//! of the last attempt is persisted across restarts; within the window
//! (3 seconds by default) further failures neither update it nor ask again.

use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::FsError;

/// Persisted key holding the last attempt, milliseconds since the epoch
pub const LAST_RELOAD_KEY: &str = "lastReload";

/// Small persisted key/value state that survives restarts.
pub trait StateStore: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String) -> Result<(), FsError>;
}

/// Non-persistent state, for tests and headless runs.
#[derive(Debug, Default)]
pub struct MemoryState {
    values: HashMap<String, String>,
    writes: usize,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `set()` calls
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl StateStore for MemoryState {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), FsError> {
        self.values.insert(key.to_string(), value);
        self.writes += 1;
        Ok(())
    }
}

/// JSON object on disk, rewritten on every `set()`.
#[derive(Debug)]
pub struct JsonStateFile {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonStateFile {
    /// Open (or start) the state file. Unreadable content starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| match serde_json::from_str(&raw) {
                Ok(values) => Some(values),
                Err(e) => {
                    warn!("Ignoring unreadable state file {}: {}", path.display(), e);
                    None
                }
            })
            .unwrap_or_default();
        Self { path, values }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonStateFile {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), FsError> {
        self.values.insert(key.to_string(), value);
        let raw = serde_json::to_string_pretty(&self.values)
            .map_err(|e| FsError::io(self.path.display().to_string(), e))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FsError::io(parent.display().to_string(), e))?;
        }
        std::fs::write(&self.path, raw).map_err(|e| FsError::io(self.path.display().to_string(), e))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardDecision {
    /// First failure in a fresh window: timestamp stored, ask for a reload
    FirstInWindow,
    /// Another failure inside the window: stay quiet
    Suppressed,
}

#[derive(Clone, Copy, Debug)]
pub struct ReloadGuard {
    window: Duration,
}

impl ReloadGuard {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window: Duration::from_millis(window_ms),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn record_failure(&self, state: &mut dyn StateStore, now_ms: u64) -> GuardDecision {
        let last = state.get(LAST_RELOAD_KEY).and_then(|raw| raw.parse::<u64>().ok());
        let window_ms = self.window.as_millis() as u64;
        match last {
            Some(last) if now_ms.saturating_sub(last) <= window_ms => {
                debug!("reload guard: failure {}ms after last attempt, suppressed", now_ms.saturating_sub(last));
                GuardDecision::Suppressed
            }
            _ => {
                if let Err(e) = state.set(LAST_RELOAD_KEY, now_ms.to_string()) {
                    warn!("reload guard: could not persist attempt time: {}", e);
                }
                GuardDecision::FirstInWindow
            }
        }
    }
}

/// Wall clock in milliseconds since the epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
