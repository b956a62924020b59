//! Project state and entry/alias analysis.
//!
//! Paths are resolved against the project root: the deepest directory that
//! contains every listed file, so a tree dropped inside a folder of its own
//! still finds its manifest.
//!
//! Entry resolution:
//! 1. manifest `main`
//! 2. first present of the conventional entry names
//! 3. the shallowest script file, alphabetically
//!
//! Each `workspaces` directory with its own manifest contributes an alias
//! `{name -> <dir>/<main or index.js>}` for the worker's module resolver.

use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::{FsError, file_name, normalize_path};
use crate::worker::Alias;

const ENTRY_CANDIDATES: &[&str] = &[
    "/index.js",
    "/jscad.model.js",
    "/main.js",
    "/index.jscad",
    "/main.jscad",
];

const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "jscad", "ts"];

/// Everything the manager knows about the loaded project.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProjectState {
    pub base: String,
    pub file_to_run: Option<String>,
    /// Content overrides and memoized reads, keyed by project path
    pub cache: IndexMap<String, String>,
    /// Files the editor tracks, in display order
    pub files_to_check: Vec<String>,
    pub project_name: String,
    pub alias: Vec<Alias>,
}

impl ProjectState {
    pub fn is_tracked(&self, path: &str) -> bool {
        self.cache.contains_key(path) || self.files_to_check.iter().any(|p| p == path)
    }

    pub fn track(&mut self, path: &str) {
        if !self.files_to_check.iter().any(|p| p == path) {
            self.files_to_check.push(path.to_string());
        }
    }
}

/// Outcome of analysis. Pure function of the listed files and their content.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    pub entry: Option<String>,
    pub alias: Vec<Alias>,
    /// Source of the entry script, as stored
    #[serde(skip)]
    pub script: Option<String>,
    pub project_name: String,
    pub files: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    name: Option<String>,
    main: Option<String>,
    #[serde(default)]
    workspaces: Vec<String>,
}

pub fn is_script(path: &str) -> bool {
    path.rsplit_once('.')
        .is_some_and(|(_, ext)| SCRIPT_EXTENSIONS.contains(&ext))
}

fn parse_manifest(path: &str, raw: &str) -> Result<Manifest, FsError> {
    serde_json::from_str(raw).map_err(|e| FsError::Manifest {
        path: path.to_string(),
        message: e.to_string(),
    })
}

/// Deepest directory shared by all `files`, `/` when there is none.
pub fn project_root(files: &[String]) -> String {
    let mut common: Option<Vec<&str>> = None;
    for file in files {
        let mut segments: Vec<&str> = file.split('/').filter(|s| !s.is_empty()).collect();
        segments.pop();
        common = Some(match common {
            None => segments,
            Some(prev) => prev
                .into_iter()
                .zip(segments)
                .take_while(|(a, b)| a == b)
                .map(|(a, _)| a)
                .collect(),
        });
    }
    format!("/{}", common.unwrap_or_default().join("/"))
}

fn file_stem(path: &str) -> &str {
    let name = file_name(path);
    name.split_once('.').map(|(stem, _)| stem).unwrap_or(name)
}

/// Work out entry script, alias table and project name.
///
/// `read` returns stored content without side effects.
pub fn analyze_project<F>(
    files: &[String],
    read: F,
    manifest_name: &str,
    default_name: &str,
) -> Result<ProjectInfo, FsError>
where
    F: Fn(&str) -> Result<String, FsError>,
{
    let has = |path: &str| files.iter().any(|f| f == path);
    let root = project_root(files);
    let at = |rel: &str| normalize_path(&format!("{}/{}", root, rel));
    let manifest_path = at(manifest_name);

    let mut manifest = Manifest::default();
    if has(&manifest_path) {
        manifest = parse_manifest(&manifest_path, &read(&manifest_path)?)?;
    }

    let mut alias = Vec::new();
    for workspace in &manifest.workspaces {
        let dir = at(workspace.as_str());
        let ws_manifest = normalize_path(&format!("{}/{}", dir, manifest_name));
        if !has(&ws_manifest) {
            warn!("workspace {} has no {}, skipped", dir, manifest_name);
            continue;
        }
        let ws = parse_manifest(&ws_manifest, &read(&ws_manifest)?)?;
        let Some(name) = ws.name else {
            warn!("workspace {} has no name, skipped", dir);
            continue;
        };
        let main = ws.main.unwrap_or_else(|| "index.js".to_string());
        alias.push(Alias {
            name,
            path: normalize_path(&format!("{}/{}", dir, main)),
        });
    }

    let entry = match &manifest.main {
        Some(main) => {
            let main = at(main.as_str());
            if !has(&main) {
                return Err(FsError::NotFound(main));
            }
            Some(main)
        }
        None => ENTRY_CANDIDATES
            .iter()
            .map(|c| at(*c))
            .find(|c| has(c.as_str()))
            .or_else(|| {
                files
                    .iter()
                    .filter(|f| is_script(f))
                    .min_by(|a, b| (a.matches('/').count(), a).cmp(&(b.matches('/').count(), b)))
                    .cloned()
            }),
    };

    let script = entry.as_deref().map(&read).transpose()?;

    let project_name = manifest
        .name
        .clone()
        .or_else(|| entry.as_deref().map(|e| file_stem(e).to_string()))
        .unwrap_or_else(|| default_name.to_string());

    debug!(
        "analyzed project '{}' at {}: entry={:?}, {} alias(es), {} file(s)",
        project_name,
        root,
        entry,
        alias.len(),
        files.len()
    );

    Ok(ProjectInfo {
        entry,
        alias,
        script,
        project_name,
        files: files.to_vec(),
    })
}
