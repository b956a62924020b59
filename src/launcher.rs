//! Launcher - runs scripts and applies their results.
//!
//! Owns the worker proxy, the filesystem manager, the parameter scheduler and
//! the UI sinks. The host calls [`Launcher::update`] once per frame; that is
//! where out-of-band events (job counts, worker progress, changed files) and
//! finished parameter evaluations are applied, one at a time.

use log::{debug, error, info, trace};
use std::fmt::Display;
use std::time::Instant;

use crate::core::event_bus::{EventBus, downcast_event};
use crate::core::events::{FilesChanged, JobCountChanged, WorkerProgress};
use crate::core::progress::ProgressReporter;
use crate::core::sinks::{ErrorSink, ProgressSink};
use crate::fs::{FilesOutcome, FsError, FsManager, Reloaded, SavePicker, StoreRegistrar, normalize_path};
use crate::params::{ChangeSource, ParamPanel, ParamScheduler, SchedulerOutcome};
use crate::view::{ViewModel, bounding_box};
use crate::worker::{
    Aabb, ExecutionRequest, ExecutionResult, ParamValues, ParameterDefinition, ScriptWorker, WorkerError,
};

/// Host UI pieces the launcher drives.
pub struct Frontend {
    pub errors: Box<dyn ErrorSink>,
    pub progress: Box<dyn ProgressSink>,
    pub view: Box<dyn ViewModel>,
    pub panel: Box<dyn ParamPanel>,
}

/// What applying one result did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunSummary {
    pub entities: usize,
    pub bounds: Option<Aabb>,
    /// Bounds were framed in the camera
    pub fitted: bool,
    /// Auto-started animations
    pub animations: usize,
    pub main_time: Option<f64>,
}

pub struct Launcher {
    worker: Box<dyn ScriptWorker>,
    bus: EventBus,
    fs: FsManager,
    params: ParamScheduler,
    progress: ProgressReporter,
    errors: Box<dyn ErrorSink>,
    view: Box<dyn ViewModel>,
    panel: Box<dyn ParamPanel>,
    zoom_to_fit: bool,
    app_base: String,
}

impl Launcher {
    pub fn new(worker: Box<dyn ScriptWorker>, bus: EventBus, fs: FsManager, frontend: Frontend) -> Self {
        let progress = ProgressReporter::new(frontend.progress, fs.settings().progress_delay_ms);
        Self {
            worker,
            bus,
            fs,
            params: ParamScheduler::new(),
            progress,
            errors: frontend.errors,
            view: frontend.view,
            panel: frontend.panel,
            zoom_to_fit: true,
            app_base: "/".to_string(),
        }
    }

    /// Base that relative script URLs resolve against.
    pub fn with_app_base(mut self, app_base: impl Into<String>) -> Self {
        self.app_base = app_base.into();
        self
    }

    pub fn fs(&self) -> &FsManager {
        &self.fs
    }

    pub fn fs_mut(&mut self) -> &mut FsManager {
        &mut self.fs
    }

    pub fn params(&self) -> &ParamScheduler {
        &self.params
    }

    pub fn progress(&self) -> &ProgressReporter {
        &self.progress
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn worker(&self) -> &dyn ScriptWorker {
        self.worker.as_ref()
    }

    pub fn zoom_to_fit(&self) -> bool {
        self.zoom_to_fit
    }

    /// Frame the next result in the camera.
    pub fn request_zoom_to_fit(&mut self) {
        self.zoom_to_fit = true;
    }

    /// Show `err` in the error slot.
    pub fn report_error(&mut self, err: &dyn Display) {
        error!("{}", err);
        self.errors.set_error(Some(err.to_string()));
    }

    pub fn init_filesystem(&mut self, registrar: &dyn StoreRegistrar) -> Result<(), FsError> {
        self.fs.init_filesystem(registrar).inspect_err(|e| self.report_error(e))
    }

    /// Evaluate a script and apply the result. Failures land in the error
    /// slot and are returned; nothing is retried.
    pub fn run(&mut self, request: ExecutionRequest) -> Result<RunSummary, WorkerError> {
        debug!(
            "runScript url={:?} base={} inline={}",
            request.url,
            request.base,
            request.script.is_some()
        );
        match self.worker.run_script(request).wait_result() {
            Ok(result) => Ok(self.apply_result(result, Instant::now())),
            Err(err) => {
                self.report_error(&err);
                Err(err)
            }
        }
    }

    /// Full reload: clear panel and model, frame the new result.
    pub fn reload_project(&mut self) -> Result<Reloaded, FsError> {
        self.params.rebuild(&[], &ParamValues::new(), self.panel.as_mut());
        self.view.clear();
        self.zoom_to_fit = true;

        match self.fs.reload_project(self.worker.as_ref()) {
            Ok(reloaded) => {
                if let Some(result) = &reloaded.result {
                    self.apply_result(result.clone(), Instant::now());
                }
                Ok(reloaded)
            }
            Err(err) => {
                self.report_error(&err);
                Err(err)
            }
        }
    }

    /// Feed changed paths to the filesystem manager and apply any rerun.
    pub fn handle_files_changed(&mut self, paths: &[String]) -> Result<FilesOutcome, FsError> {
        let outcome = self
            .fs
            .on_files_change(paths, self.worker.as_ref())
            .inspect_err(|e| self.report_error(e))?;
        match &outcome {
            FilesOutcome::Rerun { result, .. } => {
                self.apply_result(result.clone(), Instant::now());
            }
            FilesOutcome::Reloaded(Reloaded {
                result: Some(result), ..
            }) => {
                self.apply_result(result.clone(), Instant::now());
            }
            _ => {}
        }
        Ok(outcome)
    }

    /// Run editor content. With a project loaded, the edit overrides the
    /// cached file and the project entry runs again; otherwise the content
    /// runs as a standalone script.
    pub fn execute_editor_script(&mut self, script: &str, path: &str) -> Result<RunSummary, FsError> {
        let Some(entry) = self.fs.vfs().file_to_run() else {
            let url = self.fs.settings().default_script_url.clone();
            let request = ExecutionRequest::script(script, url, self.app_base.clone());
            return Ok(self.run(request)?);
        };

        self.fs.cache_script(path, script);
        self.rerun_entry(entry, vec![normalize_path(path)])
    }

    /// Save editor content back to its file.
    pub fn save_editor_script(&mut self, script: &str, path: &str, picker: &dyn SavePicker) -> Result<bool, FsError> {
        self.fs
            .save_file(path, script, picker)
            .inspect_err(|e| self.report_error(e))
    }

    /// Pick up external edits of saved files and rerun the project if any.
    pub fn check_file_changes(&mut self) -> Result<Vec<String>, FsError> {
        let changed = self.fs.check_file_changes().inspect_err(|e| self.report_error(e))?;
        let paths: Vec<String> = changed.into_iter().map(|(path, _)| path).collect();
        if paths.is_empty() {
            return Ok(paths);
        }
        info!("Externally modified: {:?}", paths);
        if let Some(entry) = self.fs.vfs().file_to_run() {
            self.rerun_entry(entry, paths.clone())?;
        }
        Ok(paths)
    }

    /// Run a script fetched from elsewhere; `url` resolves against the app
    /// base and serves as module base.
    pub fn open_script(&mut self, script: &str, url: &str) -> Result<RunSummary, WorkerError> {
        let base = resolve_url(&self.app_base, url);
        let default_url = self.fs.settings().default_script_url.clone();
        info!("Opening script from {}", base);
        self.run(ExecutionRequest::script(script, default_url, base))
    }

    /// Apply an evaluation result: rebuild the panel, show the entities,
    /// start declared auto-animations.
    pub fn apply_result(&mut self, result: ExecutionResult, now: Instant) -> RunSummary {
        self.params.rebuild(&result.def, &result.params, self.panel.as_mut());
        let defs = result.def.clone();
        let mut summary = self.handle_entities(result, false);
        summary.animations = self.start_auto_animations(&defs, now);
        summary
    }

    /// Hand entities to the view (a single one becomes a one-element list),
    /// frame them if requested, clear the error slot and report the time.
    pub fn handle_entities(&mut self, result: ExecutionResult, skip_log: bool) -> RunSummary {
        let main_time = result.main_time;
        let convert_time = result.convert_time;
        let entities = result.entities.into_vec();
        self.view.set_model(&entities);

        let bounds = bounding_box(&entities);
        let mut fitted = false;
        // The request stays armed until something with bounds shows up
        if self.zoom_to_fit
            && let Some(bounds) = bounds
        {
            self.view.fit(bounds, self.fs.settings().fit_margin);
            fitted = true;
            self.zoom_to_fit = false;
        }

        if !skip_log {
            info!(
                "Main execution: {} ms, mesh conversion: {} ms, {} entities",
                format_ms(main_time),
                format_ms(convert_time),
                entities.len()
            );
        }

        self.errors.set_error(None);
        self.progress.set_progress(None, &format!("{} ms", format_ms(main_time)));

        RunSummary {
            entities: entities.len(),
            bounds,
            fitted,
            animations: 0,
            main_time,
        }
    }

    /// Start every `{fps, autostart}` slider from its last value.
    pub fn start_auto_animations(&mut self, defs: &[ParameterDefinition], now: Instant) -> usize {
        let mut started = 0;
        for def in defs.iter().filter(|d| d.auto_animates()) {
            let value = self.params.last_value(&def.name);
            self.params.start_animation(def, value, now, self.panel.as_mut());
            started += 1;
        }
        started
    }

    /// Panel callback: values changed.
    pub fn on_params_changed(&mut self, params: ParamValues, source: ChangeSource) -> bool {
        self.params
            .on_params_changed(params, source, self.worker.as_ref(), self.panel.as_mut())
    }

    /// Panel callback: play button of `def`.
    pub fn start_animation(&mut self, def: &ParameterDefinition, value: f64, now: Instant) {
        self.params.start_animation(def, value, now, self.panel.as_mut());
    }

    /// Panel callback: pause button.
    pub fn pause_animation(&mut self) -> bool {
        self.params.pause_animation(self.panel.as_mut())
    }

    /// Main-loop pump. Drains the event bus, advances the progress timer and
    /// the parameter scheduler.
    pub fn update(&mut self, now: Instant) {
        let mut changed: Vec<String> = Vec::new();
        for event in self.bus.poll() {
            if let Some(JobCountChanged(count)) = downcast_event::<JobCountChanged>(&event) {
                self.progress.on_job_count_changed(*count, now);
            } else if let Some(progress) = downcast_event::<WorkerProgress>(&event) {
                self.progress.set_progress(progress.value, &progress.note);
            } else if let Some(FilesChanged(paths)) = downcast_event::<FilesChanged>(&event) {
                for path in paths {
                    if !changed.contains(path) {
                        changed.push(path.clone());
                    }
                }
            } else {
                trace!("unhandled event {}", (*event).type_name());
            }
        }

        // One batch per update, whatever the watcher delivered meanwhile
        if !changed.is_empty()
            && let Err(err) = self.handle_files_changed(&changed)
        {
            debug!("files change not applied: {}", err);
        }

        self.progress.tick(now);

        match self.params.update(now, self.worker.as_ref(), self.panel.as_mut()) {
            Some(SchedulerOutcome::Evaluated {
                mut result,
                elapsed,
                animation_tick,
            }) => {
                if result.main_time.is_none() {
                    result.main_time = Some(elapsed.as_secs_f64() * 1000.0);
                }
                self.handle_entities(result, animation_tick);
            }
            Some(SchedulerOutcome::Failed(err)) => self.report_error(&err),
            None => {}
        }
    }

    fn rerun_entry(&mut self, entry: String, paths: Vec<String>) -> Result<RunSummary, FsError> {
        let base = self.fs.vfs().base();
        // Worker must forget the old module before the rerun
        if let Err(err) = self.worker.clear_file_cache(paths, base.clone()).wait() {
            self.report_error(&err);
            return Err(err.into());
        }
        Ok(self.run(ExecutionRequest::url(entry, base))?)
    }
}

fn format_ms(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".to_string())
}

/// Join a relative `url` onto `base` (a directory URL).
pub fn resolve_url(base: &str, url: &str) -> String {
    if url.contains("://") || url.starts_with('/') {
        return url.to_string();
    }
    let dir = match base.rfind('/') {
        Some(i) => &base[..=i],
        None => "",
    };
    format!("{}{}", dir, url.trim_start_matches("./"))
}
