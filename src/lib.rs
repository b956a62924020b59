//! cadrun - orchestration core for a CAD script editor
//!
//! Drives a script worker, keeps a virtual project filesystem in sync with
//! it, schedules parameter re-evaluations and slider animations, and ingests
//! dropped project trees. Rendering and widgets stay with the host; they
//! plug in through the sink, view and panel traits.

// Events, timers, job counting, UI sinks
pub mod core;

// Worker protocol and evaluation thread
pub mod worker;

// Virtual project filesystem
pub mod fs;

// Parameter/animation scheduling
pub mod params;

// Orchestration
pub mod ingest;
pub mod launcher;
pub mod view;

// App modules
pub mod cli;
pub mod config;

pub use crate::core::event_bus::{BoxedEvent, EventBus, EventEmitter, downcast_event};
pub use fs::{FsError, FsManager, ProjectFile, VfsHandle};
pub use ingest::{DropHandler, DropOverlay};
pub use launcher::{Frontend, Launcher, RunSummary};
pub use params::ParamScheduler;
pub use worker::{ExecutionRequest, ExecutionResult, ScriptWorker, ThreadWorker, WorkerError};
