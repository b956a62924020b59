//! Core plumbing shared by the orchestration modules: events, debounced
//! timers, the job counter and the UI sink seams.

pub mod debounce;
pub mod event_bus;
pub mod events;
pub mod jobs;
pub mod progress;
pub mod sinks;

pub use debounce::Debouncer;
pub use event_bus::EventBus;
pub use jobs::JobCounter;
pub use progress::ProgressReporter;
pub use sinks::{ErrorSink, ErrorSlot, ProgressSink, ProgressSlot};
