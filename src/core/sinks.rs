//! Context objects handed to orchestration operations instead of globals.
//!
//! The launcher owns one of each and passes them down; tests inject the
//! recording implementations below.

use std::sync::{Arc, Mutex};

/// Process-wide error display slot. `None` clears it.
pub trait ErrorSink {
    fn set_error(&mut self, message: Option<String>);
}

/// Progress indicator in the host UI.
pub trait ProgressSink {
    fn set_visible(&mut self, visible: bool);
    /// `value: None` renders as indeterminate.
    fn set_progress(&mut self, value: Option<f64>, note: &str);
}

/// Error slot that keeps the current message, shareable with the host UI.
#[derive(Clone, Debug, Default)]
pub struct ErrorSlot {
    current: Arc<Mutex<Option<String>>>,
}

impl ErrorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<String> {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ErrorSink for ErrorSlot {
    fn set_error(&mut self, message: Option<String>) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = message;
    }
}

/// Snapshot of what the indicator currently shows.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProgressView {
    pub visible: bool,
    pub value: Option<f64>,
    pub note: String,
}

/// Progress sink that records into shared state.
#[derive(Clone, Debug, Default)]
pub struct ProgressSlot {
    inner: Arc<Mutex<ProgressView>>,
}

impl ProgressSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ProgressView {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ProgressSink for ProgressSlot {
    fn set_visible(&mut self, visible: bool) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).visible = visible;
    }

    fn set_progress(&mut self, value: Option<f64>, note: &str) {
        let mut view = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        view.value = value;
        view.note = note.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_slot_shared_between_clones() {
        let slot = ErrorSlot::new();
        let mut sink = slot.clone();
        sink.set_error(Some("boom".into()));
        assert_eq!(slot.current().as_deref(), Some("boom"));
        sink.set_error(None);
        assert_eq!(slot.current(), None);
    }

    #[test]
    fn test_progress_overwrites() {
        let slot = ProgressSlot::new();
        let mut sink = slot.clone();
        sink.set_progress(Some(0.5), "half");
        sink.set_progress(None, "12.00 ms");
        let view = slot.snapshot();
        assert_eq!(view.value, None);
        assert_eq!(view.note, "12.00 ms");
    }
}
