//! Events crossing from producer threads into the launcher loop.

/// Number of outstanding worker calls changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobCountChanged(pub usize);

/// Out-of-band progress reported by the worker while evaluating.
/// `value: None` means indeterminate.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkerProgress {
    pub value: Option<f64>,
    pub note: String,
}

/// Project paths changed on the backing store (watcher or external tool).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilesChanged(pub Vec<String>);
