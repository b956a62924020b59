//! Worker seam - every script evaluation happens behind [`ScriptWorker`].
//!
//! A call is a message round trip: `dispatch()` hands the request over and
//! returns a [`PendingCall`] holding the one-shot reply channel. Callers that
//! must finish before the UI proceeds (`run`, reload) `wait()` on it; the
//! parameter scheduler polls it with `try_take()` from its update loop.

pub mod protocol;
pub mod thread;

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};
use indexmap::IndexMap;
use std::time::{Duration, Instant};

pub use protocol::{
    Aabb, Alias, Entities, Entity, ExecutionRequest, ExecutionResult, LoopMode, ParamValues,
    ParameterDefinition, WorkerReply, WorkerRequest,
};
pub use thread::{Evaluator, ProgressReport, ThreadWorker};

/// Worker call failures
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerError {
    /// Script threw during evaluation
    Evaluation(String),
    /// Script required a module the resolver could not find
    ModuleNotFound(String),
    /// Worker went away before replying
    Disconnected,
    /// Worker answered a call with the wrong kind of reply
    UnexpectedReply(&'static str),
}

impl std::fmt::Display for WorkerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerError::Evaluation(msg) => write!(f, "Script error: {}", msg),
            WorkerError::ModuleNotFound(name) => write!(f, "Module not found: {}", name),
            WorkerError::Disconnected => write!(f, "Worker disconnected"),
            WorkerError::UnexpectedReply(method) => write!(f, "Unexpected reply to {}", method),
        }
    }
}

impl std::error::Error for WorkerError {}

pub type WorkerResult = Result<WorkerReply, WorkerError>;

/// Outstanding worker call.
#[derive(Debug)]
pub struct PendingCall {
    method: &'static str,
    issued: Instant,
    rx: Receiver<WorkerResult>,
}

impl PendingCall {
    /// Create the reply channel for a call. The worker side keeps the sender.
    pub fn channel(method: &'static str) -> (Sender<WorkerResult>, PendingCall) {
        let (tx, rx) = bounded(1);
        let call = PendingCall {
            method,
            issued: Instant::now(),
            rx,
        };
        (tx, call)
    }

    /// An already resolved call (transport refused the request, test fakes).
    pub fn resolved(method: &'static str, result: WorkerResult) -> PendingCall {
        let (tx, call) = Self::channel(method);
        let _ = tx.send(result);
        call
    }

    pub fn method(&self) -> &'static str {
        self.method
    }

    pub fn elapsed(&self) -> Duration {
        self.issued.elapsed()
    }

    /// Non-blocking check. `None` while the worker is still busy.
    pub fn try_take(&self) -> Option<WorkerResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(WorkerError::Disconnected)),
        }
    }

    /// Block until the worker replies.
    pub fn wait(self) -> WorkerResult {
        self.rx.recv().unwrap_or(Err(WorkerError::Disconnected))
    }

    /// Block until the worker replies with an execution result.
    pub fn wait_result(self) -> Result<ExecutionResult, WorkerError> {
        let method = self.method;
        into_execution(method, self.wait())
    }
}

/// Unwrap an execution reply, rejecting `Done`.
pub fn into_execution(method: &'static str, result: WorkerResult) -> Result<ExecutionResult, WorkerError> {
    match result? {
        WorkerReply::Executed(result) => Ok(result),
        WorkerReply::Done => Err(WorkerError::UnexpectedReply(method)),
    }
}

/// Message proxy to the evaluation worker.
///
/// Implementations must answer calls in the order they were dispatched and
/// must keep the shared job count current.
pub trait ScriptWorker {
    fn dispatch(&self, request: WorkerRequest) -> PendingCall;

    fn init(&self, alias: Vec<Alias>) -> PendingCall {
        self.dispatch(WorkerRequest::Init {
            bundles: IndexMap::new(),
            alias,
        })
    }

    /// Register prebuilt module sources by specifier.
    fn init_bundles(&self, bundles: IndexMap<String, String>) -> PendingCall {
        self.dispatch(WorkerRequest::Init {
            bundles,
            alias: Vec::new(),
        })
    }

    fn run_script(&self, request: ExecutionRequest) -> PendingCall {
        self.dispatch(WorkerRequest::RunScript(request))
    }

    fn run_with_params(&self, params: ParamValues) -> PendingCall {
        self.dispatch(WorkerRequest::RunWithParams { params })
    }

    fn clear_file_cache(&self, files: Vec<String>, root: String) -> PendingCall {
        self.dispatch(WorkerRequest::ClearFileCache { files, root })
    }

    fn clear_temp_cache(&self) -> PendingCall {
        self.dispatch(WorkerRequest::ClearTempCache)
    }
}
