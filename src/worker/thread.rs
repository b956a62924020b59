//! Dedicated evaluation thread behind the [`ScriptWorker`] seam.
//!
//! One thread, one request at a time, strict FIFO: the worker is a single
//! shared resource and never evaluates two scripts concurrently. Job count
//! and progress travel back over the event bus; replies travel over the
//! per-call channel in [`PendingCall`].

use crossbeam_channel::{Sender, unbounded};
use log::{debug, trace, warn};
use std::thread;
use std::time::{Duration, Instant};

use super::{PendingCall, ScriptWorker, WorkerError, WorkerRequest, WorkerResult};
use crate::core::event_bus::EventEmitter;
use crate::core::events::WorkerProgress;
use crate::core::jobs::JobCounter;

/// Script evaluation engine hosted on the worker thread.
pub trait Evaluator: Send + 'static {
    fn handle(&mut self, request: WorkerRequest, progress: &ProgressReport) -> WorkerResult;
}

/// Progress callback handed to the evaluator for the current call.
pub struct ProgressReport {
    events: EventEmitter,
}

impl ProgressReport {
    /// `value: None` means indeterminate.
    pub fn report(&self, value: Option<f64>, note: impl Into<String>) {
        self.events.emit(WorkerProgress {
            value,
            note: note.into(),
        });
    }
}

struct Job {
    request: WorkerRequest,
    reply: Sender<WorkerResult>,
}

pub struct ThreadWorker {
    tx: Option<Sender<Job>>,
    handle: Option<thread::JoinHandle<()>>,
    jobs: JobCounter,
}

impl ThreadWorker {
    /// Spawn the worker thread around `evaluator`.
    pub fn spawn<E: Evaluator>(mut evaluator: E, events: EventEmitter) -> std::io::Result<Self> {
        let (tx, rx) = unbounded::<Job>();
        let jobs = JobCounter::new(events.clone());
        let thread_jobs = jobs.clone();

        let handle = thread::Builder::new()
            .name("cadrun-worker".into())
            .spawn(move || {
                trace!("Worker thread started");
                let progress = ProgressReport { events };
                for job in rx {
                    let method = job.request.method();
                    let started = Instant::now();
                    let result = evaluator.handle(job.request, &progress);
                    debug!(
                        "worker {} finished in {:.2}ms (ok={})",
                        method,
                        started.elapsed().as_secs_f64() * 1000.0,
                        result.is_ok()
                    );
                    thread_jobs.decrement();
                    // Caller may have dropped the call (fire-and-forget)
                    let _ = job.reply.send(result);
                }
                trace!("Worker thread stopped");
            })?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            jobs,
        })
    }

    pub fn jobs(&self) -> &JobCounter {
        &self.jobs
    }
}

impl ScriptWorker for ThreadWorker {
    fn dispatch(&self, request: WorkerRequest) -> PendingCall {
        let method = request.method();
        let (reply, call) = PendingCall::channel(method);
        let Some(tx) = &self.tx else {
            return PendingCall::resolved(method, Err(WorkerError::Disconnected));
        };

        self.jobs.increment();
        debug!("worker <- {}", method);
        if tx.send(Job { request, reply }).is_err() {
            warn!("worker thread gone, {} rejected", method);
            self.jobs.decrement();
            return PendingCall::resolved(method, Err(WorkerError::Disconnected));
        }
        call
    }
}

impl Drop for ThreadWorker {
    fn drop(&mut self) {
        // Closing the channel ends the thread after its current job
        self.tx.take();

        let Some(handle) = self.handle.take() else {
            return;
        };
        let deadline = Instant::now() + Duration::from_millis(500);
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                trace!("Worker shutdown timeout reached, detaching");
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        let _ = handle.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_bus::{EventBus, downcast_event};
    use crate::core::events::JobCountChanged;
    use crate::worker::{ExecutionRequest, ExecutionResult, WorkerReply};

    /// Echoes the script source length as main time.
    struct LengthEvaluator;

    impl Evaluator for LengthEvaluator {
        fn handle(&mut self, request: WorkerRequest, progress: &ProgressReport) -> WorkerResult {
            match request {
                WorkerRequest::RunScript(req) => {
                    progress.report(Some(0.5), "evaluating");
                    let len = req.script.map(|s| s.len()).unwrap_or(0);
                    Ok(WorkerReply::Executed(ExecutionResult {
                        main_time: Some(len as f64),
                        ..Default::default()
                    }))
                }
                WorkerRequest::RunWithParams { .. } => Err(WorkerError::Evaluation("no script loaded".into())),
                _ => Ok(WorkerReply::Done),
            }
        }
    }

    #[test]
    fn test_round_trip_in_order() {
        let bus = EventBus::new();
        let worker = ThreadWorker::spawn(LengthEvaluator, bus.emitter()).unwrap();

        let a = worker.run_script(ExecutionRequest::script("abc", "./a.js", "/"));
        let b = worker.run_with_params(Default::default());
        let c = worker.clear_temp_cache();

        assert_eq!(a.wait_result().unwrap().main_time, Some(3.0));
        assert!(matches!(b.wait(), Err(WorkerError::Evaluation(_))));
        assert_eq!(c.wait(), Ok(WorkerReply::Done));
        assert_eq!(worker.jobs().get(), 0);

        let events = bus.poll();
        let counts: Vec<usize> = events
            .iter()
            .filter_map(|e| downcast_event::<JobCountChanged>(e).map(|c| c.0))
            .collect();
        assert_eq!(counts.last(), Some(&0));
        assert!(counts.iter().any(|&c| c >= 1));
        assert!(events.iter().any(|e| downcast_event::<WorkerProgress>(e).is_some()));
    }

    #[test]
    fn test_dropped_call_still_completes() {
        let bus = EventBus::new();
        let worker = ThreadWorker::spawn(LengthEvaluator, bus.emitter()).unwrap();
        drop(worker.clear_temp_cache());
        let after = worker.run_script(ExecutionRequest::script("xy", "./a.js", "/"));
        assert_eq!(after.wait_result().unwrap().main_time, Some(2.0));
    }
}
