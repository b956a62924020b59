//! Parameter/animation scheduler.
//!
//! Owns the values the script last ran with and serializes re-execution:
//! at most one `runWithParams` call is outstanding at any time, whether it
//! came from a control change or from an animation tick.
//!
//! Two slots:
//! - `in_flight`: the outstanding call
//! - `pending`: the newest parameter set that arrived meanwhile; older
//!   pending sets are overwritten. Promoted as soon as `in_flight` resolves.
//!
//! Rebuilding the panel bumps an epoch. Calls issued under an older epoch
//! keep their slot until they resolve, then their results are dropped.

pub mod anim;

use log::{debug, trace, warn};
use serde_json::Value;
use std::time::{Duration, Instant};

use crate::worker::{
    ExecutionResult, ParamValues, ParameterDefinition, PendingCall, ScriptWorker, WorkerError, WorkerResult,
    into_execution,
};

pub use anim::AnimationSession;

/// Animation indicator shown by the panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnimStatus {
    Running,
    Stopped,
}

/// Where a parameter change came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeSource {
    /// A value control
    Control,
    /// Group expand/collapse; no value changed
    Group,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Executing,
    Animating,
}

/// Generated parameter UI.
pub trait ParamPanel {
    /// Replace all controls.
    fn rebuild(&mut self, defs: &[ParameterDefinition], values: &ParamValues);
    fn current_values(&self) -> ParamValues;
    /// Move a control without reporting a change back.
    fn set_value(&mut self, name: &str, value: &Value);
    fn set_anim_status(&mut self, status: AnimStatus);
}

/// A finished evaluation, for the orchestrator to apply.
#[derive(Clone, Debug, PartialEq)]
pub enum SchedulerOutcome {
    Evaluated {
        result: ExecutionResult,
        elapsed: Duration,
        animation_tick: bool,
    },
    Failed(WorkerError),
}

#[derive(Debug)]
enum CallKind {
    Params,
    AnimTick { name: String, value: f64 },
}

#[derive(Debug)]
struct InFlight {
    call: PendingCall,
    params: ParamValues,
    kind: CallKind,
    epoch: u64,
}

#[derive(Debug, Default)]
pub struct ParamScheduler {
    in_flight: Option<InFlight>,
    pending: Option<ParamValues>,
    animation: Option<AnimationSession>,
    last_run_params: ParamValues,
    epoch: u64,
}

impl ParamScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SchedulerState {
        if self.animation.is_some() {
            SchedulerState::Animating
        } else if self.in_flight.is_some() {
            SchedulerState::Executing
        } else {
            SchedulerState::Idle
        }
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    pub fn last_run_params(&self) -> &ParamValues {
        &self.last_run_params
    }

    /// Last value `name` was evaluated with, 0 when unknown or not numeric.
    pub fn last_value(&self, name: &str) -> f64 {
        self.last_run_params.get(name).and_then(Value::as_f64).unwrap_or(0.0)
    }

    /// New controls for a freshly evaluated script. Any animation ends
    /// without notice and outstanding results become stale.
    pub fn rebuild(&mut self, defs: &[ParameterDefinition], params: &ParamValues, panel: &mut dyn ParamPanel) {
        if self.animation.take().is_some() {
            debug!("rebuild: animation dropped");
        }
        self.pending = None;
        self.epoch += 1;
        self.last_run_params = params.clone();
        panel.rebuild(defs, params);
    }

    /// A control changed. Returns `true` if a worker call was issued now.
    pub fn on_params_changed(
        &mut self,
        params: ParamValues,
        source: ChangeSource,
        worker: &dyn ScriptWorker,
        panel: &mut dyn ParamPanel,
    ) -> bool {
        if source == ChangeSource::Group {
            trace!("group change ignored");
            return false;
        }

        self.stop_animation(panel);
        if self.in_flight.is_some() {
            if self.pending.replace(params).is_some() {
                trace!("pending parameter set superseded");
            }
            return false;
        }
        self.dispatch(params, CallKind::Params, worker);
        true
    }

    /// Start animating `def` from `initial`; a running animation is stopped
    /// first.
    pub fn start_animation(
        &mut self,
        def: &ParameterDefinition,
        initial: f64,
        now: Instant,
        panel: &mut dyn ParamPanel,
    ) {
        self.stop_animation(panel);
        let session = AnimationSession::new(def, initial, panel.current_values(), now);
        debug!("animation '{}' started at {} every {:?}", def.name, initial, session.interval());
        self.animation = Some(session);
        panel.set_anim_status(AnimStatus::Running);
    }

    /// No further ticks are scheduled; a tick already dispatched still
    /// lands.
    pub fn pause_animation(&mut self, panel: &mut dyn ParamPanel) -> bool {
        self.end_animation(panel, false)
    }

    /// End the animation. Its outstanding tick, if any, will be dropped.
    pub fn stop_animation(&mut self, panel: &mut dyn ParamPanel) -> bool {
        self.end_animation(panel, true)
    }

    fn end_animation(&mut self, panel: &mut dyn ParamPanel, drop_tick: bool) -> bool {
        let Some(session) = self.animation.take() else {
            return false;
        };
        if drop_tick
            && let Some(in_flight) = &self.in_flight
            && matches!(in_flight.kind, CallKind::AnimTick { .. })
        {
            self.epoch += 1;
        }
        debug!("animation '{}' stopped", session.name());
        panel.set_anim_status(AnimStatus::Stopped);
        true
    }

    /// Poll the outstanding call, then issue the next one: the pending set
    /// first, else a due animation tick.
    pub fn update(
        &mut self,
        now: Instant,
        worker: &dyn ScriptWorker,
        panel: &mut dyn ParamPanel,
    ) -> Option<SchedulerOutcome> {
        let mut outcome = None;

        if let Some(in_flight) = &self.in_flight {
            let reply = in_flight.call.try_take()?;
            if let Some(done) = self.in_flight.take() {
                outcome = self.complete(done, reply, panel);
            }
        }

        if let Some(params) = self.pending.take() {
            debug!("promoting pending parameter set");
            self.dispatch(params, CallKind::Params, worker);
        } else if let Some(session) = self.animation.as_mut() {
            if session.is_finished() {
                debug!("animation reached its end");
                self.stop_animation(panel);
            } else if session.is_due(now)
                && let Some((value, params)) = session.advance(now)
            {
                let name = session.name().to_string();
                self.dispatch(params, CallKind::AnimTick { name, value }, worker);
            }
        }

        outcome
    }

    fn dispatch(&mut self, params: ParamValues, kind: CallKind, worker: &dyn ScriptWorker) {
        trace!("runWithParams ({:?})", kind);
        let call = worker.run_with_params(params.clone());
        self.in_flight = Some(InFlight {
            call,
            params,
            kind,
            epoch: self.epoch,
        });
    }

    fn complete(
        &mut self,
        done: InFlight,
        reply: WorkerResult,
        panel: &mut dyn ParamPanel,
    ) -> Option<SchedulerOutcome> {
        if done.epoch != self.epoch {
            debug!("dropping stale {} result", done.call.method());
            return None;
        }

        let elapsed = done.call.elapsed();
        match into_execution(done.call.method(), reply) {
            Ok(result) => {
                let animation_tick = match &done.kind {
                    CallKind::AnimTick { name, value } => {
                        panel.set_value(name, &anim::number(*value));
                        true
                    }
                    CallKind::Params => false,
                };
                self.last_run_params = done.params;
                Some(SchedulerOutcome::Evaluated {
                    result,
                    elapsed,
                    animation_tick,
                })
            }
            Err(err) => {
                warn!("parameter run failed: {}", err);
                if matches!(done.kind, CallKind::AnimTick { .. }) {
                    self.stop_animation(panel);
                }
                Some(SchedulerOutcome::Failed(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::{LoopMode, WorkerReply, WorkerRequest};
    use crossbeam_channel::Sender;
    use std::cell::RefCell;

    /// Keeps reply senders so tests decide when calls resolve.
    #[derive(Default)]
    struct ManualWorker {
        calls: RefCell<Vec<(ParamValues, Sender<WorkerResult>)>>,
    }

    impl ManualWorker {
        fn count(&self) -> usize {
            self.calls.borrow().len()
        }

        fn params(&self, index: usize) -> ParamValues {
            self.calls.borrow()[index].0.clone()
        }

        fn resolve(&self, index: usize) {
            let reply = Ok(WorkerReply::Executed(ExecutionResult::default()));
            self.calls.borrow()[index].1.send(reply).unwrap();
        }

        fn fail(&self, index: usize) {
            let reply = Err(WorkerError::Evaluation("boom".into()));
            self.calls.borrow()[index].1.send(reply).unwrap();
        }
    }

    impl ScriptWorker for ManualWorker {
        fn dispatch(&self, request: WorkerRequest) -> PendingCall {
            let (tx, call) = PendingCall::channel(request.method());
            let params = match request {
                WorkerRequest::RunWithParams { params } => params,
                _ => ParamValues::new(),
            };
            self.calls.borrow_mut().push((params, tx));
            call
        }
    }

    #[derive(Default)]
    struct FakePanel {
        values: ParamValues,
        statuses: Vec<AnimStatus>,
        moved: Vec<(String, Value)>,
        rebuilds: usize,
    }

    impl ParamPanel for FakePanel {
        fn rebuild(&mut self, _defs: &[ParameterDefinition], values: &ParamValues) {
            self.values = values.clone();
            self.rebuilds += 1;
        }
        fn current_values(&self) -> ParamValues {
            self.values.clone()
        }
        fn set_value(&mut self, name: &str, value: &Value) {
            self.values.insert(name.to_string(), value.clone());
            self.moved.push((name.to_string(), value.clone()));
        }
        fn set_anim_status(&mut self, status: AnimStatus) {
            self.statuses.push(status);
        }
    }

    fn values(size: i64) -> ParamValues {
        let mut params = ParamValues::new();
        params.insert("size".into(), Value::from(size));
        params
    }

    fn slider(max: f64) -> ParameterDefinition {
        ParameterDefinition {
            name: "t".into(),
            kind: "slider".into(),
            min: Some(0.0),
            max: Some(max),
            step: Some(1.0),
            fps: Some(10.0),
            loop_mode: LoopMode::Once,
            ..Default::default()
        }
    }

    #[test]
    fn test_single_flight_and_latest_pending_runs() {
        let (worker, mut panel, mut sched) = (ManualWorker::default(), FakePanel::default(), ParamScheduler::new());
        let now = Instant::now();

        assert!(sched.on_params_changed(values(1), ChangeSource::Control, &worker, &mut panel));
        assert!(!sched.on_params_changed(values(2), ChangeSource::Control, &worker, &mut panel));
        assert!(!sched.on_params_changed(values(3), ChangeSource::Control, &worker, &mut panel));
        assert_eq!(worker.count(), 1);
        assert_eq!(sched.state(), SchedulerState::Executing);

        // Still running: nothing new goes out
        assert!(sched.update(now, &worker, &mut panel).is_none());
        assert_eq!(worker.count(), 1);

        worker.resolve(0);
        let outcome = sched.update(now, &worker, &mut panel);
        assert!(matches!(outcome, Some(SchedulerOutcome::Evaluated { animation_tick: false, .. })));
        assert_eq!(sched.last_value("size"), 1.0);
        // Latest pending set promoted, the superseded one never ran
        assert_eq!(worker.count(), 2);
        assert_eq!(worker.params(1), values(3));

        worker.resolve(1);
        sched.update(now, &worker, &mut panel);
        assert_eq!(worker.count(), 2);
        assert_eq!(sched.state(), SchedulerState::Idle);
        assert_eq!(sched.last_value("size"), 3.0);
    }

    #[test]
    fn test_group_change_ignored() {
        let (worker, mut panel, mut sched) = (ManualWorker::default(), FakePanel::default(), ParamScheduler::new());
        assert!(!sched.on_params_changed(values(1), ChangeSource::Group, &worker, &mut panel));
        assert_eq!(worker.count(), 0);
    }

    #[test]
    fn test_animation_ticks_self_serialize_and_end() {
        let (worker, mut panel, mut sched) = (ManualWorker::default(), FakePanel::default(), ParamScheduler::new());
        let t0 = Instant::now();
        sched.start_animation(&slider(2.0), 0.0, t0, &mut panel);
        assert_eq!(sched.state(), SchedulerState::Animating);

        let mut now = t0;
        for tick in 0..3 {
            sched.update(now, &worker, &mut panel);
            assert_eq!(worker.count(), tick + 1);
            // Due again, but the previous tick has not resolved
            now += Duration::from_millis(200);
            sched.update(now, &worker, &mut panel);
            assert_eq!(worker.count(), tick + 1);

            worker.resolve(tick);
            let outcome = sched.update(now, &worker, &mut panel);
            assert!(matches!(outcome, Some(SchedulerOutcome::Evaluated { animation_tick: true, .. })));
        }

        // The last result closes the finished loop
        assert_eq!(worker.count(), 3);
        assert_eq!(sched.state(), SchedulerState::Idle);
        assert_eq!(panel.statuses, vec![AnimStatus::Running, AnimStatus::Stopped]);
        let moved: Vec<Value> = panel.moved.iter().map(|(_, v)| v.clone()).collect();
        assert_eq!(moved, vec![Value::from(0), Value::from(1), Value::from(2)]);
    }

    #[test]
    fn test_start_is_idempotent_restart() {
        let (mut panel, mut sched) = (FakePanel::default(), ParamScheduler::new());
        let now = Instant::now();
        sched.start_animation(&slider(5.0), 0.0, now, &mut panel);
        sched.start_animation(&slider(5.0), 3.0, now, &mut panel);

        assert!(sched.is_animating());
        assert_eq!(
            panel.statuses,
            vec![AnimStatus::Running, AnimStatus::Stopped, AnimStatus::Running]
        );
    }

    #[test]
    fn test_restart_while_tick_in_flight_keeps_one_stream() {
        let (worker, mut panel, mut sched) = (ManualWorker::default(), FakePanel::default(), ParamScheduler::new());
        let now = Instant::now();
        sched.start_animation(&slider(5.0), 1.0, now, &mut panel);
        sched.update(now, &worker, &mut panel);
        assert_eq!(worker.count(), 1);

        // The restarted session waits for the old tick to resolve
        let later = now + Duration::from_secs(1);
        sched.start_animation(&slider(5.0), 3.0, later, &mut panel);
        assert!(sched.update(later, &worker, &mut panel).is_none());
        assert!(sched.update(later + Duration::from_secs(1), &worker, &mut panel).is_none());
        assert_eq!(worker.count(), 1);

        worker.resolve(0);
        assert!(sched.update(later + Duration::from_secs(2), &worker, &mut panel).is_none());
        assert!(panel.moved.is_empty());
        assert_eq!(worker.count(), 2);
        assert_eq!(worker.params(1).get("t"), Some(&Value::from(3)));
    }

    #[test]
    fn test_param_change_stops_animation_and_drops_tick() {
        let (worker, mut panel, mut sched) = (ManualWorker::default(), FakePanel::default(), ParamScheduler::new());
        let now = Instant::now();
        sched.start_animation(&slider(5.0), 0.0, now, &mut panel);
        sched.update(now, &worker, &mut panel);
        assert_eq!(worker.count(), 1);

        // Tick outstanding: the change waits in the pending slot
        assert!(!sched.on_params_changed(values(7), ChangeSource::Control, &worker, &mut panel));
        assert!(!sched.is_animating());
        assert_eq!(worker.count(), 1);

        worker.resolve(0);
        assert!(sched.update(now, &worker, &mut panel).is_none());
        assert!(panel.moved.is_empty());
        assert_eq!(worker.count(), 2);
        assert_eq!(worker.params(1), values(7));
    }

    #[test]
    fn test_pause_lets_dispatched_tick_land() {
        let (worker, mut panel, mut sched) = (ManualWorker::default(), FakePanel::default(), ParamScheduler::new());
        let now = Instant::now();
        sched.start_animation(&slider(5.0), 2.0, now, &mut panel);
        sched.update(now, &worker, &mut panel);
        assert!(sched.pause_animation(&mut panel));

        worker.resolve(0);
        let later = now + Duration::from_secs(1);
        let outcome = sched.update(later, &worker, &mut panel);
        assert!(matches!(outcome, Some(SchedulerOutcome::Evaluated { animation_tick: true, .. })));
        assert_eq!(panel.moved, vec![("t".to_string(), Value::from(2))]);
        // No further ticks
        sched.update(later + Duration::from_secs(1), &worker, &mut panel);
        assert_eq!(worker.count(), 1);
        assert_eq!(sched.state(), SchedulerState::Idle);
    }

    #[test]
    fn test_rebuild_discards_stale_result() {
        let (worker, mut panel, mut sched) = (ManualWorker::default(), FakePanel::default(), ParamScheduler::new());
        let now = Instant::now();
        sched.on_params_changed(values(1), ChangeSource::Control, &worker, &mut panel);
        sched.rebuild(&[slider(5.0)], &values(9), &mut panel);
        assert_eq!(panel.rebuilds, 1);

        // Stale call still holds the slot
        assert!(!sched.on_params_changed(values(2), ChangeSource::Control, &worker, &mut panel));
        worker.resolve(0);
        assert!(sched.update(now, &worker, &mut panel).is_none());
        assert_eq!(sched.last_value("size"), 9.0);
        assert_eq!(worker.count(), 2);
    }

    #[test]
    fn test_failed_tick_stops_animation() {
        let (worker, mut panel, mut sched) = (ManualWorker::default(), FakePanel::default(), ParamScheduler::new());
        let now = Instant::now();
        sched.start_animation(&slider(5.0), 0.0, now, &mut panel);
        sched.update(now, &worker, &mut panel);
        worker.fail(0);

        let outcome = sched.update(now, &worker, &mut panel);
        assert!(matches!(outcome, Some(SchedulerOutcome::Failed(WorkerError::Evaluation(_)))));
        assert!(!sched.is_animating());
    }
}
