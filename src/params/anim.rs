//! Animation session - the timed walk of one slider through its range.
//!
//! A session never talks to the worker; the scheduler asks it for the next
//! value when a tick is due and its previous tick has resolved.

use log::trace;
use serde_json::Value;
use std::time::{Duration, Instant};

use crate::worker::{LoopMode, ParamValues, ParameterDefinition};

const DEFAULT_MIN: f64 = 0.0;
const DEFAULT_MAX: f64 = 100.0;
const DEFAULT_STEP: f64 = 1.0;
/// Slowest tick rate; keeps very small fps values from overflowing the clock
const MAX_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Clone, Debug)]
pub struct AnimationSession {
    name: String,
    min: f64,
    max: f64,
    step: f64,
    mode: LoopMode,
    value: f64,
    /// +1 towards max, -1 towards min
    direction: f64,
    interval: Duration,
    next_due: Instant,
    params: ParamValues,
    finished: bool,
}

impl AnimationSession {
    /// Start at `initial` (clamped). A one-shot loop already sitting at its
    /// end starts over from the minimum. The first tick is due immediately.
    pub fn new(def: &ParameterDefinition, initial: f64, params: ParamValues, now: Instant) -> Self {
        let min = def.min.unwrap_or(DEFAULT_MIN);
        let max = def.max.unwrap_or(DEFAULT_MAX).max(min);
        let step = def.step.filter(|s| *s > 0.0).unwrap_or(DEFAULT_STEP);
        let fps = def.fps.filter(|f| *f > 0.0).unwrap_or(1.0);

        let mut value = initial.clamp(min, max);
        if def.loop_mode == LoopMode::Once && value >= max && max > min {
            value = min;
        }

        Self {
            name: def.name.clone(),
            min,
            max,
            step,
            mode: def.loop_mode,
            value,
            direction: 1.0,
            interval: Duration::try_from_secs_f64(1.0 / fps).map_or(MAX_INTERVAL, |d| d.min(MAX_INTERVAL)),
            next_due: now,
            params,
            finished: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_due(&self, now: Instant) -> bool {
        !self.finished && now >= self.next_due
    }

    /// Value for this tick plus the full parameter set to evaluate, then
    /// step towards the next one. `None` once a one-shot loop has ended.
    pub fn advance(&mut self, now: Instant) -> Option<(f64, ParamValues)> {
        if self.finished {
            return None;
        }
        let current = self.value;
        self.params.insert(self.name.clone(), number(current));
        self.next_due = now + self.interval;

        let eps = self.step * 1e-9;
        let next = current + self.step * self.direction;
        if next > self.max + eps || next < self.min - eps {
            match self.mode {
                LoopMode::Once => self.finished = true,
                LoopMode::Restart => {
                    self.value = if self.direction > 0.0 { self.min } else { self.max };
                }
                LoopMode::Reverse => {
                    self.direction = -self.direction;
                    self.value = (current + self.step * self.direction).clamp(self.min, self.max);
                }
            }
        } else {
            self.value = next.clamp(self.min, self.max);
        }

        trace!("anim {}: tick {} -> next {}", self.name, current, self.value);
        Some((current, self.params.clone()))
    }
}

/// Integral values stay integers on the wire.
pub(crate) fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(min: f64, max: f64, step: f64, mode: LoopMode) -> ParameterDefinition {
        ParameterDefinition {
            name: "t".into(),
            kind: "slider".into(),
            min: Some(min),
            max: Some(max),
            step: Some(step),
            fps: Some(10.0),
            loop_mode: mode,
            ..Default::default()
        }
    }

    fn run(session: &mut AnimationSession, ticks: usize) -> Vec<f64> {
        let now = Instant::now();
        (0..ticks).filter_map(|_| session.advance(now).map(|(v, _)| v)).collect()
    }

    #[test]
    fn test_once_ends_at_max() {
        let mut session = AnimationSession::new(&def(0.0, 3.0, 1.0, LoopMode::Once), 0.0, ParamValues::new(), Instant::now());
        assert_eq!(run(&mut session, 10), vec![0.0, 1.0, 2.0, 3.0]);
        assert!(session.is_finished());
    }

    #[test]
    fn test_restart_wraps() {
        let mut session = AnimationSession::new(&def(0.0, 2.0, 1.0, LoopMode::Restart), 1.0, ParamValues::new(), Instant::now());
        assert_eq!(run(&mut session, 5), vec![1.0, 2.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_reverse_bounces() {
        let mut session = AnimationSession::new(&def(0.0, 2.0, 1.0, LoopMode::Reverse), 0.0, ParamValues::new(), Instant::now());
        assert_eq!(run(&mut session, 6), vec![0.0, 1.0, 2.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_once_at_end_starts_over() {
        let session = AnimationSession::new(&def(0.0, 3.0, 1.0, LoopMode::Once), 3.0, ParamValues::new(), Instant::now());
        assert_eq!(session.value, 0.0);
    }

    #[test]
    fn test_tiny_fps_caps_interval() {
        let now = Instant::now();
        for fps in [1e-300, 1e-9] {
            let def = ParameterDefinition { fps: Some(fps), ..def(0.0, 3.0, 1.0, LoopMode::Restart) };
            let mut session = AnimationSession::new(&def, 0.0, ParamValues::new(), now);
            assert_eq!(session.interval(), MAX_INTERVAL);
            assert!(session.advance(now).is_some());
            assert!(!session.is_due(now + Duration::from_secs(60)));
        }
    }

    #[test]
    fn test_tick_timing_and_snapshot() {
        let now = Instant::now();
        let mut params = ParamValues::new();
        params.insert("size".into(), Value::from(5));
        let mut session = AnimationSession::new(&def(0.0, 10.0, 0.5, LoopMode::Once), 2.0, params, now);

        assert!(session.is_due(now));
        let (value, snapshot) = session.advance(now).unwrap();
        assert_eq!(value, 2.0);
        assert_eq!(snapshot.get("size"), Some(&Value::from(5)));
        assert_eq!(snapshot.get("t"), Some(&Value::from(2)));

        assert!(!session.is_due(now + Duration::from_millis(50)));
        assert!(session.is_due(now + Duration::from_millis(100)));
        let (value, snapshot) = session.advance(now + Duration::from_millis(100)).unwrap();
        assert_eq!(value, 2.5);
        assert_eq!(snapshot.get("t"), Some(&Value::from(2.5)));
    }
}
