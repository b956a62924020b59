//! Debouncer - a cancellable delayed action with a single handle per site.
//!
//! Used for the progress indicator (show only after jobs persist) and the
//! drop overlay (hide only after the drag has left for a while).
//!
//! Nothing runs in the background: the owner calls `tick_at(now)` from its
//! update loop and acts when the pending payload is handed back.
//!
//! ```ignore
//! timer.schedule_at((), now);          // arm (re-arming resets the delay)
//! if timer.tick_at(now).is_some() { /* fire */ }
//! timer.cancel();                      // fresh event of the cancelling kind
//! ```

use log::trace;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    /// Quiet period before the action fires
    delay: Duration,
    /// Pending action: (payload, trigger_time)
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(delay_ms: u64) -> Self {
        Self::with_delay(Duration::from_millis(delay_ms))
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay, pending: None }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arm the timer. If already pending, the delay restarts from `now`.
    pub fn schedule_at(&mut self, payload: T, now: Instant) {
        self.pending = Some((payload, now + self.delay));
        trace!("Debouncer: armed for {}ms", self.delay.as_millis());
    }

    pub fn schedule(&mut self, payload: T) {
        self.schedule_at(payload, Instant::now());
    }

    /// Drop the pending action. Returns true if something was pending.
    pub fn cancel(&mut self) -> bool {
        let was_pending = self.pending.take().is_some();
        if was_pending {
            trace!("Debouncer: cancelled");
        }
        was_pending
    }

    /// Hand back the payload once the delay has elapsed, clearing it.
    pub fn tick_at(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((_, trigger_at)) if now >= *trigger_at => self.pending.take().map(|(payload, _)| payload),
            _ => None,
        }
    }

    pub fn tick(&mut self) -> Option<T> {
        self.tick_at(Instant::now())
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_not_before_delay() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(300);
        d.schedule_at(7, t0);
        assert_eq!(d.tick_at(t0 + ms(299)), None);
        assert!(d.is_pending());
        assert_eq!(d.tick_at(t0 + ms(300)), Some(7));
        assert!(!d.is_pending());
        assert_eq!(d.tick_at(t0 + ms(900)), None);
    }

    #[test]
    fn test_reschedule_restarts_window() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(300);
        d.schedule_at("a", t0);
        d.schedule_at("b", t0 + ms(200));
        assert_eq!(d.tick_at(t0 + ms(350)), None);
        assert_eq!(d.tick_at(t0 + ms(500)), Some("b"));
    }

    #[test]
    fn test_cancel() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(10);
        d.schedule_at((), t0);
        assert!(d.cancel());
        assert!(!d.cancel());
        assert_eq!(d.tick_at(t0 + ms(50)), None);
    }

    #[test]
    fn test_wall_clock_tick() {
        let mut d = Debouncer::new(5);
        d.schedule(1u8);
        std::thread::sleep(ms(10));
        assert_eq!(d.tick(), Some(1));
    }
}
