//! Progress reporter - debounced visibility of the job indicator.
//!
//! Short jobs should not flash the indicator:
//! - count 0 -> 1 arms the show timer (default 300ms)
//! - timer fires while jobs are still outstanding -> show
//! - count back to 0 at any time -> cancel timer, hide immediately
//!
//! `set_progress()` always overwrites value and note, there is no queue.

use log::trace;
use std::time::Instant;

use super::debounce::Debouncer;
use super::sinks::ProgressSink;

pub struct ProgressReporter {
    sink: Box<dyn ProgressSink>,
    show_timer: Debouncer<()>,
    jobs: usize,
    visible: bool,
}

impl ProgressReporter {
    pub fn new(sink: Box<dyn ProgressSink>, delay_ms: u64) -> Self {
        Self {
            sink,
            show_timer: Debouncer::new(delay_ms),
            jobs: 0,
            visible: false,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    pub fn on_job_count_changed(&mut self, count: usize, now: Instant) {
        let previous = self.jobs;
        self.jobs = count;
        if count == 0 {
            self.show_timer.cancel();
            self.set_visible(false);
        } else if previous == 0 {
            self.show_timer.schedule_at((), now);
        }
    }

    /// Advance the show timer; call once per update.
    pub fn tick(&mut self, now: Instant) {
        if self.show_timer.tick_at(now).is_some() && self.jobs > 0 {
            self.set_visible(true);
        }
    }

    pub fn set_progress(&mut self, value: Option<f64>, note: &str) {
        self.sink.set_progress(value, note);
    }

    fn set_visible(&mut self, visible: bool) {
        if self.visible != visible {
            trace!("progress indicator {}", if visible { "shown" } else { "hidden" });
        }
        self.visible = visible;
        self.sink.set_visible(visible);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sinks::ProgressSlot;
    use std::time::Duration;

    fn reporter() -> (ProgressReporter, ProgressSlot) {
        let slot = ProgressSlot::new();
        (ProgressReporter::new(Box::new(slot.clone()), 300), slot)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_short_job_never_shows() {
        let (mut p, slot) = reporter();
        let t0 = Instant::now();
        p.on_job_count_changed(1, t0);
        p.tick(t0 + ms(100));
        p.on_job_count_changed(0, t0 + ms(200));
        p.tick(t0 + ms(400));
        assert!(!p.is_visible());
        assert!(!slot.snapshot().visible);
    }

    #[test]
    fn test_long_job_shows_then_hides() {
        let (mut p, slot) = reporter();
        let t0 = Instant::now();
        p.on_job_count_changed(1, t0);
        p.tick(t0 + ms(299));
        assert!(!p.is_visible());
        p.tick(t0 + ms(300));
        assert!(p.is_visible());
        assert!(slot.snapshot().visible);

        p.on_job_count_changed(0, t0 + ms(500));
        assert!(!p.is_visible());
        assert!(!slot.snapshot().visible);
    }

    #[test]
    fn test_more_jobs_do_not_rearm() {
        let (mut p, _) = reporter();
        let t0 = Instant::now();
        p.on_job_count_changed(1, t0);
        p.on_job_count_changed(2, t0 + ms(250));
        p.tick(t0 + ms(310));
        assert!(p.is_visible());
    }

    #[test]
    fn test_new_window_after_return_to_zero() {
        let (mut p, _) = reporter();
        let t0 = Instant::now();
        p.on_job_count_changed(1, t0);
        p.on_job_count_changed(0, t0 + ms(100));
        p.on_job_count_changed(1, t0 + ms(200));
        p.tick(t0 + ms(350));
        assert!(!p.is_visible());
        p.tick(t0 + ms(500));
        assert!(p.is_visible());
    }

    #[test]
    fn test_set_progress_passthrough() {
        let (mut p, slot) = reporter();
        p.set_progress(Some(0.25), "loading");
        assert_eq!(slot.snapshot().value, Some(0.25));
        assert_eq!(slot.snapshot().note, "loading");
    }
}
