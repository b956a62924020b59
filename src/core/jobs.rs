//! Job counter - number of outstanding worker calls.
//!
//! Incremented on dispatch, decremented on completion (success or failure).
//! Every change is published as [`JobCountChanged`] so the progress reporter
//! can react on the UI thread.

use log::trace;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::event_bus::EventEmitter;
use super::events::JobCountChanged;

#[derive(Clone, Debug)]
pub struct JobCounter {
    count: Arc<AtomicUsize>,
    events: EventEmitter,
}

impl JobCounter {
    pub fn new(events: EventEmitter) -> Self {
        Self {
            count: Arc::new(AtomicUsize::new(0)),
            events,
        }
    }

    pub fn get(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Record a dispatched job, returns the new count.
    pub fn increment(&self) -> usize {
        let count = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        trace!("jobs: {}", count);
        self.events.emit(JobCountChanged(count));
        count
    }

    /// Record a finished job, returns the new count. Never goes below zero.
    pub fn decrement(&self) -> usize {
        let mut current = self.count.load(Ordering::SeqCst);
        loop {
            let next = current.saturating_sub(1);
            match self
                .count
                .compare_exchange_weak(current, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => {
                    trace!("jobs: {}", next);
                    self.events.emit(JobCountChanged(next));
                    return next;
                }
                Err(actual) => current = actual,
            }
        }
    }
}
