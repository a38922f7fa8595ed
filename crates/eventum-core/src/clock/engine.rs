//! The time-ordered event heap.
//!
//! `EventHeap` owns the three pieces of scheduler state: the current
//! virtual time, the pending-entry heap and the insertion sequence
//! counter. It knows nothing about callbacks or processes; popping an
//! entry and running it is the environment's job.
//!
//! # Invariants
//!
//! - Time monotonicity: `now` never decreases. `tick()` asserts this.
//! - Deterministic order: entries pop by `(time, priority, seq)`, so two
//!   runs of the same model pop the same sequence.

use std::collections::BinaryHeap;

use tracing::trace;

use super::types::{EventSeq, Priority, ScheduledEntry, SimTime};
use crate::event::Event;

/// Min-heap of scheduled entries plus the virtual clock they advance.
pub(crate) struct EventHeap {
    now: SimTime,
    heap: BinaryHeap<ScheduledEntry>,
    seq: EventSeq,
}

impl EventHeap {
    pub fn new(initial_time: SimTime) -> Self {
        Self {
            now: initial_time,
            heap: BinaryHeap::new(),
            seq: 0,
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Push an entry at `now + delay`.
    ///
    /// # Panics
    ///
    /// Panics on a negative delay.
    pub fn schedule(&mut self, event: Event, priority: Priority, delay: SimTime) {
        assert!(delay >= 0.0, "negative delay {delay}");
        let time = self.now + delay;
        let seq = self.seq;
        self.seq += 1;
        trace!(time, ?priority, seq, "schedule");
        self.heap.push(ScheduledEntry {
            time,
            priority,
            seq,
            event,
        });
    }

    /// Time of the next entry, or infinity when the heap is empty.
    pub fn peek(&self) -> SimTime {
        self.heap.peek().map_or(f64::INFINITY, |entry| entry.time)
    }

    /// Pop the smallest entry and advance the clock to its time.
    pub fn tick(&mut self) -> Option<ScheduledEntry> {
        let entry = self.heap.pop()?;
        assert!(
            entry.time >= self.now,
            "time monotonicity violated: {} < {}",
            entry.time,
            self.now
        );
        self.now = entry.time;
        Some(entry)
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}
