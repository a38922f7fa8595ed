//! Scheduling types: virtual time, priorities and heap entries.

use std::cmp::Ordering;

use crate::event::Event;

/// Virtual simulation time.
///
/// Continuous time is supported, so this is a plain `f64`. Ordering inside
/// the heap uses `total_cmp`, which gives a total order even in the
/// presence of NaN inputs.
pub type SimTime = f64;

/// Monotonically increasing insertion sequence number.
///
/// The final tiebreaker of the heap order: two entries with equal time and
/// priority fire in the order they were scheduled.
pub type EventSeq = u64;

/// Scheduling priority. Smaller values are more urgent.
///
/// `Urgent` is reserved for process initialization, interrupts and the
/// internal stop event of a bounded run; ordinary events schedule `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Fires before all `Normal` entries at the same time.
    Urgent = 0,
    /// Default priority for every ordinary event.
    Normal = 1,
}

/// One entry of the scheduler heap.
///
/// Entries order lexicographically by `(time, priority, seq)`; within an
/// equal `(time, priority)` pair the insertion sequence gives FIFO
/// semantics.
pub(crate) struct ScheduledEntry {
    /// When the event fires.
    pub time: SimTime,
    /// Tie-break level within one instant.
    pub priority: Priority,
    /// Insertion sequence, unique per environment.
    pub seq: EventSeq,
    /// The event to process.
    pub event: Event,
}

impl PartialEq for ScheduledEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for ScheduledEntry {}

impl PartialOrd for ScheduledEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed comparisons: BinaryHeap is a max-heap, the earliest
        // entry must compare greatest.
        match other.time.total_cmp(&self.time) {
            Ordering::Equal => match other.priority.cmp(&self.priority) {
                Ordering::Equal => other.seq.cmp(&self.seq),
                ord => ord,
            },
            ord => ord,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::Environment;

    fn entry(env: &Environment, time: SimTime, priority: Priority, seq: EventSeq) -> ScheduledEntry {
        ScheduledEntry {
            time,
            priority,
            seq,
            event: env.event(),
        }
    }

    #[test]
    fn test_entry_ordering_by_time() {
        let env = Environment::new();
        let e1 = entry(&env, 1.0, Priority::Normal, 1);
        let e2 = entry(&env, 2.0, Priority::Normal, 2);

        // Earlier time compares greater (min-heap through a max-heap).
        assert!(e1 > e2);
    }

    #[test]
    fn test_entry_ordering_by_priority() {
        let env = Environment::new();
        let e1 = entry(&env, 1.0, Priority::Urgent, 2);
        let e2 = entry(&env, 1.0, Priority::Normal, 1);

        // Same time: urgent beats normal regardless of sequence.
        assert!(e1 > e2);
    }

    #[test]
    fn test_entry_ordering_by_seq() {
        let env = Environment::new();
        let e1 = entry(&env, 1.0, Priority::Normal, 1);
        let e2 = entry(&env, 1.0, Priority::Normal, 2);

        // Same time and priority: earlier insertion fires first.
        assert!(e1 > e2);
    }
}
