use std::cmp::Ordering;
use std::time::Instant;

/// An entry in the reactor deadline queue.
///
/// `TimerEntry` represents a scheduled expiry of a timer slot at a
/// specific deadline. Entries are stored inside a binary heap ordered by
/// deadline.
///
/// Re-arming or disarming a timer bumps the slot generation instead of
/// searching the heap; entries whose generation no longer matches are
/// discarded when popped.
pub(crate) struct TimerEntry {
    /// The time at which the timer should fire.
    pub(crate) deadline: Instant,

    /// Slab index of the timer slot.
    pub(crate) slot: usize,

    /// Slot generation at the time the entry was pushed.
    pub(crate) generation: u64,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline.eq(&other.deadline)
    }
}

impl Ord for TimerEntry {
    /// Orders timer entries by deadline.
    ///
    /// Note that the comparison is **reversed** so that a
    /// `BinaryHeap<TimerEntry>` behaves as a min-heap,
    /// where the earliest deadline is popped first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.deadline.cmp(&self.deadline)
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
