//! Date-ordered queue of pending timers.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// Handle used to cancel a scheduled entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TimerId(u64);

#[derive(Debug)]
struct Scheduled<T> {
    date: f64,
    id: u64,
    payload: T,
}

impl<T> PartialEq for Scheduled<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Scheduled<T> {}

impl<T> Ord for Scheduled<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Earliest date first, then scheduling order; reversed for the max-heap.
        self.date
            .total_cmp(&other.date)
            .then(self.id.cmp(&other.id))
            .reverse()
    }
}

impl<T> PartialOrd for Scheduled<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of dated payloads with O(1) cancellation.
///
/// Canceled entries stay in the heap and are skipped when they surface.
#[derive(Debug)]
pub(crate) struct EventQueue<T> {
    heap: BinaryHeap<Scheduled<T>>,
    live: HashSet<u64>,
    next_id: u64,
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: HashSet::new(),
            next_id: 0,
        }
    }
}

impl<T> EventQueue<T> {
    pub fn schedule(&mut self, date: f64, payload: T) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.live.insert(id);
        self.heap.push(Scheduled { date, id, payload });
        TimerId(id)
    }

    /// Returns false if the entry already fired or was canceled.
    pub fn cancel(&mut self, timer: TimerId) -> bool {
        self.live.remove(&timer.0)
    }

    fn discard_canceled(&mut self) {
        while let Some(top) = self.heap.peek() {
            if self.live.contains(&top.id) {
                break;
            }
            self.heap.pop();
        }
    }

    /// Date of the earliest live entry.
    pub fn next_date(&mut self) -> Option<f64> {
        self.discard_canceled();
        self.heap.peek().map(|entry| entry.date)
    }

    /// Removes the earliest entry if it is due at `now`.
    pub fn pop_due(&mut self, now: f64) -> Option<T> {
        let date = self.next_date()?;
        if date > now {
            return None;
        }
        let entry = self.heap.pop()?;
        self.live.remove(&entry.id);
        Some(entry.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pops_in_date_then_insertion_order() {
        let mut queue = EventQueue::default();
        queue.schedule(2.0, "late");
        queue.schedule(1.0, "first");
        queue.schedule(1.0, "second");

        assert_eq!(queue.pop_due(5.0), Some("first"));
        assert_eq!(queue.pop_due(5.0), Some("second"));
        assert_eq!(queue.pop_due(5.0), Some("late"));
        assert_eq!(queue.pop_due(5.0), None);
    }

    #[test]
    fn test_entries_in_the_future_stay_queued() {
        let mut queue = EventQueue::default();
        queue.schedule(3.0, ());
        assert_eq!(queue.pop_due(2.9), None);
        assert_eq!(queue.next_date(), Some(3.0));
    }

    #[test]
    fn test_canceled_entries_are_skipped() {
        let mut queue = EventQueue::default();
        let canceled = queue.schedule(1.0, "canceled");
        queue.schedule(2.0, "kept");

        assert!(queue.cancel(canceled));
        assert!(!queue.cancel(canceled));
        assert_eq!(queue.next_date(), Some(2.0));
        assert_eq!(queue.pop_due(2.0), Some("kept"));
        assert_eq!(queue.next_date(), None);
    }

    #[test]
    fn test_cancel_after_firing_is_a_no_op() {
        let mut queue = EventQueue::default();
        let fired = queue.schedule(0.0, ());
        assert_eq!(queue.pop_due(0.0), Some(()));
        assert!(!queue.cancel(fired));
        assert_eq!(queue.next_date(), None);
    }
}
