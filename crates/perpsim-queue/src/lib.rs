//! perpsim-queue
//!
//! The time-ordered event scheduler at the center of the backtest: a binary
//! min-heap keyed by `(timestamp, sequence)`. Every event that will ever be
//! processed — market data, strategy-generated fills, funding ticks — goes
//! through this queue, which is what makes a run deterministic: two events
//! at the same timestamp always pop in the order they were pushed, never in
//! hash-map or thread-scheduling order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use perpsim_types::Event;

/// Wraps an [`Event`] so `BinaryHeap` (a max-heap) can be driven as a
/// min-heap over `(timestamp, sequence)` without allocating a `Reverse` for
/// every comparison — we invert the `Ord` impl directly instead.
#[derive(Debug, Clone, PartialEq, Eq)]
struct QueuedEvent(Event);

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap pops the greatest element, and we want the
        // smallest (timestamp, sequence) pair out first.
        (other.0.timestamp, other.0.sequence).cmp(&(self.0.timestamp, self.0.sequence))
    }
}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The time-ordered event queue (§4.A). Holds every pending event and
/// assigns each one a strictly-increasing `sequence` number at push time,
/// overwriting whatever the caller set — callers never need to coordinate
/// sequence numbers with each other, which is what lets market-data events,
/// strategy-generated fills, and funding ticks all be pushed from different
/// call sites without a shared counter.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<QueuedEvent>,
    next_sequence: u64,
    total_popped: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        EventQueue {
            heap: BinaryHeap::new(),
            next_sequence: 0,
            total_popped: 0,
        }
    }

    /// Like [`new`](Self::new), but pre-sizes the underlying heap to hold
    /// `capacity` events without reallocating — a hint (§6.3
    /// `eventBufferSize`), not a hard cap; the queue still grows past it.
    pub fn with_capacity(capacity: usize) -> Self {
        EventQueue {
            heap: BinaryHeap::with_capacity(capacity),
            next_sequence: 0,
            total_popped: 0,
        }
    }

    /// Pushes a single event, assigning it the next sequence number.
    /// Returns the assigned sequence so callers can correlate it later
    /// (e.g. when re-queuing a fill event that must itself stay ordered
    /// relative to other events scheduled at the same `currentTime`).
    pub fn push(&mut self, mut event: Event) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        event.sequence = sequence;
        self.heap.push(QueuedEvent(event));
        sequence
    }

    /// Pushes every event in `events`, in iteration order, each receiving
    /// the next available sequence number in turn. Equivalent to calling
    /// [`push`](Self::push) in a loop; provided so callers loading an
    /// initial batch from a `DataSource` don't pay per-call overhead.
    pub fn push_batch(&mut self, events: impl IntoIterator<Item = Event>) {
        for event in events {
            self.push(event);
        }
    }

    /// Removes and returns the event with the smallest `(timestamp,
    /// sequence)` pair, or `None` if the queue is empty.
    pub fn pop(&mut self) -> Option<Event> {
        let popped = self.heap.pop().map(|q| q.0);
        if popped.is_some() {
            self.total_popped += 1;
        }
        popped
    }

    /// Returns a reference to the next event to be popped, without removing
    /// it.
    pub fn peek(&self) -> Option<&Event> {
        self.heap.peek().map(|q| &q.0)
    }

    /// Pops and returns every event whose timestamp is `<= timestamp`, in
    /// `(timestamp, sequence)` order. Used by the backtest driver to drain
    /// every event scheduled for the current tick before advancing time.
    pub fn pop_until(&mut self, timestamp: i64) -> Vec<Event> {
        let mut drained = Vec::new();
        while let Some(event) = self.heap.peek() {
            if event.0.timestamp > timestamp {
                break;
            }
            drained.push(self.pop().expect("peek just confirmed an element"));
        }
        drained
    }

    /// Pops up to `n` events in order. Returns fewer than `n` if the queue
    /// is drained first.
    pub fn pop_batch(&mut self, n: usize) -> Vec<Event> {
        let mut drained = Vec::with_capacity(n.min(self.heap.len()));
        for _ in 0..n {
            match self.pop() {
                Some(event) => drained.push(event),
                None => break,
            }
        }
        drained
    }

    /// Discards every pending event. Does not reset the sequence counter or
    /// `total_popped` — sequence numbers are never reused within a run.
    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Number of events currently pending.
    pub fn size(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Total number of events popped since the queue was created.
    pub fn total_popped(&self) -> u64 {
        self.total_popped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perpsim_types::EventKind;
    use rust_decimal::Decimal;

    fn trade_event(timestamp: i64) -> Event {
        Event::new(
            timestamp,
            "binance",
            "BTC-PERP",
            EventKind::Trade {
                price: Decimal::new(10000, 0),
                qty: Decimal::new(1, 0),
                taker_side: perpsim_types::Side::Buy,
            },
        )
    }

    #[test]
    fn pops_in_timestamp_order_regardless_of_push_order() {
        let mut q = EventQueue::new();
        q.push(trade_event(300));
        q.push(trade_event(100));
        q.push(trade_event(200));

        assert_eq!(q.pop().unwrap().timestamp, 100);
        assert_eq!(q.pop().unwrap().timestamp, 200);
        assert_eq!(q.pop().unwrap().timestamp, 300);
        assert!(q.pop().is_none());
    }

    #[test]
    fn same_timestamp_breaks_tie_by_push_order() {
        let mut q = EventQueue::new();
        q.push(trade_event(100));
        q.push(trade_event(100));
        q.push(trade_event(100));

        let a = q.pop().unwrap();
        let b = q.pop().unwrap();
        let c = q.pop().unwrap();
        assert!(a.sequence < b.sequence);
        assert!(b.sequence < c.sequence);
    }

    #[test]
    fn push_overwrites_caller_supplied_sequence() {
        let mut q = EventQueue::new();
        let mut e = trade_event(100);
        e.sequence = 999;
        let assigned = q.push(e);
        assert_eq!(assigned, 0);
        assert_eq!(q.peek().unwrap().sequence, 0);
    }

    #[test]
    fn pop_until_drains_only_due_events() {
        let mut q = EventQueue::new();
        q.push(trade_event(100));
        q.push(trade_event(150));
        q.push(trade_event(200));

        let due = q.pop_until(150);
        assert_eq!(due.len(), 2);
        assert_eq!(q.size(), 1);
        assert_eq!(q.peek().unwrap().timestamp, 200);
    }

    #[test]
    fn pop_batch_stops_when_queue_drained() {
        let mut q = EventQueue::new();
        q.push(trade_event(1));
        q.push(trade_event(2));

        let drained = q.pop_batch(5);
        assert_eq!(drained.len(), 2);
        assert_eq!(q.total_popped(), 2);
    }

    #[test]
    fn clear_empties_queue_but_keeps_counters() {
        let mut q = EventQueue::new();
        q.push(trade_event(1));
        q.pop();
        q.push(trade_event(2));
        q.clear();

        assert_eq!(q.size(), 0);
        assert_eq!(q.total_popped(), 1);
        let next = q.push(trade_event(3));
        assert_eq!(next, 2);
    }
}
