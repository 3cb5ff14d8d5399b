//! Event bus with ordering guarantees.
//!
//! Earliest timestamp first. At equal timestamps timer fires are delivered
//! before participant input, then insertion order breaks ties.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::events::{Event, SysEvent, Timestamp, TimerToken};

/// Wrapper for priority queue ordering (earliest first)
struct TimedEvent {
    ts: Timestamp,
    rank: u8,
    seq: u64,
    event: Event,
}

fn rank(event: &Event) -> u8 {
    match event {
        Event::Sys(_) => 0,
        Event::Input(_) => 1,
    }
}

impl PartialEq for TimedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TimedEvent {}

impl PartialOrd for TimedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest first)
        other
            .ts
            .total_cmp(&self.ts)
            .then_with(|| other.rank.cmp(&self.rank))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Event bus with deterministic ordering
pub struct EventBus {
    queue: BinaryHeap<TimedEvent>,
    seq_counter: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            queue: BinaryHeap::new(),
            seq_counter: 0,
        }
    }

    /// Push an event onto the bus
    pub fn push(&mut self, event: Event) {
        let ts = event.timestamp();
        self.seq_counter += 1;
        self.queue.push(TimedEvent {
            ts,
            rank: rank(&event),
            seq: self.seq_counter,
            event,
        });
    }

    /// Pop the earliest event
    pub fn pop(&mut self) -> Option<Event> {
        self.queue.pop().map(|te| te.event)
    }

    /// Peek at the earliest event
    pub fn peek(&self) -> Option<&Event> {
        self.queue.peek().map(|te| &te.event)
    }

    /// Remove a scheduled gate fire. Returns true if one was pending.
    pub fn cancel_gate(&mut self, token: TimerToken) -> bool {
        let before = self.queue.len();
        self.queue.retain(|te| {
            !matches!(te.event, Event::Sys(SysEvent::GateOpen { token: t, .. }) if t == token)
        });
        self.queue.len() != before
    }

    /// Number of pending events
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
