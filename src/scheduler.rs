use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// One-shot deferred actions on a virtual millisecond clock.
///
/// Determinism rule: due entries fire earliest-deadline first, and entries
/// sharing a deadline fire in registration order. A delay is a lower bound
/// only; nothing fires before `now` reaches its deadline.
#[derive(Debug)]
pub struct Scheduler<A> {
    now_ms: u64,
    next_seq: u64,
    queue: BinaryHeap<Reverse<(u64, u64)>>,
    actions: HashMap<u64, A>,
}

impl<A> Default for Scheduler<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Scheduler<A> {
    pub fn new() -> Self {
        Self {
            now_ms: 0,
            next_seq: 0,
            queue: BinaryHeap::new(),
            actions: HashMap::new(),
        }
    }

    pub fn now(&self) -> u64 {
        self.now_ms
    }

    /// Register `action` to run no earlier than `delay_ms` from now.
    /// Negative delays clamp to zero.
    pub fn schedule(&mut self, action: A, delay_ms: i64) {
        let delay = u64::try_from(delay_ms).unwrap_or(0);
        let due = self.now_ms.saturating_add(delay);
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.queue.push(Reverse((due, seq)));
        self.actions.insert(seq, action);
    }

    /// Drop every pending registration without running it.
    pub fn cancel_all(&mut self) -> usize {
        let dropped = self.actions.len();
        self.queue.clear();
        self.actions.clear();
        dropped
    }

    pub fn pending(&self) -> usize {
        self.actions.len()
    }

    pub fn next_due(&self) -> Option<u64> {
        self.queue.peek().map(|Reverse((due, _))| *due)
    }

    /// Pop the next action due at or before `horizon_ms`, moving the clock to
    /// its deadline.
    pub fn pop_due(&mut self, horizon_ms: u64) -> Option<A> {
        let &Reverse((due, seq)) = self.queue.peek()?;
        if due > horizon_ms {
            return None;
        }
        self.queue.pop();
        self.now_ms = self.now_ms.max(due);
        self.actions.remove(&seq)
    }

    /// Move the clock forward; it never runs backwards.
    pub fn advance_clock(&mut self, now_ms: u64) {
        self.now_ms = self.now_ms.max(now_ms);
    }
}
