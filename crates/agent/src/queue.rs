//! The message queue (§4.6): a bounded, two-lane FIFO an agent drains only
//! when it returns to `idle`.
//!
//! No direct teacher analog; built fresh as two `VecDeque`s behind a
//! `parking_lot::Mutex`, plus an `AtomicBool` draining guard in the same
//! style as [`lace_domain::cancel::CancelToken`] (an `Arc<AtomicBool>`
//! with acquire/release ordering) for the reentrancy rule.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    User,
    Tool,
    System,
}

#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub id: String,
    pub content: String,
    pub source: Source,
    pub priority: Priority,
    pub enqueued_at: Instant,
}

#[derive(Debug, Clone, Copy)]
pub struct QueueStats {
    pub queue_length: usize,
    pub high_priority_count: usize,
    pub oldest_age_ms: Option<u64>,
}

/// Bounded two-lane queue: all `high` entries are dequeued before any
/// `normal` one, FIFO within each lane. `max_length` bounds the combined
/// length of both lanes.
pub struct MessageQueue {
    high: Mutex<VecDeque<QueueEntry>>,
    normal: Mutex<VecDeque<QueueEntry>>,
    max_length: usize,
    draining: Arc<AtomicBool>,
}

impl MessageQueue {
    pub fn new(max_length: usize) -> Self {
        Self {
            high: Mutex::new(VecDeque::new()),
            normal: Mutex::new(VecDeque::new()),
            max_length,
            draining: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Add an entry to the appropriate lane. Returns `false` (and drops
    /// the entry) if the queue is already at `max_length`.
    pub fn enqueue(&self, entry: QueueEntry) -> bool {
        if self.len() >= self.max_length {
            return false;
        }
        match entry.priority {
            Priority::High => self.high.lock().push_back(entry),
            Priority::Normal => self.normal.lock().push_back(entry),
        }
        true
    }

    pub fn len(&self) -> usize {
        self.high.lock().len() + self.normal.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> QueueStats {
        let high = self.high.lock();
        let normal = self.normal.lock();
        let oldest = high
            .front()
            .into_iter()
            .chain(normal.front())
            .map(|e| e.enqueued_at)
            .min();
        QueueStats {
            queue_length: high.len() + normal.len(),
            high_priority_count: high.len(),
            oldest_age_ms: oldest.map(|t| t.elapsed().as_millis() as u64),
        }
    }

    /// Pop the next entry, high-priority lane first. Used directly by
    /// callers that drive the queue from an async loop (one turn per
    /// popped entry) rather than through a synchronous [`Self::drain_with`]
    /// handler.
    pub fn try_pop(&self) -> Option<QueueEntry> {
        if let Some(entry) = self.high.lock().pop_front() {
            return Some(entry);
        }
        self.normal.lock().pop_front()
    }

    /// Drain the queue, handing each entry in order to `handler`. A no-op
    /// if another drain is already in progress (reentrancy guard) —
    /// entries enqueued during a drain are picked up by that same drain,
    /// never by a concurrently triggered second one.
    pub fn drain_with(&self, mut handler: impl FnMut(QueueEntry)) {
        if self
            .draining
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        while let Some(entry) = self.try_pop() {
            handler(entry);
        }
        self.draining.store(false, Ordering::Release);
    }
}
