use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::queue::SegQueue;

use super::message::Message;

/// Process-wide FIFO store shared by every session.
///
/// `push` and `pop` are linearizable: every pop observes a single global push
/// order no matter how many tasks or worker threads call in concurrently.
pub struct MessageQueue {
    queue: SegQueue<Message>,
    stats: QueueStats,
}

#[derive(Debug, Default)]
pub struct QueueStats {
    pushed_total: AtomicU64,
    popped_total: AtomicU64,
    empty_pops: AtomicU64,
}

impl QueueStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pushed_total(&self) -> u64 {
        self.pushed_total.load(Ordering::SeqCst)
    }

    pub fn popped_total(&self) -> u64 {
        self.popped_total.load(Ordering::SeqCst)
    }

    /// Number of pops that found the queue empty.
    pub fn empty_pops(&self) -> u64 {
        self.empty_pops.load(Ordering::SeqCst)
    }
}

impl MessageQueue {
    pub fn new() -> Self {
        Self {
            queue: SegQueue::new(),
            stats: QueueStats::new(),
        }
    }

    /// Appends `message` at the tail.
    pub fn push(&self, message: Message) {
        self.queue.push(message);
        self.stats.pushed_total.fetch_add(1, Ordering::SeqCst);
    }

    /// Removes and returns the head, or `None` when the queue is empty.
    /// Never waits for a producer.
    pub fn pop(&self) -> Option<Message> {
        match self.queue.pop() {
            Some(message) => {
                self.stats.popped_total.fetch_add(1, Ordering::SeqCst);
                Some(message)
            }
            None => {
                self.stats.empty_pops.fetch_add(1, Ordering::SeqCst);
                None
            }
        }
    }

    /// Snapshot of the current depth; may be stale by the time it is read.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}
