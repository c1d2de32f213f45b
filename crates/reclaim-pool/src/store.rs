//! Keyed idle store: one FIFO queue of idle instances per prototype.
//!
//! The oldest despawned instance is reused first so wear is spread over the
//! whole queue instead of concentrating on the most recently freed instance.
//! Looking up a key that has never been queued is not an error; it simply
//! means nothing is idle.

use std::collections::{HashMap, VecDeque};

use crate::key::PrototypeKey;

/// Maps each [`PrototypeKey`] to a FIFO queue of idle items.
#[derive(Debug)]
pub struct IdleStore<T> {
    queues: HashMap<PrototypeKey, VecDeque<T>>,
}

impl<T> IdleStore<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            queues: HashMap::new(),
        }
    }

    /// Push `item` to the back of the queue for `key`.
    ///
    /// Returns `true` if this created the queue (first despawn of `key`).
    pub fn enqueue(&mut self, key: PrototypeKey, item: T) -> bool {
        let mut created = false;
        self.queues
            .entry(key)
            .or_insert_with(|| {
                created = true;
                VecDeque::new()
            })
            .push_back(item);
        created
    }

    /// Pop the oldest idle item for `key`, if any.
    pub fn dequeue(&mut self, key: PrototypeKey) -> Option<T> {
        self.queues.get_mut(&key)?.pop_front()
    }

    /// Number of idle items for `key` (0 for unknown keys).
    pub fn idle_count(&self, key: PrototypeKey) -> usize {
        self.queues.get(&key).map_or(0, VecDeque::len)
    }

    /// Whether a queue exists for `key`, even if it is currently empty.
    pub fn contains_key(&self, key: PrototypeKey) -> bool {
        self.queues.contains_key(&key)
    }

    /// Idle items across all keys.
    pub fn total_idle(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    /// All keys that have a queue.
    pub fn keys(&self) -> impl Iterator<Item = PrototypeKey> + '_ {
        self.queues.keys().copied()
    }

    /// Drop every queue and its items.
    pub fn clear(&mut self) {
        self.queues.clear();
    }
}

impl<T> Default for IdleStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
