//! Dedup task queue
//!
//! The base primitive for all cross-thread signaling in the engine: a
//! set-backed FIFO queue that holds at most one pending entry per key.
//! Re-pushing a key that is already pending is a silent no-op, which keeps
//! queue growth bounded no matter how many duplicate signals producers emit.
//!
//! Ordering is insertion order across keys; there is no priority. The queue
//! itself never blocks — consumers that need a blocking wait pair it with a
//! [`tokio::sync::Notify`] at the call site, the way the per-context workers
//! do.

use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

struct Inner<K, V> {
    fifo: VecDeque<(K, V)>,
    pending: HashSet<K>,
}

/// A FIFO queue guaranteeing at most one pending entry per key
///
/// Thread-safe for many producers and any number of consumers.
pub struct DedupQueue<K, V> {
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> DedupQueue<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                fifo: VecDeque::new(),
                pending: HashSet::new(),
            }),
        }
    }

    /// Insert an entry unless the key is already pending
    ///
    /// Returns whether the entry was inserted. A `false` return means an
    /// entry with the same key is still waiting to be popped; the value
    /// passed here is dropped.
    pub fn push(&self, key: K, value: V) -> bool {
        let mut inner = self.inner.lock();
        if inner.pending.contains(&key) {
            return false;
        }
        inner.pending.insert(key.clone());
        inner.fifo.push_back((key, value));
        true
    }

    /// Remove and return the oldest pending entry, if any
    pub fn try_pop(&self) -> Option<(K, V)> {
        let mut inner = self.inner.lock();
        let (key, value) = inner.fifo.pop_front()?;
        inner.pending.remove(&key);
        Some((key, value))
    }

    /// Whether an entry with this key is pending
    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().pending.contains(key)
    }

    /// Number of pending entries
    pub fn len(&self) -> usize {
        self.inner.lock().fifo.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.inner.lock().fifo.is_empty()
    }
}

impl<K, V> Default for DedupQueue<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
