//! Float-keyed min-queue for the pathfinder open set.
//!
//! `priority_queue::PriorityQueue` is a max-queue over `Ord` priorities, so
//! entries are stored as `Reverse<R64>`; `noisy_float` rejects NaN at the
//! boundary instead of letting it poison the heap order.

use std::cmp::Reverse;
use std::hash::Hash;

use noisy_float::types::{r64, R64};
use priority_queue::PriorityQueue;

/// Min-queue keyed by `f64` priority with membership queries and removal.
///
/// Determinism comes from the caller enqueuing in a deterministic order;
/// no stable tie-breaking is promised beyond that.
#[derive(Clone, Debug, Default)]
pub struct OpenQueue<K: Hash + Eq> {
    heap: PriorityQueue<K, Reverse<R64>>,
}

impl<K: Hash + Eq> OpenQueue<K> {
    pub fn new() -> Self {
        Self {
            heap: PriorityQueue::new(),
        }
    }

    /// Insert `key` with `priority`, replacing any existing priority.
    pub fn enqueue(&mut self, key: K, priority: f64) {
        self.heap.push(key, Reverse(r64(priority)));
    }

    /// Pop the entry with the smallest priority.
    pub fn dequeue(&mut self) -> Option<(K, f64)> {
        self.heap.pop().map(|(k, Reverse(p))| (k, p.raw()))
    }

    pub fn contains(&self, key: &K) -> bool {
        self.heap.get(key).is_some()
    }

    /// Remove `key` if present; returns its priority.
    pub fn remove(&mut self, key: &K) -> Option<f64> {
        self.heap.remove(key).map(|(_, Reverse(p))| p.raw())
    }

    /// Change the priority of an existing entry (no-op when absent).
    pub fn update(&mut self, key: &K, priority: f64) {
        self.heap.change_priority(key, Reverse(r64(priority)));
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dequeues_in_priority_order() {
        let mut q = OpenQueue::new();
        q.enqueue("b", 2.0);
        q.enqueue("a", 1.0);
        q.enqueue("c", 3.5);
        assert_eq!(q.dequeue(), Some(("a", 1.0)));
        assert_eq!(q.dequeue(), Some(("b", 2.0)));
        assert_eq!(q.dequeue(), Some(("c", 3.5)));
        assert!(q.dequeue().is_none());
    }

    #[test]
    fn remove_and_update() {
        let mut q = OpenQueue::new();
        q.enqueue(1u32, 5.0);
        q.enqueue(2u32, 1.0);
        assert!(q.contains(&1));
        assert_eq!(q.remove(&2), Some(1.0));
        assert!(!q.contains(&2));
        q.update(&1, 0.5);
        assert_eq!(q.dequeue(), Some((1, 0.5)));
        assert!(q.is_empty());
    }
}
