use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;

use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ExpiryItem<K> {
    at: Instant,
    key: K,
}

/// Index of `(key, expiry)` pairs ordered by expiry.
///
/// Rescheduling a key leaves its old heap item in place; stale items are skipped
/// when they surface, so updates stay `O(log n)` without a decrease-key.
#[derive(Debug)]
pub struct ExpiryIndex<K> {
    current: HashMap<K, Instant>,
    heap: BinaryHeap<Reverse<ExpiryItem<K>>>,
}

impl<K> Default for ExpiryIndex<K>
where
    K: Clone + Eq + Hash + Ord,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> ExpiryIndex<K>
where
    K: Clone + Eq + Hash + Ord,
{
    pub fn new() -> Self {
        Self {
            current: HashMap::new(),
            heap: BinaryHeap::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.current.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// Set (or move) the expiry of `key`.
    pub fn schedule(&mut self, key: K, at: Instant) {
        if self.current.get(&key) == Some(&at) {
            return;
        }
        self.current.insert(key.clone(), at);
        self.heap.push(Reverse(ExpiryItem { at, key }));
    }

    pub fn remove(&mut self, key: &K) -> Option<Instant> {
        self.current.remove(key)
    }

    pub fn expiry_of(&self, key: &K) -> Option<Instant> {
        self.current.get(key).copied()
    }

    pub fn next_expiry(&mut self) -> Option<Instant> {
        while let Some(Reverse(item)) = self.heap.peek() {
            if self.current.get(&item.key) == Some(&item.at) {
                return Some(item.at);
            }
            // Stale: key removed or rescheduled.
            let _ = self.heap.pop();
        }
        None
    }

    /// Remove and return every key whose expiry is at or before `now`, earliest first.
    pub fn drain_due(&mut self, now: Instant) -> Vec<K> {
        let mut due = Vec::new();
        while let Some(Reverse(item)) = self.heap.peek() {
            if item.at > now {
                break;
            }
            let Some(Reverse(item)) = self.heap.pop() else {
                break;
            };
            if self.current.get(&item.key) != Some(&item.at) {
                continue;
            }
            self.current.remove(&item.key);
            due.push(item.key);
        }
        due
    }
}
