//! Message idempotency guard: drops duplicate deliveries.
//!
//! The network may deliver the same message more than once. Every inbound
//! message is keyed by its [`MessageId`](p2pdex_types::MessageId); a key that
//! has been seen before is a duplicate and must not be applied again.
//!
//! The guard maintains an LRU-style bounded cache so memory usage stays
//! predictable in long-running nodes.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

/// Remembers the most recent `max_size` keys.
///
/// When the set reaches `max_size`, the oldest entry is evicted to make room.
#[derive(Debug)]
pub struct IdempotencyGuard<K> {
    /// Keys already applied.
    seen: HashSet<K>,
    /// Insertion order for LRU eviction (front = oldest).
    order: VecDeque<K>,
    /// Maximum number of entries before eviction kicks in.
    max_size: usize,
}

impl<K: Eq + Hash + Copy> IdempotencyGuard<K> {
    /// Create a new guard with the given maximum cache size.
    ///
    /// # Panics
    /// Panics if `max_size` is zero.
    pub fn new(max_size: usize) -> Self {
        assert!(max_size > 0, "IdempotencyGuard max_size must be > 0");
        Self {
            seen: HashSet::with_capacity(max_size.min(4_096)),
            order: VecDeque::with_capacity(max_size.min(4_096)),
            max_size,
        }
    }

    /// Record `key`. Returns `false` if it was already present (duplicate).
    pub fn insert(&mut self, key: K) -> bool {
        if self.seen.contains(&key) {
            return false;
        }

        if self.seen.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }

        self.seen.insert(key);
        self.order.push_back(key);
        true
    }

    /// Forget `key` so a later redelivery is processed again.
    pub fn forget(&mut self, key: &K) {
        if self.seen.remove(key) {
            self.order.retain(|k| k != key);
        }
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.seen.contains(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
