use lru::LruCache;

use super::BufferId;

/// Recency order of the resident buffers; the front is the most recently used.
///
/// Every operation is O(1).
pub struct LruQueue {
    order: LruCache<BufferId, ()>,
}

impl LruQueue {
    pub fn new() -> Self {
        Self {
            order: LruCache::unbounded(),
        }
    }

    /// Add a buffer as the most recently used one
    pub fn insert_to_front(&mut self, buffer: BufferId) {
        self.order.push(buffer, ());
    }

    /// Mark an already queued buffer as the most recently used one
    pub fn push_to_front(&mut self, buffer: BufferId) {
        self.order.promote(&buffer);
    }

    /// The least recently used buffer, without removing it
    pub fn peek_last(&self) -> Option<BufferId> {
        self.order.peek_lru().map(|(&buffer, _)| buffer)
    }

    /// Drop a buffer from the queue; false if it was not queued
    pub fn remove(&mut self, buffer: BufferId) -> bool {
        self.order.pop(&buffer).is_some()
    }

    /// Queued buffers from most to least recently used
    pub fn iter(&self) -> impl Iterator<Item = BufferId> + '_ {
        self.order.iter().map(|(&buffer, _)| buffer)
    }

    /// Queued buffers from least to most recently used
    pub fn iter_lru_first(&self) -> impl Iterator<Item = BufferId> + '_ {
        self.order.iter().rev().map(|(&buffer, _)| buffer)
    }
}

impl Default for LruQueue {
    fn default() -> Self {
        Self::new()
    }
}
