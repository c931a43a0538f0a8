//! Fixed-capacity history of recent packets
//!
//! [`HistoryBuffer`] is a circular buffer where `get(0)` is always the newest
//! entry. Inserting at capacity evicts the oldest entry in O(1).

use std::collections::HashMap;

/// Default number of entries kept per packet.
pub const DEFAULT_HISTORY_CAPACITY: usize = 600;

#[derive(Debug, Clone)]
pub struct HistoryBuffer<T> {
    slots: Vec<Option<T>>,
    /// Index of the oldest entry.
    start: usize,
    len: usize,
}

impl<T> HistoryBuffer<T> {
    /// A buffer holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots, start: 0, len: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert as the newest entry, returning the evicted oldest entry if the
    /// buffer was full.
    pub fn insert(&mut self, item: T) -> Option<T> {
        let capacity = self.capacity();
        if self.len == capacity {
            let evicted = self.slots[self.start].replace(item);
            self.start = (self.start + 1) % capacity;
            evicted
        } else {
            let end = (self.start + self.len) % capacity;
            self.slots[end] = Some(item);
            self.len += 1;
            None
        }
    }

    /// The `n`-th entry counting back from the newest.
    pub fn get(&self, n: usize) -> Option<&T> {
        if n >= self.len {
            return None;
        }
        let index = (self.start + self.len - 1 - n) % self.capacity();
        self.slots[index].as_ref()
    }

    pub fn latest(&self) -> Option<&T> {
        self.get(0)
    }

    /// Remove and return the oldest entry.
    pub fn remove_oldest(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let item = self.slots[self.start].take();
        self.start = (self.start + 1) % self.capacity();
        self.len -= 1;
        item
    }

    /// Drop every entry, keeping the capacity.
    pub fn flush(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.start = 0;
        self.len = 0;
    }

    /// Entries from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).filter_map(move |n| self.get(n))
    }
}

impl<T> Default for HistoryBuffer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

/// One [`HistoryBuffer`] per packet name, created on first insert.
#[derive(Debug, Clone)]
pub struct HistoryBuffers<T> {
    buffers: HashMap<String, HistoryBuffer<T>>,
    capacity: usize,
}

impl<T> HistoryBuffers<T> {
    pub fn new(capacity: usize) -> Self {
        Self { buffers: HashMap::new(), capacity }
    }

    /// Create a buffer for `name` with its own capacity. Returns `false` if
    /// one already exists.
    pub fn create(&mut self, name: &str, capacity: usize) -> bool {
        if self.buffers.contains_key(name) {
            return false;
        }
        self.buffers.insert(name.to_string(), HistoryBuffer::new(capacity));
        true
    }

    pub fn insert(&mut self, name: &str, item: T) -> Option<T> {
        if let Some(buffer) = self.buffers.get_mut(name) {
            return buffer.insert(item);
        }
        let mut buffer = HistoryBuffer::new(self.capacity);
        buffer.insert(item);
        self.buffers.insert(name.to_string(), buffer);
        None
    }

    pub fn get(&self, name: &str) -> Option<&HistoryBuffer<T>> {
        self.buffers.get(name)
    }

    /// The `n`-th most recent entry for `name`.
    pub fn nth(&self, name: &str, n: usize) -> Option<&T> {
        self.buffers.get(name)?.get(n)
    }

    pub fn flush(&mut self) {
        self.buffers.values_mut().for_each(HistoryBuffer::flush);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.buffers.keys().map(String::as_str)
    }
}

impl<T> Default for HistoryBuffers<T> {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn newest_first_with_eviction() {
        let mut buffer = HistoryBuffer::new(3);
        for item in ["A", "B", "C"] {
            assert_eq!(buffer.insert(item), None);
        }
        assert_eq!(buffer.insert("D"), Some("A"));

        assert_eq!(buffer.get(0), Some(&"D"));
        assert_eq!(buffer.get(1), Some(&"C"));
        assert_eq!(buffer.get(2), Some(&"B"));
        assert_eq!(buffer.get(3), None);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec!["D", "C", "B"]);
    }

    #[test]
    fn flush_and_remove_oldest() {
        let mut buffer = HistoryBuffer::new(2);
        buffer.insert(1);
        buffer.insert(2);
        assert_eq!(buffer.remove_oldest(), Some(1));
        assert_eq!(buffer.latest(), Some(&2));
        buffer.flush();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 2);
        assert_eq!(buffer.get(0), None);
        buffer.insert(3);
        assert_eq!(buffer.latest(), Some(&3));
    }

    #[test]
    fn default_capacity() {
        assert_eq!(HistoryBuffer::<u8>::default().capacity(), 600);
        assert_eq!(HistoryBuffer::<u8>::new(0).capacity(), 1);
    }

    #[test]
    fn per_packet_buffers() {
        let mut buffers = HistoryBuffers::new(2);
        assert!(buffers.create("HS", 5));
        assert!(!buffers.create("HS", 1));
        for i in 0..4 {
            buffers.insert("HS", i);
            buffers.insert("EPS", i);
        }
        assert_eq!(buffers.get("HS").map(HistoryBuffer::len), Some(4));
        assert_eq!(buffers.get("EPS").map(HistoryBuffer::len), Some(2));
        assert_eq!(buffers.nth("EPS", 1), Some(&2));
        assert_eq!(buffers.nth("NOPE", 0), None);
    }

    proptest! {
        #[test]
        fn prop_matches_tail_of_inserted_sequence(
            capacity in 1usize..32,
            items in prop::collection::vec(any::<u32>(), 0..100)
        ) {
            let mut buffer = HistoryBuffer::new(capacity);
            for item in &items {
                buffer.insert(*item);
            }
            let expected: Vec<u32> = items.iter().rev().take(capacity).copied().collect();
            prop_assert_eq!(buffer.len(), expected.len());
            for (n, item) in expected.iter().enumerate() {
                prop_assert_eq!(buffer.get(n), Some(item));
            }
            prop_assert_eq!(buffer.get(expected.len()), None);
        }
    }
}
