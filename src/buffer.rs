// MIT License - Copyright (c) 2026 Peter Wright
// Fixed-capacity event history

use std::collections::VecDeque;
use std::fmt;

/// Callback receiving items dropped from a full [`EvictingBuffer`].
pub type EvictionCallback<T> = Box<dyn FnMut(T) + Send + Sync>;

/// A fixed-capacity FIFO that evicts its oldest item instead of growing.
///
/// Used to keep the last N event strings per partition.
pub struct EvictingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
    on_evict: EvictionCallback<T>,
}

impl<T: fmt::Debug> EvictingBuffer<T> {
    /// Create a buffer that logs evicted items at debug level.
    pub fn new(capacity: usize) -> Self {
        Self::with_callback(
            capacity,
            Box::new(|item: T| tracing::debug!("Evicting item {:?}", item)),
        )
    }
}

impl<T> EvictingBuffer<T> {
    /// Create a buffer with a custom eviction callback. A capacity of zero is
    /// raised to one.
    pub fn with_callback(capacity: usize, on_evict: EvictionCallback<T>) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            on_evict,
        }
    }

    /// Append an item, evicting the oldest one first when full.
    pub fn push(&mut self, item: T) {
        if self.items.len() >= self.capacity {
            if let Some(oldest) = self.items.pop_front() {
                (self.on_evict)(oldest);
            }
        }
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T: Clone> EvictingBuffer<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

impl<T: fmt::Debug> fmt::Debug for EvictingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvictingBuffer")
            .field("capacity", &self.capacity)
            .field("items", &self.items)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording(capacity: usize) -> (EvictingBuffer<u32>, Arc<Mutex<Vec<u32>>>) {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let sink = evicted.clone();
        let buffer = EvictingBuffer::with_callback(
            capacity,
            Box::new(move |item| sink.lock().unwrap().push(item)),
        );
        (buffer, evicted)
    }

    #[test]
    fn test_push_within_capacity() {
        let (mut buffer, evicted) = recording(3);
        buffer.push(1);
        buffer.push(2);
        assert_eq!(buffer.len(), 2);
        assert!(evicted.lock().unwrap().is_empty());
    }

    #[test]
    fn test_evicts_oldest_exactly_once() {
        let (mut buffer, evicted) = recording(3);
        for i in 1..=4 {
            buffer.push(i);
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.to_vec(), vec![2, 3, 4]);
        assert_eq!(*evicted.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_never_grows_past_capacity() {
        let (mut buffer, evicted) = recording(2);
        for i in 0..10 {
            buffer.push(i);
            assert!(buffer.len() <= 2);
        }
        assert_eq!(*evicted.lock().unwrap(), (0..8).collect::<Vec<_>>());
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec![8, 9]);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let mut buffer: EvictingBuffer<&str> = EvictingBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
        buffer.push("a");
        buffer.push("b");
        assert_eq!(buffer.to_vec(), vec!["b"]);
        assert!(!buffer.is_empty());
    }
}
