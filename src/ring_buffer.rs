//! # Ring Buffer
//!
//! A fixed-capacity FIFO of the most recent items.
//! Used by the smoother and the confidence scorer to hold the trailing window
//! of accepted points without reallocating or truncating a list.

/// Fixed-capacity ring buffer. Pushing beyond capacity evicts the oldest item.
///
/// Storage is allocated once; `head` indexes the oldest slot.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    head: usize,
    len: usize,
}

impl<T> RingBuffer<T> {
    /// Create a new buffer holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            head: 0,
            len: 0,
        }
    }

    /// Push an item, returning the evicted oldest item if the buffer was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let capacity = self.capacity();
        if self.len < capacity {
            let idx = (self.head + self.len) % capacity;
            self.slots[idx] = Some(item);
            self.len += 1;
            None
        } else {
            let evicted = self.slots[self.head].replace(item);
            self.head = (self.head + 1) % capacity;
            evicted
        }
    }

    /// Maximum number of items held.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Get the number of items in the buffer.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Check if the next push will evict.
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Most recently pushed item.
    pub fn newest(&self) -> Option<&T> {
        if self.len == 0 {
            return None;
        }
        let idx = (self.head + self.len - 1) % self.capacity();
        self.slots[idx].as_ref()
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        let capacity = self.capacity();
        (0..self.len).filter_map(move |i| self.slots[(self.head + i) % capacity].as_ref())
    }

    /// Remove all items, keeping the allocation.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

impl<T> Extend<T> for RingBuffer<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let mut buf: RingBuffer<i32> = RingBuffer::new(3);
        assert!(buf.is_empty());
        assert_eq!(buf.newest(), None);

        buf.push(1);
        buf.push(2);
        assert_eq!(buf.len(), 2);
        assert!(!buf.is_full());
        assert_eq!(buf.newest(), Some(&2));
        assert_eq!(buf.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_eviction() {
        let mut buf: RingBuffer<i32> = RingBuffer::new(3);
        assert_eq!(buf.push(1), None);
        assert_eq!(buf.push(2), None);
        assert_eq!(buf.push(3), None);
        assert!(buf.is_full());

        // Oldest goes first
        assert_eq!(buf.push(4), Some(1));
        assert_eq!(buf.push(5), Some(2));
        assert_eq!(buf.iter().copied().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(buf.iter().rev().copied().collect::<Vec<_>>(), vec![5, 4, 3]);
        assert_eq!(buf.newest(), Some(&5));
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut buf: RingBuffer<&str> = RingBuffer::new(0);
        assert_eq!(buf.capacity(), 1);
        buf.push("a");
        assert_eq!(buf.push("b"), Some("a"));
        assert_eq!(buf.newest(), Some(&"b"));
    }

    #[test]
    fn test_extend_and_clear() {
        let mut buf: RingBuffer<i32> = RingBuffer::new(2);
        buf.extend(1..=5);
        assert_eq!(buf.iter().copied().collect::<Vec<_>>(), vec![4, 5]);

        buf.clear();
        assert!(buf.is_empty());
        buf.push(9);
        assert_eq!(buf.iter().copied().collect::<Vec<_>>(), vec![9]);
    }
}
