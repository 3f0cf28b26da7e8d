use std::collections::VecDeque;

/// Fixed-capacity ring buffer that evicts the oldest entry when full.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CircularBuffer<T> {
    buffer: VecDeque<T>,
    capacity: usize,
}

impl<T> CircularBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        // Capacity 0 stores nothing.
        if self.capacity == 0 {
            return;
        }

        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(item);
    }

    pub fn front(&self) -> Option<&T> {
        self.buffer.front()
    }

    pub fn back(&self) -> Option<&T> {
        self.buffer.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.buffer.iter()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_when_full() {
        let mut buffer = CircularBuffer::new(3);
        for value in 0..5 {
            buffer.push(value);
        }

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.front(), Some(&2));
        assert_eq!(buffer.back(), Some(&4));
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let mut buffer = CircularBuffer::new(0);
        buffer.push("dropped");
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 0);
    }
}
