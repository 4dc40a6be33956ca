//! Fixed-capacity ring buffer shared by the rolling inflow history and the
//! event log.

use serde::{Deserialize, Serialize};

/// A pre-allocated ring buffer. Fixed capacity; when full, the oldest entry
/// is dropped. Resizing keeps the most recent entries in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingBuffer<T> {
    /// Pre-allocated storage.
    slots: Vec<Option<T>>,
    /// Write position (wraps around).
    head: usize,
    /// Number of entries currently stored (may be less than capacity).
    len: usize,
    /// Total entries ever written (including dropped).
    total_written: u64,
}

impl<T> RingBuffer<T> {
    /// Create a new ring buffer with the given capacity.
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            total_written: 0,
        }
    }

    /// Push an entry. If full, the oldest entry is dropped.
    pub fn push(&mut self, value: T) {
        let capacity = self.capacity();
        self.slots[self.head] = Some(value);
        self.head = (self.head + 1) % capacity;
        if self.len < capacity {
            self.len += 1;
        }
        self.total_written += 1;
    }

    /// The total capacity of the buffer.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total entries written since creation (including dropped).
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Index of the oldest stored entry.
    fn start(&self) -> usize {
        if self.len < self.capacity() {
            0
        } else {
            // head points to the next write position, which is the oldest entry
            self.head
        }
    }

    /// Iterate over entries in order from oldest to newest.
    pub fn iter(&self) -> RingIter<'_, T> {
        RingIter {
            buffer: self,
            index: self.start(),
            remaining: self.len,
        }
    }

    /// The most recently pushed entry.
    pub fn latest(&self) -> Option<&T> {
        if self.len == 0 {
            return None;
        }
        let idx = (self.head + self.capacity() - 1) % self.capacity();
        self.slots[idx].as_ref()
    }

    /// Change the capacity in place. Keeps the most recent
    /// `min(len, capacity)` entries in arrival order. A capacity of 0 is
    /// clamped to 1.
    pub fn resize(&mut self, capacity: usize) {
        let capacity = capacity.max(1);
        let old_capacity = self.capacity();
        if capacity == old_capacity {
            return;
        }

        let keep = self.len.min(capacity);
        let skip = self.len - keep;
        let start = self.start();

        let mut slots: Vec<Option<T>> = (0..capacity).map(|_| None).collect();
        for (i, slot) in slots.iter_mut().enumerate().take(keep) {
            let idx = (start + skip + i) % old_capacity;
            *slot = self.slots[idx].take();
        }

        self.slots = slots;
        self.len = keep;
        self.head = keep % capacity;
    }

    /// Clear all entries from the buffer.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy the entries out, oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

/// Iterator over a [`RingBuffer`], from oldest to newest.
pub struct RingIter<'a, T> {
    buffer: &'a RingBuffer<T>,
    index: usize,
    remaining: usize,
}

impl<'a, T> Iterator for RingIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let value = self.buffer.slots[self.index].as_ref();
        self.index = (self.index + 1) % self.buffer.capacity();
        self.remaining -= 1;
        value
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for RingIter<'_, T> {}
