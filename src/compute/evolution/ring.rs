//! Fixed-capacity ring buffer indexing.
//!
//! Logical index 0 is always the most recently written slot, logical index
//! `i` the `i`-th most recent one. Archives and the Baldwin history share
//! this translation instead of doing modulo arithmetic at call sites.

/// Index bookkeeping for a ring buffer of `capacity` slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingIndex {
    capacity: usize,
    stored: usize,
    pointer: usize,
}

impl RingIndex {
    /// Create an empty ring.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        Self {
            capacity,
            stored: 0,
            pointer: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots holding data. Saturates at the capacity.
    pub fn len(&self) -> usize {
        self.stored
    }

    pub fn is_empty(&self) -> bool {
        self.stored == 0
    }

    pub fn is_full(&self) -> bool {
        self.stored == self.capacity
    }

    /// Claim the next slot for writing and return its physical index.
    pub fn advance(&mut self) -> usize {
        let slot = self.pointer;
        self.pointer = (self.pointer + 1) % self.capacity;
        if self.stored < self.capacity {
            self.stored += 1;
        }
        slot
    }

    /// Translate a logical index (0 = newest) into a physical slot.
    ///
    /// Panics if `logical >= len()`.
    pub fn physical(&self, logical: usize) -> usize {
        assert!(
            logical < self.stored,
            "ring index {logical} out of range ({} stored)",
            self.stored
        );
        (self.pointer + self.capacity - 1 - logical) % self.capacity
    }
}
