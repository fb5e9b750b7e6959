//! # Frame Queue - pending video packets awaiting presentation
//!
//! FIFO of reusable slots. The demuxer writes into the slot at the cursor;
//! presentation takes the head and rotates the same slot object to just
//! past the live region, so buffers are allocated once and recycled for
//! the lifetime of the stream.
//!
//! ```text
//!   live (cursor = 3)        stale scratch
//! ┌─────┬─────┬─────┐ ┌─────┬─────┐
//! │  A  │  B  │  C  │ │  x  │  y  │   capacity = 5
//! └─────┴─────┴─────┘ └─────┴─────┘
//!    │ pop_front_and_recycle
//!    ▼
//! ┌─────┬─────┐ ┌─────┬─────┬─────┐
//! │  B  │  C  │ │  A  │  x  │  y  │
//! └─────┴─────┘ └─────┴─────┴─────┘
//! ```
//!
//! Invariant: `0 <= len <= capacity`. Slots at `len..` are never read.

use crate::demuxer::Packet;

/// Slot lifecycle counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub slots_allocated: u64,
    pub frames_pushed: u64,
    pub frames_recycled: u64,
}

#[derive(Debug)]
pub struct PendingFrameQueue<T = Packet> {
    slots: Vec<T>,
    len: usize,
    stats: QueueStats,
}

impl<T: Default> Default for PendingFrameQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default> PendingFrameQueue<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            len: 0,
            stats: QueueStats::default(),
        }
    }

    /// Slot at the write cursor. Grows capacity by one when the cursor has
    /// reached it; otherwise hands back a recycled slot.
    pub fn write_slot(&mut self) -> &mut T {
        if self.len >= self.slots.len() {
            // Vec growth aborts on allocation failure; the queue cannot
            // continue without the slot.
            self.slots.push(T::default());
            self.stats.slots_allocated += 1;
        }
        &mut self.slots[self.len]
    }

    /// Count the slot at the cursor as buffered.
    pub fn commit(&mut self) {
        debug_assert!(self.len < self.slots.len(), "commit without write_slot");
        if self.len < self.slots.len() {
            self.len += 1;
            self.stats.frames_pushed += 1;
        }
    }

    /// Oldest buffered entry.
    pub fn front(&self) -> Option<&T> {
        self.slots[..self.len].first()
    }

    /// Newest buffered entry.
    pub fn back(&self) -> Option<&T> {
        self.slots[..self.len].last()
    }

    /// Drop the head and move its slot to the first stale position.
    pub fn pop_front_and_recycle(&mut self) {
        if self.len == 0 {
            return;
        }
        self.slots[..self.len].rotate_left(1);
        self.len -= 1;
        self.stats.frames_recycled += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }
}
