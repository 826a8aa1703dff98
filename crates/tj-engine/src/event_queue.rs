//! Time-ordered queue of pending callbacks.

use alloc::vec::Vec;

use crate::registry::CallbackHandle;
use crate::renderer::Time;

/// Pending callbacks sorted by fire time.
///
/// Renderer backends keep one of these to honour `schedule_callback`
/// against their own clock.
#[derive(Clone, Debug, Default)]
pub struct CallbackQueue {
    entries: Vec<(Time, CallbackHandle)>,
}

impl CallbackQueue {
    /// Create a new empty queue.
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Insert a callback; equal times keep insertion order.
    pub fn push(&mut self, handle: CallbackHandle, at: Time) {
        let pos = self.entries.partition_point(|(t, _)| t.total_cmp(&at).is_le());
        self.entries.insert(pos, (at, handle));
    }

    /// Remove a callback. Returns false if it was not queued.
    pub fn cancel(&mut self, handle: CallbackHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(_, h)| *h != handle);
        self.entries.len() != before
    }

    /// Time of the earliest pending callback.
    pub fn peek_time(&self) -> Option<Time> {
        self.entries.first().map(|(t, _)| *t)
    }

    /// Move every callback due at or before `now` into `due`.
    pub fn pop_due(&mut self, now: Time, due: &mut Vec<CallbackHandle>) {
        let count = self.entries.partition_point(|(t, _)| *t <= now);
        due.extend(self.entries.drain(..count).map(|(_, h)| h));
    }

    /// Clear all callbacks.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of pending callbacks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
