//! Jam mode: per-channel pattern selection switched at bar boundaries.

use alloc::vec::Vec;

/// Pattern selection of one jam channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JamChannel {
    pub active_pattern_index: usize,
    /// Takes effect at the next bar boundary
    pub next_pattern_index: usize,
    /// Ignore switch requests
    pub locked: bool,
}

/// Jam state of every channel.
#[derive(Clone, Debug, Default)]
pub struct JamState {
    channels: Vec<JamChannel>,
}

impl JamState {
    /// All channels start on `pattern_index`.
    pub fn new(num_channels: usize, pattern_index: usize) -> Self {
        let channel = JamChannel {
            active_pattern_index: pattern_index,
            next_pattern_index: pattern_index,
            locked: false,
        };
        Self { channels: alloc::vec![channel; num_channels] }
    }

    pub fn channel(&self, channel: usize) -> Option<&JamChannel> {
        self.channels.get(channel)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Request a switch. Applied at once when `immediate`, otherwise at the
    /// next bar. Returns false if the channel is locked or unknown.
    pub fn request(&mut self, channel: usize, pattern_index: usize, immediate: bool) -> bool {
        let Some(ch) = self.channels.get_mut(channel) else {
            return false;
        };
        if ch.locked {
            return false;
        }
        ch.next_pattern_index = pattern_index;
        if immediate {
            ch.active_pattern_index = pattern_index;
        }
        true
    }

    pub fn set_locked(&mut self, channel: usize, locked: bool) {
        if let Some(ch) = self.channels.get_mut(channel) {
            ch.locked = locked;
        }
    }

    /// Commit every pending switch; returns the channels that changed.
    pub fn commit_pending(&mut self) -> Vec<usize> {
        let mut changed = Vec::new();
        for (i, ch) in self.channels.iter_mut().enumerate() {
            if ch.active_pattern_index != ch.next_pattern_index {
                ch.active_pattern_index = ch.next_pattern_index;
                changed.push(i);
            }
        }
        changed
    }
}
