//! Per-channel queue of sounding voices.

use alloc::vec::Vec;
use heapless::Deque;
use tj_ir::{EventRef, VoiceId};

/// Voices a channel can hold before the oldest is evicted.
pub const VOICE_QUEUE_CAPACITY: usize = 8;

/// A triggered event awaiting its release.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueuedVoice {
    pub voice: VoiceId,
    pub at: EventRef,
    /// Order index the voice was triggered from
    pub start_measure: usize,
}

/// Sounding voices of one monophonic channel, oldest first.
///
/// A new note supersedes everything queued here, so in steady state the
/// queue holds at most one entry.
#[derive(Clone, Debug, Default)]
pub struct VoiceQueue {
    entries: Deque<QueuedVoice, VOICE_QUEUE_CAPACITY>,
}

impl VoiceQueue {
    pub fn new() -> Self {
        Self { entries: Deque::new() }
    }

    /// Queue a voice. Returns the evicted oldest voice if the queue was full.
    pub fn push(&mut self, voice: QueuedVoice) -> Option<QueuedVoice> {
        let evicted = if self.entries.is_full() {
            self.entries.pop_front()
        } else {
            None
        };
        // Cannot fail: a slot was freed above if needed.
        let _ = self.entries.push_back(voice);
        evicted
    }

    /// Remove and return every queued voice, oldest first.
    pub fn take_all(&mut self) -> Vec<QueuedVoice> {
        let mut taken = Vec::with_capacity(self.entries.len());
        while let Some(voice) = self.entries.pop_front() {
            taken.push(voice);
        }
        taken
    }

    /// Remove and return the voices matching `pred`, keeping the rest in order.
    pub fn take_where<F: FnMut(&QueuedVoice) -> bool>(&mut self, mut pred: F) -> Vec<QueuedVoice> {
        let mut taken = Vec::new();
        for voice in self.take_all() {
            if pred(&voice) {
                taken.push(voice);
            } else {
                let _ = self.entries.push_back(voice);
            }
        }
        taken
    }

    pub fn contains_voice(&self, voice: VoiceId) -> bool {
        self.entries.iter().any(|q| q.voice == voice)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedVoice> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
