//! Offline renderer: records every call against a manually advanced clock.
//!
//! Used for deterministic playback in tests and for rendering a session
//! without an audio device.

use alloc::vec::Vec;
use tj_ir::{Action, VoiceId};

use crate::event_queue::CallbackQueue;
use crate::registry::CallbackHandle;
use crate::renderer::{AudioRenderer, NoteTrigger, Time};

/// One recorded renderer call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RenderCall {
    NoteOn {
        voice: VoiceId,
        channel: usize,
        action: Action,
        midi_note: u8,
        instrument: u8,
        at: Time,
    },
    NoteOff {
        voice: VoiceId,
        at: Time,
    },
    Click {
        accent: bool,
        at: Time,
    },
}

#[derive(Clone, Debug)]
pub struct OfflineRenderer {
    clock: Time,
    available: bool,
    calls: Vec<RenderCall>,
    callbacks: CallbackQueue,
}

impl Default for OfflineRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineRenderer {
    pub fn new() -> Self {
        Self::starting_at(0.0)
    }

    /// Start the clock at `time` instead of zero.
    pub fn starting_at(time: Time) -> Self {
        Self {
            clock: time,
            available: true,
            calls: Vec::new(),
            callbacks: CallbackQueue::new(),
        }
    }

    /// Simulate a runtime that cannot play audio.
    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    /// Move the clock forward to `time`. The clock never runs backwards.
    pub fn advance_to(&mut self, time: Time) {
        if time > self.clock {
            self.clock = time;
        }
    }

    pub fn advance_by(&mut self, seconds: f64) {
        self.advance_to(self.clock + seconds);
    }

    pub fn calls(&self) -> &[RenderCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<RenderCall> {
        core::mem::take(&mut self.calls)
    }

    /// `(voice, time)` of every recorded note-on.
    pub fn note_ons(&self) -> Vec<(VoiceId, Time)> {
        self.calls
            .iter()
            .filter_map(|call| match *call {
                RenderCall::NoteOn { voice, at, .. } => Some((voice, at)),
                _ => None,
            })
            .collect()
    }

    /// `(voice, time)` of every recorded note-off.
    pub fn note_offs(&self) -> Vec<(VoiceId, Time)> {
        self.calls
            .iter()
            .filter_map(|call| match *call {
                RenderCall::NoteOff { voice, at } => Some((voice, at)),
                _ => None,
            })
            .collect()
    }

    /// Time the next scheduled callback is due.
    pub fn next_callback_time(&self) -> Option<Time> {
        self.callbacks.peek_time()
    }

    pub fn pending_callbacks(&self) -> usize {
        self.callbacks.len()
    }
}

impl AudioRenderer for OfflineRenderer {
    fn is_available(&self) -> bool {
        self.available
    }

    fn now(&self) -> Time {
        self.clock
    }

    fn note_on(&mut self, trigger: &NoteTrigger<'_>, at: Time) {
        self.calls.push(RenderCall::NoteOn {
            voice: trigger.voice,
            channel: trigger.channel,
            action: trigger.event.action,
            midi_note: trigger.event.midi_note(),
            instrument: trigger.event.instrument,
            at,
        });
    }

    fn note_off(&mut self, voice: VoiceId, at: Time) {
        self.calls.push(RenderCall::NoteOff { voice, at });
    }

    fn click(&mut self, accent: bool, at: Time) {
        self.calls.push(RenderCall::Click { accent, at });
    }

    fn schedule_callback(&mut self, handle: CallbackHandle, at: Time) {
        self.callbacks.push(handle, at);
    }

    fn cancel_callback(&mut self, handle: CallbackHandle) {
        self.callbacks.cancel(handle);
    }

    fn take_due_callbacks(&mut self, due: &mut Vec<CallbackHandle>) {
        self.callbacks.pop_due(self.clock, due);
    }
}
