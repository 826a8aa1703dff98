//! Edit commands for mutating song data during playback.

use alloc::vec::Vec;

use crate::event::Event;
use crate::pattern::Pattern;

/// An edit command that mutates song data.
///
/// Edits are applied by the controller, which keeps the event timeline
/// linked and tells the sequencer to re-resolve its cached durations.
#[derive(Clone, Debug, PartialEq)]
pub enum Edit {
    /// Place an event on a step.
    SetStep {
        pattern: usize,
        channel: usize,
        step: u16,
        event: Event,
    },
    /// Empty a step.
    ClearStep {
        pattern: usize,
        channel: usize,
        step: u16,
    },
    /// Change the song tempo (BPM).
    SetTempo(f64),
    /// Replace all patterns and the song order (load, undo/redo).
    ReplacePatterns {
        patterns: Vec<Pattern>,
        order: Vec<usize>,
    },
}

impl Edit {
    /// Returns true if the edit requires relinking every channel.
    pub fn relinks_all(&self) -> bool {
        matches!(self, Edit::SetTempo(_) | Edit::ReplacePatterns { .. })
    }
}
