//! Sequencer configuration.

use crate::metronome::MetronomeConfig;

/// Tunables of a playback session.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SequencerConfig {
    /// Look-ahead horizon in seconds; must exceed the worst clock jitter
    pub schedule_ahead_time: f64,
    /// Scheduler ticks per measure; raised to the finest pattern resolution
    pub step_precision: u32,
    pub metronome: MetronomeConfig,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            schedule_ahead_time: 0.2,
            step_precision: 64,
            metronome: MetronomeConfig::default(),
        }
    }
}

impl SequencerConfig {
    /// Interval between clock ticks in milliseconds.
    pub fn clock_interval_ms(&self) -> f64 {
        self.schedule_ahead_time * 1000.0 / 4.0
    }
}
