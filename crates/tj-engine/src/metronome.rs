//! Metronome and recording count-in.

/// Click grid of the metronome.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Subdivision {
    #[default]
    Quarter,
    Eighth,
    Sixteenth,
}

impl Subdivision {
    /// Clicks per measure.
    pub const fn per_measure(self) -> u32 {
        match self {
            Subdivision::Quarter => 4,
            Subdivision::Eighth => 8,
            Subdivision::Sixteenth => 16,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MetronomeConfig {
    pub enabled: bool,
    /// Play one clicking bar before recording starts
    pub count_in: bool,
    pub subdivision: Subdivision,
}

/// Metronome state of a playback session.
#[derive(Clone, Copy, Debug, Default)]
pub struct Metronome {
    pub config: MetronomeConfig,
    pub count_in_complete: bool,
}

impl Metronome {
    pub fn new(config: MetronomeConfig) -> Self {
        Self { config, count_in_complete: false }
    }

    /// True while the count-in bar of a recording is running.
    pub fn counting_in(&self, recording: bool) -> bool {
        recording && self.config.count_in && !self.count_in_complete
    }

    /// Whether a click sounds on tick `step` of a `precision`-tick measure
    /// for a pattern of `pattern_steps` steps. Returns `Some(accent)`.
    ///
    /// Clicks land on the subdivision grid and only on ticks that are also
    /// a step of the pattern.
    pub fn click_at(&self, step: u32, precision: u32, pattern_steps: u16, recording: bool) -> Option<bool> {
        if !self.config.enabled && !self.counting_in(recording) {
            return None;
        }
        let per_click = (precision / self.config.subdivision.per_measure()).max(1);
        let per_step = (precision / u32::from(pattern_steps.max(1))).max(1);
        if step % per_click != 0 || step % per_step != 0 {
            return None;
        }
        Some(step == 0)
    }
}
