//! Transport position as reported to editors and UIs.

use core::fmt;

/// Where playback currently is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackPosition {
    /// Index into the song order
    pub order_index: usize,
    /// Pattern playing at that order index
    pub pattern_index: usize,
    /// Step in the pattern's own resolution
    pub step: u16,
}

impl fmt::Display for PlaybackPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ord: {:02X} | Pat: {:02X} | Step: {:02X}",
            self.order_index, self.pattern_index, self.step
        )
    }
}
