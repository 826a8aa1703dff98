//! Song structure and song-order types.

use alloc::vec::Vec;
use arrayvec::ArrayString;

use crate::event::{Event, EventRef};
use crate::pattern::Pattern;

/// How patterns are selected during playback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SongType {
    /// One global pattern at a time, advancing through the order list
    #[default]
    Tracker,
    /// Every channel loops its own pattern and switches at bar boundaries
    Jam,
}

/// Song-wide timing metadata.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SongMeta {
    /// Tempo in BPM (> 0)
    pub tempo: f64,
    /// Beats per measure (tracked, scheduling assumes 4)
    pub beat_amount: u8,
    /// Beat unit (tracked, scheduling assumes 4)
    pub beat_unit: u8,
}

impl Default for SongMeta {
    fn default() -> Self {
        Self {
            tempo: 120.0,
            beat_amount: 4,
            beat_unit: 4,
        }
    }
}

/// Per-slot instrument settings forwarded to the renderer on note-on.
#[derive(Clone, Debug, PartialEq)]
pub struct InstrumentConfig {
    pub name: ArrayString<32>,
    /// Output volume (0-100)
    pub volume: u8,
    pub muted: bool,
}

impl InstrumentConfig {
    pub fn new(name: &str) -> Self {
        let mut instrument_name = ArrayString::new();
        let _ = instrument_name.try_push_str(name);
        Self {
            name: instrument_name,
            volume: 100,
            muted: false,
        }
    }
}

/// A complete song.
#[derive(Clone, Debug, PartialEq)]
pub struct Song {
    /// Song title
    pub title: ArrayString<32>,
    pub song_type: SongType,
    pub meta: SongMeta,
    /// Playback order: indices into `patterns`, repeats allowed
    pub order: Vec<usize>,
    /// Unique patterns
    pub patterns: Vec<Pattern>,
    /// One instrument per channel slot
    pub instruments: Vec<InstrumentConfig>,
}

impl Default for Song {
    fn default() -> Self {
        Self {
            title: ArrayString::new(),
            song_type: SongType::Tracker,
            meta: SongMeta::default(),
            order: Vec::new(),
            patterns: Vec::new(),
            instruments: Vec::new(),
        }
    }
}

impl Song {
    /// Create a new empty song.
    pub fn new(title: &str) -> Self {
        let mut song = Self::default();
        let _ = song.title.try_push_str(title);
        song
    }

    /// Create a song with one instrument slot per channel.
    pub fn with_channels(title: &str, num_channels: usize) -> Self {
        let mut song = Self::new(title);
        for i in 0..num_channels {
            let mut name = ArrayString::<32>::new();
            let _ = core::fmt::write(&mut name, format_args!("Inst {}", i + 1));
            song.instruments.push(InstrumentConfig::new(&name));
        }
        song
    }

    /// Number of channels (instrument slots).
    pub fn channel_count(&self) -> usize {
        self.instruments.len()
    }

    /// Append a pattern sized for this song, returning its index.
    pub fn add_pattern(&mut self, pattern: Pattern) -> usize {
        self.patterns.push(pattern);
        self.patterns.len() - 1
    }

    /// Append a pattern index to the song order.
    pub fn add_order(&mut self, pattern_index: usize) {
        self.order.push(pattern_index);
    }

    /// Pattern index played at an order position.
    pub fn pattern_index_at(&self, order_index: usize) -> Option<usize> {
        self.order.get(order_index).copied()
    }

    /// Pattern played at an order position.
    pub fn pattern_at(&self, order_index: usize) -> Option<&Pattern> {
        self.patterns.get(self.pattern_index_at(order_index)?)
    }

    /// Look up an event by address.
    pub fn event(&self, at: EventRef) -> Option<&Event> {
        self.patterns.get(at.pattern)?.step(at.channel, at.step)
    }

    /// Look up an event mutably by address.
    pub fn event_mut(&mut self, at: EventRef) -> Option<&mut Event> {
        self.patterns.get_mut(at.pattern)?.step_mut(at.channel, at.step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Note;

    fn make_test_song() -> Song {
        let mut song = Song::with_channels("test", 2);

        let mut pat0 = Pattern::new(16, 2);
        pat0.set_step(0, 0, Event::note_on(Note::C, 4, 0));
        let mut pat1 = Pattern::new(32, 2);
        pat1.set_step(1, 8, Event::note_on(Note::G, 3, 1));

        let p0 = song.add_pattern(pat0);
        let p1 = song.add_pattern(pat1);
        song.add_order(p0);
        song.add_order(p1);
        song.add_order(p0);
        song
    }

    #[test]
    fn with_channels_names_instruments() {
        let song = make_test_song();
        assert_eq!(song.channel_count(), 2);
        assert_eq!(song.instruments[1].name.as_str(), "Inst 2");
    }

    #[test]
    fn order_may_repeat_patterns() {
        let song = make_test_song();
        assert_eq!(song.pattern_index_at(2), Some(0));
        assert_eq!(song.pattern_at(1).map(|p| p.steps), Some(32));
        assert!(song.pattern_at(3).is_none());
    }

    #[test]
    fn event_lookup_by_ref() {
        let mut song = make_test_song();
        let at = EventRef::new(1, 1, 8);
        assert_eq!(song.event(at).map(|e| e.note), Some(Note::G));

        song.event_mut(at).unwrap().recording = true;
        assert!(song.event(at).unwrap().recording);

        assert!(song.event(EventRef::new(5, 0, 0)).is_none());
        assert!(song.event(EventRef::new(0, 1, 0)).is_none());
    }

    #[test]
    fn default_meta_is_common_time() {
        let song = Song::new("empty");
        assert_eq!(song.meta.tempo, 120.0);
        assert_eq!((song.meta.beat_amount, song.meta.beat_unit), (4, 4));
        assert_eq!(song.song_type, SongType::Tracker);
    }
}
