//! Headless controller for the trackjam sequencer.
//!
//! Owns the song, its event timeline, a playback session and the clock
//! that drives it. Editors and the CLI talk to the engine only through
//! this API.

mod clock;
mod error;

use std::path::Path;

use tj_engine::{AudioRenderer, OfflineRenderer, RenderCall, Sequencer};
use tj_ir::{EventTimeline, StepPos};

pub use clock::{ClockSource, ClockTick};
pub use error::{ClockError, ControllerError};

// Re-export common types so callers don't need tj-ir/tj-engine directly.
pub use tj_audio::SystemRenderer;
pub use tj_engine::{MetronomeConfig, SequencerConfig, Subdivision};
pub use tj_ir::{Edit, Event, PlaybackPosition, Song, SongType};

/// Read a JSON sequencer config. Missing fields take their defaults.
pub fn load_config(path: impl AsRef<Path>) -> Result<SequencerConfig, ControllerError> {
    let text = std::fs::read_to_string(path)?;
    let config = serde_json::from_str(&text)?;
    Ok(config)
}

/// The slot an edit addresses, or why it does not exist.
fn step_slot(
    song: &mut Song,
    pattern: usize,
    channel: usize,
    step: u16,
) -> Result<&mut Option<Event>, ControllerError> {
    if channel >= song.channel_count() {
        return Err(ControllerError::InvalidEdit("no such channel"));
    }
    song.patterns
        .get_mut(pattern)
        .ok_or(ControllerError::InvalidEdit("no such pattern"))?
        .slot_mut(channel, step)
        .ok_or(ControllerError::InvalidEdit("no such step"))
}

/// Headless sequencer controller: owns a song and manages its playback.
pub struct Controller<R: AudioRenderer> {
    song: Song,
    timeline: EventTimeline,
    sequencer: Sequencer,
    renderer: R,
    clock: Option<ClockSource>,
    config: SequencerConfig,
}

impl<R: AudioRenderer> Controller<R> {
    pub fn new(mut song: Song, renderer: R, config: SequencerConfig) -> Self {
        let timeline = EventTimeline::from_song(&mut song);
        let sequencer = Sequencer::prepare(&song, config);
        Self {
            song,
            timeline,
            sequencer,
            renderer,
            clock: None,
            config,
        }
    }

    // --- Song management ---

    pub fn song(&self) -> &Song {
        &self.song
    }

    pub fn timeline(&self) -> &EventTimeline {
        &self.timeline
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    /// Replace the song. Stops playback.
    pub fn load_song(&mut self, mut song: Song) {
        self.stop();
        self.timeline = EventTimeline::from_song(&mut song);
        self.sequencer = Sequencer::prepare(&song, self.config);
        self.song = song;
    }

    /// Replace the sequencer config. Stops playback.
    pub fn set_config(&mut self, config: SequencerConfig) {
        self.stop();
        self.config = config;
        self.sequencer = Sequencer::prepare(&self.song, config);
    }

    /// Apply an edit, relink the affected timeline and re-resolve the
    /// durations the sequencer has cached.
    pub fn apply_edit(&mut self, edit: Edit) -> Result<(), ControllerError> {
        let relink_all = edit.relinks_all();
        match edit {
            Edit::SetStep { pattern, channel, step, event } => {
                *step_slot(&mut self.song, pattern, channel, step)? = Some(event);
                self.timeline.link_event(&mut self.song, channel, StepPos::new(pattern, step));
            }
            Edit::ClearStep { pattern, channel, step } => {
                step_slot(&mut self.song, pattern, channel, step)?;
                self.timeline.clear_event(&mut self.song, channel, StepPos::new(pattern, step));
            }
            Edit::SetTempo(tempo) => {
                if !tempo.is_finite() || tempo <= 0.0 {
                    return Err(ControllerError::InvalidEdit("tempo must be positive"));
                }
                self.song.meta.tempo = tempo;
            }
            Edit::ReplacePatterns { patterns, order } => {
                if order.iter().any(|&p| p >= patterns.len()) {
                    return Err(ControllerError::InvalidEdit("order references a missing pattern"));
                }
                self.song.patterns = patterns;
                self.song.order = order;
            }
        }
        if relink_all {
            self.timeline.link_events(&mut self.song);
        }
        self.sequencer.invalidate_channel_cache(&mut self.song, None);
        Ok(())
    }

    // --- Playback ---

    /// Start playback from the current order index and start the clock.
    pub fn play(&mut self) -> Result<(), ControllerError> {
        if self.sequencer.is_playing() {
            return Ok(());
        }
        let clock = ClockSource::start(self.config.clock_interval_ms())?;
        if !self.sequencer.set_playing(&mut self.song, &mut self.renderer, true) {
            return Err(ControllerError::RendererUnavailable);
        }
        self.clock = Some(clock);
        self.sequencer.collect(&mut self.song, &mut self.renderer);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.clock = None;
        self.sequencer.set_playing(&mut self.song, &mut self.renderer, false);
    }

    pub fn is_playing(&self) -> bool {
        self.sequencer.is_playing()
    }

    /// Run one scheduling pass if the clock ticked since the last call.
    /// Returns the number of ticks consumed.
    pub fn pump(&mut self) -> usize {
        let ticks = self.clock.as_mut().map_or(0, ClockSource::drain);
        if ticks > 0 {
            self.sequencer.collect(&mut self.song, &mut self.renderer);
        }
        // Playback can end by itself (end of song while recording).
        if !self.sequencer.is_playing() {
            self.clock = None;
        }
        ticks
    }

    pub fn position(&self) -> PlaybackPosition {
        self.sequencer.position(&self.song)
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.sequencer.set_looping(&mut self.song, looping);
    }

    pub fn set_recording(&mut self, recording: bool) {
        self.sequencer.set_recording(recording);
    }

    pub fn goto_pattern(&mut self, order_index: usize) {
        self.sequencer.goto_pattern(&mut self.song, &mut self.renderer, order_index);
    }

    pub fn goto_next_pattern(&mut self) {
        self.sequencer.goto_next_pattern(&mut self.song, &mut self.renderer);
    }

    pub fn goto_previous_pattern(&mut self) {
        self.sequencer.goto_previous_pattern(&mut self.song, &mut self.renderer);
    }

    // --- Jam mode ---

    pub fn set_jam_channel_position(&mut self, channel: usize, pattern_index: usize) -> bool {
        self.sequencer.set_jam_channel_position(&self.song, channel, pattern_index)
    }

    pub fn set_jam_channel_lock(&mut self, channel: usize, locked: bool) {
        self.sequencer.set_jam_channel_lock(channel, locked);
    }

    pub fn flush_jam_channel(&mut self, channel: usize) {
        self.sequencer.flush_jam_channel(channel);
    }
}

impl<R: AudioRenderer> Drop for Controller<R> {
    fn drop(&mut self) {
        self.stop();
    }
}

// --- Real-time playback ---

impl Controller<SystemRenderer> {
    /// Controller rendering against the wall clock, output already started.
    pub fn with_system_renderer(song: Song, config: SequencerConfig) -> Self {
        let mut renderer = SystemRenderer::new();
        renderer.start();
        Self::new(song, renderer, config)
    }
}

// --- Offline rendering ---

impl Controller<OfflineRenderer> {
    /// Play `seconds` of the song against the offline clock, pumping the
    /// scheduler at the configured clock interval. Returns every renderer
    /// call made.
    pub fn render_offline(&mut self, seconds: f64) -> Result<Vec<RenderCall>, ControllerError> {
        let interval_ms = self.config.clock_interval_ms();
        if !interval_ms.is_finite() || interval_ms <= 0.0 {
            return Err(ClockError::InvalidInterval(interval_ms).into());
        }
        if !self.sequencer.is_playing()
            && !self.sequencer.set_playing(&mut self.song, &mut self.renderer, true)
        {
            return Err(ControllerError::RendererUnavailable);
        }

        let end = self.renderer.now() + seconds;
        self.sequencer.collect(&mut self.song, &mut self.renderer);
        while self.renderer.now() < end && self.sequencer.is_playing() {
            self.renderer.advance_by(interval_ms / 1000.0);
            self.sequencer.collect(&mut self.song, &mut self.renderer);
        }
        Ok(self.renderer.take_calls())
    }
}
