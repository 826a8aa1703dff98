//! Transport: the playback position in step and clock domains.

use tj_ir::{measure_length, PlaybackPosition, Song};

use crate::renderer::Time;

/// Current playback position.
///
/// `next_note_time` is in the renderer's clock domain and only moves
/// forward, except when the transport is explicitly repositioned.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transport {
    pub active_order_index: usize,
    /// Always `song.order[active_order_index]` in tracker mode
    pub active_pattern_index: usize,
    /// Tick within the measure, `0..step_precision`
    pub current_step: u32,
    /// Clock time of the tick at `current_step`
    pub next_note_time: Time,
    /// Clock time the current measure started
    pub measure_start_time: Time,
    /// Clock time the song (order index 0) last started
    pub first_measure_start_time: Time,
    step_precision: u32,
}

impl Transport {
    pub fn new(step_precision: u32) -> Self {
        Self {
            active_order_index: 0,
            active_pattern_index: 0,
            current_step: 0,
            next_note_time: 0.0,
            measure_start_time: 0.0,
            first_measure_start_time: 0.0,
            step_precision: step_precision.max(1),
        }
    }

    pub fn step_precision(&self) -> u32 {
        self.step_precision
    }

    /// Change the tick resolution. Only takes effect on a measure boundary.
    pub fn set_step_precision(&mut self, step_precision: u32) -> bool {
        if self.current_step != 0 {
            return false;
        }
        self.step_precision = step_precision.max(1);
        true
    }

    /// Length of one scheduler tick at `tempo`.
    pub fn tick_length(&self, tempo: f64) -> f64 {
        measure_length(tempo) / self.step_precision as f64
    }

    /// Time of the next tick relative to the start of its measure.
    pub fn compare_time(&self) -> f64 {
        self.next_note_time - self.measure_start_time
    }

    /// Clamp an order index to the song order (0 for an empty order).
    pub fn clamp_order_index(song: &Song, order_index: usize) -> usize {
        order_index.min(song.order.len().saturating_sub(1))
    }

    /// Restart the measure at `time`.
    pub fn restart_measure(&mut self, time: Time) {
        self.current_step = 0;
        self.next_note_time = time;
        self.measure_start_time = time;
    }

    /// Advance one tick. Returns true when the step wraps to a new measure.
    pub fn advance(&mut self, tempo: f64) -> bool {
        self.next_note_time += self.tick_length(tempo);
        self.current_step += 1;
        if self.current_step >= self.step_precision {
            self.current_step = 0;
            self.measure_start_time = self.next_note_time;
            return true;
        }
        false
    }

    /// Position in the active pattern's own resolution.
    pub fn position(&self, song: &Song) -> PlaybackPosition {
        let steps = song
            .patterns
            .get(self.active_pattern_index)
            .map_or(self.step_precision, |p| u32::from(p.steps));
        PlaybackPosition {
            order_index: self.active_order_index,
            pattern_index: self.active_pattern_index,
            step: (self.current_step * steps / self.step_precision) as u16,
        }
    }
}
