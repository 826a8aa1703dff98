//! Step-to-seconds conversion.
//!
//! A measure is four beats; `beat_amount`/`beat_unit` are carried on the
//! song but not used here.

use crate::event::Event;

/// Length of one measure in seconds at `tempo` BPM.
pub fn measure_length(tempo: f64) -> f64 {
    (60.0 / tempo) * 4.0
}

/// Seconds from the start of a measure to `step` of a `steps`-step pattern.
pub fn step_offset(step: u16, steps: u16, tempo: f64) -> f64 {
    if steps == 0 {
        return 0.0;
    }
    (step as f64 / steps as f64) * measure_length(tempo)
}

/// Length of one pattern step in seconds.
pub fn step_length(steps: u16, tempo: f64) -> f64 {
    if steps == 0 {
        return 0.0;
    }
    measure_length(tempo) / steps as f64
}

/// Time from an event at `from_offset` to one at `to_offset` that lies
/// `bars_ahead` measures later (0 = same measure).
///
/// Crossing measures adds the remainder of the first measure, every fully
/// spanned measure, and the offset into the last one.
pub fn distance(from_offset: f64, to_offset: f64, bars_ahead: usize, measure: f64) -> f64 {
    if bars_ahead == 0 {
        return to_offset - from_offset;
    }
    (measure - from_offset) + (bars_ahead - 1) as f64 * measure + to_offset
}

/// Anchor an event at `step` of pattern `pattern_index`.
///
/// `length` defaults to one step.
pub fn set_position(
    event: &mut Event,
    steps: u16,
    pattern_index: usize,
    step: u16,
    tempo: f64,
    length: Option<f64>,
) {
    let measure = measure_length(tempo);
    let offset = step_offset(step, steps, tempo);
    let length = length.unwrap_or_else(|| step_length(steps, tempo));

    event.seq.start_measure = pattern_index;
    event.seq.start_measure_offset = offset;
    event.seq.length = length;
    event.seq.end_measure = pattern_index + libm::floor((offset + length) / measure) as usize;
}
