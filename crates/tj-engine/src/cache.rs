//! Active channel cache: the events the scheduler scans, with their
//! durations frozen for the upcoming traversal.
//!
//! Song order can reuse one pattern with different neighbours, so a
//! pattern's trailing event lengths are only known once the transport
//! knows where it is in the order.

use alloc::vec::Vec;
use tj_ir::{distance, measure_length, step_offset, EventRef, Song};

/// One scannable step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CachedStep {
    pub at: EventRef,
    /// Order index the step is played from (0 in jam mode)
    pub start_measure: usize,
    /// Seconds from the start of the measure
    pub offset: f64,
    /// Sounding duration in seconds
    pub length: f64,
}

impl CachedStep {
    /// Whether `compare_time` lies in `[offset, offset + length)`.
    pub fn covers(&self, compare_time: f64) -> bool {
        const EPSILON: f64 = 1e-9;
        let t = compare_time + EPSILON;
        t >= self.offset && t < self.offset + self.length
    }
}

/// Cached steps of every channel.
#[derive(Clone, Debug, Default)]
pub struct ActiveChannels {
    channels: Vec<Vec<CachedStep>>,
}

impl ActiveChannels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, channel: usize) -> &[CachedStep] {
        self.channels.get(channel).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, channel: usize, index: usize) -> Option<CachedStep> {
        self.channels.get(channel)?.get(index).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.iter().all(Vec::is_empty)
    }

    pub fn clear(&mut self) {
        self.channels.clear();
    }

    /// Replace the cache and write the resolved timing back to the events.
    pub fn store(&mut self, song: &mut Song, channels: Vec<Vec<CachedStep>>) {
        for step in channels.iter().flatten() {
            if let Some(event) = song.event_mut(step.at) {
                event.seq.start_measure_offset = step.offset;
                event.seq.length = step.length;
            }
        }
        self.channels = channels;
    }
}

/// Offsets of the populated steps of one channel of one pattern.
fn channel_steps(song: &Song, pattern_index: usize, channel: usize) -> Vec<(u16, f64)> {
    let tempo = song.meta.tempo;
    song.patterns
        .get(pattern_index)
        .map(|p| {
            p.events(channel)
                .map(|(step, _)| (step, step_offset(step, p.steps, tempo)))
                .collect()
        })
        .unwrap_or_default()
}

/// Build cached steps for a channel whose last event is followed by
/// `following`: the offset of the next event and how many bars ahead it is.
fn build_channel(
    steps: &[(u16, f64)],
    pattern_index: usize,
    channel: usize,
    start_measure: usize,
    measure: f64,
    following: Option<(f64, usize)>,
) -> Vec<CachedStep> {
    steps
        .iter()
        .enumerate()
        .map(|(i, &(step, offset))| {
            let length = match steps.get(i + 1) {
                Some(&(_, next_offset)) => next_offset - offset,
                None => following.map_or(measure - offset, |(next_offset, bars)| {
                    distance(offset, next_offset, bars, measure)
                }),
            };
            CachedStep {
                at: EventRef::new(pattern_index, channel, step),
                start_measure,
                offset,
                length,
            }
        })
        .collect()
}

/// Resolve the cache for a tracker song playing `order_index`.
///
/// The last event of each channel lasts until the first event that follows
/// it in song order (the same pattern again when looping), wrapping back
/// to the start of the order.
pub fn cache_tracker_channels(song: &Song, order_index: usize, looping: bool) -> Vec<Vec<CachedStep>> {
    let Some(pattern_index) = song.pattern_index_at(order_index) else {
        return Vec::new();
    };
    let measure = measure_length(song.meta.tempo);
    let order_len = song.order.len();

    (0..song.channel_count())
        .map(|channel| {
            let steps = channel_steps(song, pattern_index, channel);
            if steps.is_empty() {
                return Vec::new();
            }

            let following = if looping {
                Some((steps[0].1, 1))
            } else {
                (1..=order_len).find_map(|bars| {
                    let next_pattern = song.order[(order_index + bars) % order_len];
                    channel_steps(song, next_pattern, channel)
                        .first()
                        .map(|&(_, offset)| (offset, bars))
                })
            };

            build_channel(&steps, pattern_index, channel, order_index, measure, following)
        })
        .collect()
}

/// Resolve event lengths for jam channels: every channel loops its own
/// pattern, so its last event lasts until its first one comes round again.
pub fn calculate_jam_channel_event_lengths(song: &Song, patterns: &[usize]) -> Vec<Vec<CachedStep>> {
    let measure = measure_length(song.meta.tempo);

    patterns
        .iter()
        .enumerate()
        .map(|(channel, &pattern_index)| {
            let steps = channel_steps(song, pattern_index, channel);
            let following = steps.first().map(|&(_, offset)| (offset, 1));
            build_channel(&steps, pattern_index, channel, 0, measure, following)
        })
        .collect()
}
