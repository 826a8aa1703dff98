//! Look-ahead scheduling.
//!
//! On every clock tick `collect` walks the transport forward, one
//! scheduler tick at a time, until it is `schedule_ahead_time` ahead of
//! the render clock. Every event whose window covers a tick is handed to
//! the renderer with an absolute timestamp, so a late tick only shortens
//! the margin and never shifts audio.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;
use tj_ir::{step_length, Action, EventRef, PlaybackPosition, Song, SongType, VoiceId};

use crate::cache::{calculate_jam_channel_event_lengths, cache_tracker_channels, ActiveChannels};
use crate::config::SequencerConfig;
use crate::jam::{JamChannel, JamState};
use crate::metronome::Metronome;
use crate::registry::{CallbackHandle, PendingRelease, VoiceRegistry};
use crate::renderer::{AudioRenderer, NoteTrigger, Time};
use crate::transport::Transport;
use crate::voice_queue::{QueuedVoice, VoiceQueue};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StepOutcome {
    Continue,
    Stop,
}

/// Playback session state.
///
/// Created by [`Sequencer::prepare`] and torn down by stopping. The song is
/// passed into every operation; the sequencer only ever writes the timing
/// fields of events plus `seq.playing` and `id`.
#[derive(Clone, Debug)]
pub struct Sequencer {
    config: SequencerConfig,
    transport: Transport,
    voice_queues: Vec<VoiceQueue>,
    registry: VoiceRegistry,
    active: ActiveChannels,
    cache_valid: bool,
    jam: JamState,
    metronome: Metronome,
    playing: bool,
    looping: bool,
    recording: bool,
    /// Events triggered in the current bar pass
    triggered: BTreeSet<EventRef>,
    flush_requests: Vec<bool>,
    due: Vec<CallbackHandle>,
}

impl Sequencer {
    /// Prepare a session for `song`.
    pub fn prepare(song: &Song, config: SequencerConfig) -> Self {
        let channels = song.channel_count();
        let first_pattern = song.pattern_index_at(0).unwrap_or(0);
        Self {
            config,
            transport: Transport::new(tick_resolution(song, &config)),
            voice_queues: (0..channels).map(|_| VoiceQueue::new()).collect(),
            registry: VoiceRegistry::new(),
            active: ActiveChannels::new(),
            cache_valid: false,
            jam: JamState::new(channels, first_pattern),
            metronome: Metronome::new(config.metronome),
            playing: false,
            looping: false,
            recording: false,
            triggered: BTreeSet::new(),
            flush_requests: alloc::vec![false; channels],
            due: Vec::new(),
        }
    }

    // --- State ---

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn position(&self, song: &Song) -> PlaybackPosition {
        self.transport.position(song)
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn count_in_complete(&self) -> bool {
        self.metronome.count_in_complete
    }

    pub fn jam_channel(&self, channel: usize) -> Option<&JamChannel> {
        self.jam.channel(channel)
    }

    pub fn voice_queue(&self, channel: usize) -> Option<&VoiceQueue> {
        self.voice_queues.get(channel)
    }

    pub fn active_channels(&self) -> &ActiveChannels {
        &self.active
    }

    pub fn live_voice_count(&self) -> usize {
        self.registry.live_count()
    }

    pub fn pending_release_count(&self) -> usize {
        self.registry.pending_count()
    }

    // --- Transport control ---

    /// Start or stop playback. Starting always begins at step 0 of the
    /// current order index. Returns false if the renderer cannot play.
    pub fn set_playing<R: AudioRenderer>(&mut self, song: &mut Song, renderer: &mut R, playing: bool) -> bool {
        if !playing {
            if self.playing {
                self.stop(song, renderer);
            }
            return true;
        }
        if self.playing {
            return true;
        }
        if !renderer.is_available() {
            log::warn!(target: "scheduler", "audio renderer unavailable, playback not started");
            return false;
        }

        let now = renderer.now();
        self.playing = true;
        // Count-in only runs when playback starts armed.
        self.metronome.count_in_complete = !self.recording;
        self.cache_valid = false;
        self.triggered.clear();
        self.transport.restart_measure(now);
        self.sync_tick_resolution(song);
        self.transport.first_measure_start_time = now;

        let order_index = self.transport.active_order_index;
        self.set_position(song, renderer, order_index, now);
        log::info!(target: "transport", "playback started at order {} ({:.3}s)", order_index, now);
        true
    }

    /// Loop the current order index instead of advancing.
    pub fn set_looping(&mut self, song: &mut Song, looping: bool) {
        self.looping = looping;
        // Tail lengths depend on what follows the pattern.
        if self.playing {
            self.cache_active_pattern_channels(song);
        } else {
            self.cache_valid = false;
        }
    }

    pub fn set_recording(&mut self, recording: bool) {
        self.recording = recording;
    }

    /// Jump to an order index. While playing the jump happens at the next
    /// scheduler tick; otherwise only the displayed position moves.
    pub fn goto_pattern<R: AudioRenderer>(&mut self, song: &mut Song, renderer: &mut R, order_index: usize) {
        if self.playing {
            let time = self.transport.next_note_time;
            self.set_position(song, renderer, order_index, time);
            return;
        }
        let order_index = Transport::clamp_order_index(song, order_index);
        self.transport.active_order_index = order_index;
        self.transport.active_pattern_index = song.pattern_index_at(order_index).unwrap_or(0);
        self.transport.current_step = 0;
        self.cache_valid = false;
    }

    pub fn goto_next_pattern<R: AudioRenderer>(&mut self, song: &mut Song, renderer: &mut R) {
        let next = self.transport.active_order_index + 1;
        if next < song.order.len() {
            self.goto_pattern(song, renderer, next);
        }
    }

    pub fn goto_previous_pattern<R: AudioRenderer>(&mut self, song: &mut Song, renderer: &mut R) {
        if let Some(previous) = self.transport.active_order_index.checked_sub(1) {
            self.goto_pattern(song, renderer, previous);
        }
    }

    /// Reposition the transport at `current_time`.
    ///
    /// Moving to another order slot or pattern restarts the measure and is
    /// the only place the active channel cache (and with it every event
    /// length for the coming traversal) is resolved. Arriving at order
    /// index 0 releases voices started from any other order index.
    pub fn set_position<R: AudioRenderer>(
        &mut self,
        song: &mut Song,
        renderer: &mut R,
        order_index: usize,
        current_time: Time,
    ) {
        let order_index = Transport::clamp_order_index(song, order_index);
        let pattern_index = song.pattern_index_at(order_index).unwrap_or(0);
        let moved = order_index != self.transport.active_order_index
            || pattern_index != self.transport.active_pattern_index;

        self.transport.active_order_index = order_index;
        self.transport.active_pattern_index = pattern_index;

        if moved || !self.cache_valid {
            self.transport.restart_measure(current_time);
            self.triggered.clear();
            self.cache_active_pattern_channels(song);
            log::debug!(target: "transport", "order {} -> pattern {}", order_index, pattern_index);
        }

        if order_index == 0 && self.transport.current_step == 0 {
            self.transport.first_measure_start_time = current_time;
            if self.playing {
                for channel in 0..self.voice_queues.len() {
                    let stale = self.voice_queues[channel].take_where(|q| q.start_measure != 0);
                    for queued in stale {
                        self.release_queued(song, renderer, queued, channel, current_time);
                    }
                }
            }
        }
    }

    // --- Jam mode ---

    /// Select a channel's jam pattern: at once when stopped, at the next bar
    /// while playing. Returns false if the channel is locked or the pattern
    /// does not exist.
    pub fn set_jam_channel_position(&mut self, song: &Song, channel: usize, pattern_index: usize) -> bool {
        if pattern_index >= song.patterns.len() {
            return false;
        }
        let accepted = self.jam.request(channel, pattern_index, !self.playing);
        if accepted && !self.playing {
            self.cache_valid = false;
        }
        accepted
    }

    pub fn set_jam_channel_lock(&mut self, channel: usize, locked: bool) {
        self.jam.set_locked(channel, locked);
    }

    /// Silence a channel on the next scheduler tick.
    pub fn flush_jam_channel(&mut self, channel: usize) {
        if let Some(flag) = self.flush_requests.get_mut(channel) {
            *flag = true;
        }
    }

    /// Editors call this after mutating patterns so durations are
    /// re-resolved. `order_index` names the edited order slot (defaults to
    /// the active one); edits elsewhere are picked up at the next move.
    pub fn invalidate_channel_cache(&mut self, song: &mut Song, order_index: Option<usize>) {
        let active = self.transport.active_order_index;
        self.cache_valid = false;
        if self.playing && order_index.map_or(true, |i| i == active) {
            self.cache_active_pattern_channels(song);
        }
    }

    // --- Scheduling ---

    /// One look-ahead pass. Called on every clock tick.
    pub fn collect<R: AudioRenderer>(&mut self, song: &mut Song, renderer: &mut R) {
        self.service(song, renderer);
        if !self.playing {
            return;
        }
        if !song.meta.tempo.is_finite() || song.meta.tempo <= 0.0 {
            log::warn!(target: "scheduler", "invalid tempo {}, skipping pass", song.meta.tempo);
            return;
        }
        if !self.cache_valid {
            self.cache_active_pattern_channels(song);
        }

        let horizon = renderer.now() + self.config.schedule_ahead_time;
        while self.transport.next_note_time < horizon {
            // Count-in bars click but do not sequence.
            let sequence_events = !self.metronome.counting_in(self.recording);

            self.apply_flush_requests(song, renderer);
            if sequence_events {
                self.schedule_tick(song, renderer);
            }
            self.sound_metronome(song, renderer);

            if self.step(song, renderer) == StepOutcome::Stop {
                self.set_playing(song, renderer, false);
                break;
            }
        }
    }

    /// Run every release callback the renderer reports as due.
    pub fn service<R: AudioRenderer>(&mut self, song: &mut Song, renderer: &mut R) {
        let mut due = core::mem::take(&mut self.due);
        renderer.take_due_callbacks(&mut due);
        for handle in due.drain(..) {
            self.fire(song, renderer, handle);
        }
        self.due = due;
    }

    fn schedule_tick<R: AudioRenderer>(&mut self, song: &mut Song, renderer: &mut R) {
        let compare_time = self.transport.compare_time();

        for channel in (0..self.active.channel_count()).rev() {
            for index in (0..self.active.channel(channel).len()).rev() {
                let Some(cached) = self.active.get(channel, index) else {
                    continue;
                };
                if self.triggered.contains(&cached.at) || !cached.covers(compare_time) {
                    continue;
                }
                // Edited away since the cache was built.
                let Some(event) = song.event(cached.at) else {
                    continue;
                };
                if event.recording || event.action == Action::None {
                    continue;
                }
                self.enqueue_event(song, renderer, cached.at, channel, cached.start_measure);
            }
        }
    }

    /// Trigger an event at the transport's next note time.
    ///
    /// Unless the event is automation-only, everything queued in the
    /// channel is released at the same time first. Sustained notes stay
    /// queued until superseded; one-shots release after one step.
    pub fn enqueue_event<R: AudioRenderer>(
        &mut self,
        song: &mut Song,
        renderer: &mut R,
        at: EventRef,
        channel: usize,
        start_measure: usize,
    ) {
        if self.triggered.contains(&at) {
            #[cfg(debug_assertions)]
            log::debug!(target: "scheduler", "skipping double trigger of {:?}", at);
            return;
        }

        let time = self.transport.next_note_time;
        let tempo = song.meta.tempo;
        let Some(steps) = song.patterns.get(at.pattern).map(|p| p.steps) else {
            return;
        };
        let Some(event) = song.event_mut(at) else {
            return;
        };
        event.seq.mp_length = step_length(steps, tempo);
        let mp_length = event.seq.mp_length;
        let action = event.action;
        let previous = event.id.take();

        if action != Action::AutoOnly {
            self.halt_playback_for_channel(song, renderer, channel, time);
        }

        // Retrigger: the event still owns a voice from an earlier pass.
        if let Some(old) = previous {
            if self.registry.release(old) {
                log::trace!(target: "scheduler", "retrigger {:?}: releasing {:?}", at, old);
                renderer.note_off(old, time);
            }
        }

        let voice = self.registry.mint(at);
        if let Some(event) = song.event_mut(at) {
            event.id = Some(voice);
            event.seq.playing = true;
        }
        self.triggered.insert(at);

        let song_ref: &Song = song;
        if let Some(event) = song_ref.event(at) {
            let trigger = NoteTrigger {
                voice,
                channel,
                event,
                instrument: song_ref.instruments.get(event.instrument as usize),
            };
            renderer.note_on(&trigger, time);
        }

        let queued = QueuedVoice { voice, at, start_measure };
        if action == Action::NoteOn && channel < self.voice_queues.len() {
            if let Some(evicted) = self.voice_queues[channel].push(queued) {
                self.release_queued(song, renderer, evicted, channel, time);
            }
            return;
        }
        self.dequeue_event(renderer, queued, channel, time + mp_length);
    }

    /// Schedule the release of a voice at `time`.
    pub fn dequeue_event<R: AudioRenderer>(&mut self, renderer: &mut R, queued: QueuedVoice, channel: usize, time: Time) {
        let handle = self.registry.schedule(PendingRelease {
            voice: queued.voice,
            at: queued.at,
            channel,
            time,
        });
        renderer.schedule_callback(handle, time);
    }

    /// Release every voice queued in a channel at `time`.
    pub fn halt_playback_for_channel<R: AudioRenderer>(
        &mut self,
        song: &mut Song,
        renderer: &mut R,
        channel: usize,
        time: Time,
    ) {
        let Some(queue) = self.voice_queues.get_mut(channel) else {
            return;
        };
        for queued in queue.take_all() {
            self.release_queued(song, renderer, queued, channel, time);
        }
    }

    /// Resolve the steps (and their lengths) the scheduler scans.
    pub fn cache_active_pattern_channels(&mut self, song: &mut Song) {
        let channels = match song.song_type {
            SongType::Tracker => {
                cache_tracker_channels(song, self.transport.active_order_index, self.looping)
            }
            SongType::Jam => {
                let patterns: Vec<usize> = (0..self.jam.len())
                    .map(|c| self.jam.channel(c).map_or(0, |j| j.active_pattern_index))
                    .collect();
                calculate_jam_channel_event_lengths(song, &patterns)
            }
        };
        self.active.store(song, channels);
        self.cache_valid = true;

        let num_channels = song.channel_count();
        if self.voice_queues.len() < num_channels {
            self.voice_queues.resize_with(num_channels, VoiceQueue::new);
            self.flush_requests.resize(num_channels, false);
        }
    }

    /// The queue no longer owns the voice; its release follows at `time`.
    fn release_queued<R: AudioRenderer>(
        &mut self,
        song: &mut Song,
        renderer: &mut R,
        queued: QueuedVoice,
        channel: usize,
        time: Time,
    ) {
        if let Some(event) = song.event_mut(queued.at) {
            if event.id == Some(queued.voice) {
                event.seq.playing = false;
            }
        }
        self.dequeue_event(renderer, queued, channel, time);
    }

    fn fire<R: AudioRenderer>(&mut self, song: &mut Song, renderer: &mut R, handle: CallbackHandle) {
        let Some(release) = self.registry.take(handle) else {
            log::trace!(target: "scheduler", "stale callback {:?}", handle);
            return;
        };
        settle_event(song, release.at, release.voice);
        if self.registry.release(release.voice) {
            renderer.note_off(release.voice, release.time);
        }
    }

    /// Pick up a finer pattern resolution at the start of a measure.
    fn sync_tick_resolution(&mut self, song: &Song) {
        let precision = tick_resolution(song, &self.config);
        if precision != self.transport.step_precision() && self.transport.set_step_precision(precision) {
            log::debug!(target: "transport", "tick resolution {} per measure", precision);
        }
    }

    fn apply_flush_requests<R: AudioRenderer>(&mut self, song: &mut Song, renderer: &mut R) {
        let time = self.transport.next_note_time;
        for channel in 0..self.flush_requests.len() {
            if core::mem::take(&mut self.flush_requests[channel]) {
                log::debug!(target: "scheduler", "flushing channel {}", channel);
                self.halt_playback_for_channel(song, renderer, channel, time);
            }
        }
    }

    fn sound_metronome<R: AudioRenderer>(&mut self, song: &Song, renderer: &mut R) {
        let steps = song
            .patterns
            .get(self.transport.active_pattern_index)
            .map_or(16, |p| p.steps);
        let click = self.metronome.click_at(
            self.transport.current_step,
            self.transport.step_precision(),
            steps,
            self.recording,
        );
        if let Some(accent) = click {
            renderer.click(accent, self.transport.next_note_time);
        }
    }

    /// Advance one scheduler tick and handle the bar boundary.
    fn step<R: AudioRenderer>(&mut self, song: &mut Song, renderer: &mut R) -> StepOutcome {
        if !self.transport.advance(song.meta.tempo) {
            return StepOutcome::Continue;
        }
        self.triggered.clear();
        self.sync_tick_resolution(song);
        let time = self.transport.next_note_time;

        if self.metronome.counting_in(self.recording) {
            self.metronome.count_in_complete = true;
            self.transport.first_measure_start_time = time;
            log::debug!(target: "transport", "count-in complete");
            return StepOutcome::Continue;
        }

        match song.song_type {
            SongType::Jam => {
                let changed = self.jam.commit_pending();
                if !changed.is_empty() || !self.cache_valid {
                    self.cache_active_pattern_channels(song);
                }
                for channel in changed {
                    let silent = self
                        .jam
                        .channel(channel)
                        .and_then(|j| song.patterns.get(j.active_pattern_index))
                        .map_or(true, |p| p.channel_is_silent(channel));
                    if silent {
                        self.halt_playback_for_channel(song, renderer, channel, time);
                    }
                }
            }
            SongType::Tracker if self.looping => {
                if !self.cache_valid {
                    self.cache_active_pattern_channels(song);
                }
            }
            SongType::Tracker => {
                let mut next = self.transport.active_order_index + 1;
                if next >= song.order.len() {
                    if self.recording {
                        log::info!(target: "transport", "end of song while recording, stopping");
                        return StepOutcome::Stop;
                    }
                    next = 0;
                }
                self.set_position(song, renderer, next, time);
            }
        }
        StepOutcome::Continue
    }

    /// Tear down: cancel every pending release, silence every voice and
    /// drop the cache so no stale pass can trigger anything.
    fn stop<R: AudioRenderer>(&mut self, song: &mut Song, renderer: &mut R) {
        self.playing = false;
        let now = renderer.now();

        let pending: Vec<(CallbackHandle, PendingRelease)> = self.registry.drain_pending().collect();
        for (handle, release) in pending {
            renderer.cancel_callback(handle);
            settle_event(song, release.at, release.voice);
        }
        for queue in &mut self.voice_queues {
            for queued in queue.take_all() {
                settle_event(song, queued.at, queued.voice);
            }
        }
        for (voice, at) in self.registry.drain_live() {
            settle_event(song, at, voice);
            renderer.note_off(voice, now);
        }

        self.active.clear();
        self.cache_valid = false;
        self.triggered.clear();
        self.flush_requests.iter_mut().for_each(|f| *f = false);
        self.transport.current_step = 0;
        log::info!(target: "transport", "playback stopped at {:.3}s", now);
    }
}

/// Ticks per measure: the configured precision, raised to the finest
/// pattern so every step window spans at least one tick.
fn tick_resolution(song: &Song, config: &SequencerConfig) -> u32 {
    song.patterns
        .iter()
        .map(|p| u32::from(p.steps))
        .fold(config.step_precision, u32::max)
}

/// Clear an event's voice if it still belongs to `voice`.
fn settle_event(song: &mut Song, at: EventRef, voice: VoiceId) {
    if let Some(event) = song.event_mut(at) {
        if event.id == Some(voice) {
            event.seq.playing = false;
            event.id = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metronome::{MetronomeConfig, Subdivision};
    use crate::offline::{OfflineRenderer, RenderCall};
    use tj_ir::{Event, ModuleParam, Note, ParamId, Pattern};

    fn note() -> Event {
        Event::note_on(Note::C, 4, 0)
    }

    /// 120 BPM (2s measures), one 16-step pattern, notes on steps 0 and 8.
    fn two_note_song() -> Song {
        let mut song = Song::with_channels("test", 1);
        let mut pat = Pattern::new(16, 1);
        pat.set_step(0, 0, note());
        pat.set_step(0, 8, note());
        let idx = song.add_pattern(pat);
        song.add_order(idx);
        song
    }

    fn play(song: &mut Song, renderer: &mut OfflineRenderer) -> Sequencer {
        let mut seq = Sequencer::prepare(song, SequencerConfig::default());
        assert!(seq.set_playing(song, renderer, true));
        seq
    }

    /// Pump the scheduler every 50ms until the clock reaches `until`.
    fn run_until(seq: &mut Sequencer, song: &mut Song, renderer: &mut OfflineRenderer, until: f64) {
        seq.collect(song, renderer);
        while renderer.now() < until {
            renderer.advance_by(0.05);
            seq.collect(song, renderer);
        }
    }

    #[test]
    fn notes_start_on_time_and_release_at_next_note() {
        let mut song = two_note_song();
        let mut r = OfflineRenderer::starting_at(10.0);
        let mut seq = play(&mut song, &mut r);

        assert_eq!(song.event(EventRef::new(0, 0, 0)).unwrap().seq.length, 1.0);
        assert_eq!(song.event(EventRef::new(0, 0, 8)).unwrap().seq.length, 1.0);

        run_until(&mut seq, &mut song, &mut r, 11.05);

        let ons = r.note_ons();
        assert_eq!(ons.len(), 2);
        assert_eq!(ons[0].1, 10.0);
        assert_eq!(ons[1].1, 11.0);
        assert_eq!(r.note_offs(), vec![(ons[0].0, 11.0)]);
    }

    #[test]
    fn channel_is_monophonic() {
        let mut song = two_note_song();
        let mut r = OfflineRenderer::new();
        let mut seq = play(&mut song, &mut r);

        run_until(&mut seq, &mut song, &mut r, 0.9);
        assert_eq!(seq.voice_queue(0).unwrap().len(), 1);

        run_until(&mut seq, &mut song, &mut r, 1.1);
        assert_eq!(seq.voice_queue(0).unwrap().len(), 1);
        let first = song.event(EventRef::new(0, 0, 0)).unwrap();
        let second = song.event(EventRef::new(0, 0, 8)).unwrap();
        assert!(!first.seq.playing);
        assert!(first.id.is_none());
        assert!(second.seq.playing);
    }

    #[test]
    fn automation_does_not_kill_sustained_note() {
        let mut song = Song::with_channels("test", 1);
        let mut pat = Pattern::new(16, 1);
        pat.set_step(0, 0, note());
        pat.set_step(0, 4, Event::automation(0, ModuleParam::new(ParamId(1), 50.0, true)));
        let idx = song.add_pattern(pat);
        song.add_order(idx);

        let mut r = OfflineRenderer::new();
        let mut seq = play(&mut song, &mut r);
        run_until(&mut seq, &mut song, &mut r, 0.7);

        let ons = r.note_ons();
        assert_eq!(ons.len(), 2);
        // one-shot released after one step
        assert_eq!(r.note_offs(), vec![(ons[1].0, 0.5 + 0.125)]);
        assert_eq!(seq.voice_queue(0).unwrap().len(), 1);
        assert_eq!(song.event(EventRef::new(0, 0, 4)).unwrap().seq.mp_length, 0.125);
    }

    #[test]
    fn note_off_step_releases_previous_note() {
        let mut song = Song::with_channels("test", 1);
        let mut pat = Pattern::new(16, 1);
        pat.set_step(0, 0, note());
        pat.set_step(0, 8, Event::note_off(0));
        let idx = song.add_pattern(pat);
        song.add_order(idx);

        let mut r = OfflineRenderer::new();
        let mut seq = play(&mut song, &mut r);
        run_until(&mut seq, &mut song, &mut r, 1.2);

        let ons = r.note_ons();
        assert_eq!(r.note_offs(), vec![(ons[0].0, 1.0), (ons[1].0, 1.125)]);
        assert!(seq.voice_queue(0).unwrap().is_empty());
    }

    #[test]
    fn single_note_retriggers_every_bar() {
        let mut song = Song::with_channels("test", 1);
        let mut pat = Pattern::new(16, 1);
        pat.set_step(0, 0, note());
        let idx = song.add_pattern(pat);
        song.add_order(idx);

        let mut r = OfflineRenderer::new();
        let mut seq = play(&mut song, &mut r);
        run_until(&mut seq, &mut song, &mut r, 2.1);

        let ons = r.note_ons();
        assert_eq!(ons.iter().map(|&(_, t)| t).collect::<Vec<_>>(), vec![0.0, 2.0]);
        assert_ne!(ons[0].0, ons[1].0);
        // the old voice is stopped exactly once
        assert_eq!(r.note_offs(), vec![(ons[0].0, 2.0)]);
        assert_eq!(seq.live_voice_count(), 1);
    }

    #[test]
    fn repeated_set_position_is_a_no_op() {
        let mut song = two_note_song();
        let mut r = OfflineRenderer::new();
        let mut seq = play(&mut song, &mut r);
        run_until(&mut seq, &mut song, &mut r, 0.5);

        let transport = *seq.transport();
        let lengths: Vec<f64> = song.patterns[0].events(0).map(|(_, e)| e.seq.length).collect();
        let calls = r.calls().len();

        for _ in 0..2 {
            let time = seq.transport().next_note_time;
            seq.set_position(&mut song, &mut r, 0, time);
        }
        seq.collect(&mut song, &mut r);

        assert_eq!(*seq.transport(), transport);
        let after: Vec<f64> = song.patterns[0].events(0).map(|(_, e)| e.seq.length).collect();
        assert_eq!(after, lengths);
        assert_eq!(r.calls().len(), calls);
    }

    /// Order [0, 1]: pattern 0 plays channel 0, pattern 1 plays channel 1.
    fn two_order_song() -> Song {
        let mut song = Song::with_channels("test", 2);
        let mut a = Pattern::new(16, 2);
        a.set_step(0, 0, note());
        let mut b = Pattern::new(16, 2);
        b.set_step(1, 0, note());
        let a = song.add_pattern(a);
        let b = song.add_pattern(b);
        song.add_order(a);
        song.add_order(b);
        song
    }

    #[test]
    fn returning_to_order_zero_releases_later_voices() {
        let mut song = two_order_song();
        let mut r = OfflineRenderer::new();
        let mut seq = play(&mut song, &mut r);

        run_until(&mut seq, &mut song, &mut r, 2.1);
        assert_eq!(seq.position(&song).order_index, 1);
        let ch1 = seq.voice_queue(1).unwrap().iter().next().copied().unwrap();
        assert_eq!(ch1.start_measure, 1);

        run_until(&mut seq, &mut song, &mut r, 4.1);
        assert_eq!(seq.position(&song).order_index, 0);
        assert!(seq.voice_queue(1).unwrap().is_empty());
        assert!(r.note_offs().contains(&(ch1.voice, 4.0)));
    }

    #[test]
    fn looping_stays_on_order_index() {
        let mut song = two_order_song();
        let mut r = OfflineRenderer::new();
        let mut seq = Sequencer::prepare(&song, SequencerConfig::default());
        seq.set_looping(&mut song, true);
        assert!(seq.set_playing(&mut song, &mut r, true));

        run_until(&mut seq, &mut song, &mut r, 4.1);
        assert_eq!(seq.position(&song).order_index, 0);
        let times: Vec<f64> = r.note_ons().iter().map(|&(_, t)| t).collect();
        assert_eq!(times, vec![0.0, 2.0, 4.0]);
        // looping onto itself: a full measure
        assert_eq!(song.event(EventRef::new(0, 0, 0)).unwrap().seq.length, 2.0);
    }

    #[test]
    fn goto_while_playing_syncs_to_next_tick() {
        let mut song = two_order_song();
        let mut r = OfflineRenderer::new();
        let mut seq = play(&mut song, &mut r);
        run_until(&mut seq, &mut song, &mut r, 0.5);

        let next = seq.transport().next_note_time;
        seq.goto_next_pattern(&mut song, &mut r);
        assert_eq!(seq.position(&song).order_index, 1);
        assert_eq!(seq.transport().measure_start_time, next);

        r.advance_by(0.05);
        seq.collect(&mut song, &mut r);
        let last = r.calls().iter().rev().find_map(|c| match *c {
            RenderCall::NoteOn { channel, at, .. } => Some((channel, at)),
            _ => None,
        });
        assert_eq!(last, Some((1, next)));
    }

    #[test]
    fn goto_while_stopped_only_moves_display() {
        let mut song = two_order_song();
        let mut r = OfflineRenderer::new();
        let mut seq = Sequencer::prepare(&song, SequencerConfig::default());

        seq.goto_next_pattern(&mut song, &mut r);
        assert_eq!(seq.position(&song).order_index, 1);
        seq.goto_next_pattern(&mut song, &mut r);
        assert_eq!(seq.position(&song).order_index, 1);
        seq.goto_previous_pattern(&mut song, &mut r);
        seq.goto_previous_pattern(&mut song, &mut r);
        assert_eq!(seq.position(&song).order_index, 0);
        seq.goto_pattern(&mut song, &mut r, 99);
        assert_eq!(seq.position(&song).pattern_index, 1);
        assert!(r.calls().is_empty());
    }

    #[test]
    fn stop_cancels_releases_and_silences_voices() {
        let mut song = two_note_song();
        let mut r = OfflineRenderer::new();
        let mut seq = play(&mut song, &mut r);
        run_until(&mut seq, &mut song, &mut r, 0.85);
        assert_eq!(seq.pending_release_count(), 1);

        assert!(seq.set_playing(&mut song, &mut r, false));
        assert!(!seq.is_playing());
        assert_eq!(r.pending_callbacks(), 0);
        assert_eq!(seq.pending_release_count(), 0);
        assert_eq!(seq.live_voice_count(), 0);

        let now = r.now();
        let offs = r.note_offs();
        assert_eq!(offs.len(), 2);
        assert!(offs.iter().all(|&(_, t)| t == now));
        assert!(song.patterns[0].events(0).all(|(_, e)| !e.seq.playing && e.id.is_none()));

        let calls = r.calls().len();
        run_until(&mut seq, &mut song, &mut r, 3.0);
        assert_eq!(r.calls().len(), calls);
    }

    #[test]
    fn unavailable_renderer_refuses_to_play() {
        let mut song = two_note_song();
        let mut r = OfflineRenderer::new();
        r.set_available(false);
        let mut seq = Sequencer::prepare(&song, SequencerConfig::default());

        assert!(!seq.set_playing(&mut song, &mut r, true));
        assert!(!seq.is_playing());
    }

    #[test]
    fn recording_events_are_skipped() {
        let mut song = two_note_song();
        song.event_mut(EventRef::new(0, 0, 0)).unwrap().recording = true;
        let mut r = OfflineRenderer::new();
        let mut seq = play(&mut song, &mut r);

        run_until(&mut seq, &mut song, &mut r, 1.1);
        assert_eq!(r.note_ons().iter().map(|&(_, t)| t).collect::<Vec<_>>(), vec![1.0]);
    }

    #[test]
    fn direct_double_enqueue_triggers_once() {
        let mut song = two_note_song();
        let mut r = OfflineRenderer::new();
        let mut seq = play(&mut song, &mut r);

        let at = EventRef::new(0, 0, 0);
        seq.enqueue_event(&mut song, &mut r, at, 0, 0);
        seq.enqueue_event(&mut song, &mut r, at, 0, 0);
        assert_eq!(r.note_ons().len(), 1);
    }

    #[test]
    fn edits_are_picked_up_after_invalidation() {
        let mut song = two_note_song();
        let mut r = OfflineRenderer::new();
        let mut seq = play(&mut song, &mut r);
        run_until(&mut seq, &mut song, &mut r, 0.2);

        song.patterns[0].set_step(0, 12, note());
        seq.invalidate_channel_cache(&mut song, None);

        assert_eq!(song.event(EventRef::new(0, 0, 8)).unwrap().seq.length, 0.5);
        assert_eq!(song.event(EventRef::new(0, 0, 12)).unwrap().seq.length, 0.5);
        run_until(&mut seq, &mut song, &mut r, 1.6);
        assert_eq!(r.note_ons().last().map(|&(_, t)| t), Some(1.5));
    }

    #[test]
    fn recording_stops_at_end_of_song() {
        let mut song = two_note_song();
        let mut r = OfflineRenderer::new();
        let mut seq = Sequencer::prepare(&song, SequencerConfig::default());
        seq.set_recording(true);
        assert!(seq.set_playing(&mut song, &mut r, true));

        run_until(&mut seq, &mut song, &mut r, 2.1);
        assert!(!seq.is_playing());
        assert_eq!(seq.live_voice_count(), 0);
    }

    #[test]
    fn count_in_bar_clicks_without_sequencing() {
        let config = SequencerConfig {
            metronome: MetronomeConfig { enabled: false, count_in: true, subdivision: Subdivision::Quarter },
            ..SequencerConfig::default()
        };
        let mut song = two_note_song();
        let mut r = OfflineRenderer::new();
        let mut seq = Sequencer::prepare(&song, config);
        seq.set_recording(true);
        assert!(seq.set_playing(&mut song, &mut r, true));

        run_until(&mut seq, &mut song, &mut r, 2.1);
        assert!(seq.count_in_complete());
        assert_eq!(seq.transport().first_measure_start_time, 2.0);
        assert_eq!(r.note_ons().first().map(|&(_, t)| t), Some(2.0));

        let clicks: Vec<(bool, f64)> = r
            .calls()
            .iter()
            .filter_map(|c| match *c {
                RenderCall::Click { accent, at } => Some((accent, at)),
                _ => None,
            })
            .collect();
        assert_eq!(clicks, vec![(true, 0.0), (false, 0.5), (false, 1.0), (false, 1.5)]);
    }

    #[test]
    fn arming_mid_song_keeps_playing_through() {
        let config = SequencerConfig {
            metronome: MetronomeConfig { enabled: false, count_in: true, subdivision: Subdivision::Quarter },
            ..SequencerConfig::default()
        };
        let mut song = Song::with_channels("test", 1);
        let mut pat = Pattern::new(16, 1);
        for step in (0..16).step_by(4) {
            pat.set_step(0, step, note());
        }
        let idx = song.add_pattern(pat);
        song.add_order(idx);
        song.add_order(idx);

        let mut r = OfflineRenderer::new();
        let mut seq = Sequencer::prepare(&song, config);
        assert!(seq.set_playing(&mut song, &mut r, true));
        run_until(&mut seq, &mut song, &mut r, 0.6);
        seq.set_recording(true);
        run_until(&mut seq, &mut song, &mut r, 2.1);

        let times: Vec<f64> = r.note_ons().iter().map(|&(_, t)| t).collect();
        assert_eq!(times, vec![0.0, 0.5, 1.0, 1.5, 2.0]);
        assert_eq!(seq.transport().active_order_index, 1);
        assert!(!r.calls().iter().any(|c| matches!(c, RenderCall::Click { .. })));
    }

    #[test]
    fn fine_patterns_raise_tick_resolution() {
        let mut song = Song::with_channels("test", 1);
        let mut pat = Pattern::new(128, 1);
        for step in 0..16 {
            pat.set_step(0, step, note());
        }
        let idx = song.add_pattern(pat);
        song.add_order(idx);

        let mut r = OfflineRenderer::new();
        let mut seq = play(&mut song, &mut r);
        assert_eq!(seq.transport().step_precision(), 128);
        run_until(&mut seq, &mut song, &mut r, 0.3);

        let ons = r.note_ons();
        assert_eq!(ons.len(), 16);
        for (step, &(_, at)) in ons.iter().enumerate() {
            assert!((at - step as f64 * 2.0 / 128.0).abs() < 1e-9);
        }
    }

    /// Jam song: pattern 0 plays both channels from step 0, pattern 1 only
    /// has channel 0 on step 4.
    fn jam_song() -> Song {
        let mut song = Song::with_channels("jam", 2);
        song.song_type = SongType::Jam;
        let mut a = Pattern::new(16, 2);
        a.set_step(0, 0, note());
        a.set_step(1, 0, note());
        let mut b = Pattern::new(16, 2);
        b.set_step(0, 4, note());
        let a = song.add_pattern(a);
        song.add_pattern(b);
        song.add_order(a);
        song
    }

    #[test]
    fn jam_switch_waits_for_bar_boundary() {
        let mut song = jam_song();
        let mut r = OfflineRenderer::new();
        let mut seq = play(&mut song, &mut r);
        run_until(&mut seq, &mut song, &mut r, 1.0);

        assert!(seq.set_jam_channel_position(&song, 0, 1));
        let ch = seq.jam_channel(0).copied().unwrap();
        assert_eq!((ch.active_pattern_index, ch.next_pattern_index), (0, 1));

        run_until(&mut seq, &mut song, &mut r, 2.5);
        assert_eq!(seq.jam_channel(0).unwrap().active_pattern_index, 1);

        let ch0: Vec<f64> = r
            .calls()
            .iter()
            .filter_map(|c| match *c {
                RenderCall::NoteOn { channel: 0, at, .. } => Some(at),
                _ => None,
            })
            .collect();
        assert_eq!(ch0, vec![0.0, 2.5]);
    }

    #[test]
    fn jam_switch_to_silent_channel_halts_it() {
        let mut song = jam_song();
        let mut r = OfflineRenderer::new();
        let mut seq = play(&mut song, &mut r);
        run_until(&mut seq, &mut song, &mut r, 1.0);
        let voice = seq.voice_queue(1).unwrap().iter().next().unwrap().voice;

        assert!(seq.set_jam_channel_position(&song, 1, 1));
        run_until(&mut seq, &mut song, &mut r, 2.1);

        assert!(seq.voice_queue(1).unwrap().is_empty());
        assert!(r.note_offs().contains(&(voice, 2.0)));
    }

    #[test]
    fn locked_jam_channel_ignores_requests() {
        let song = jam_song();
        let mut seq = Sequencer::prepare(&song, SequencerConfig::default());
        seq.set_jam_channel_lock(0, true);

        assert!(!seq.set_jam_channel_position(&song, 0, 1));
        assert!(!seq.set_jam_channel_position(&song, 1, 7));
        assert!(seq.set_jam_channel_position(&song, 1, 1));
        // stopped: applied at once
        assert_eq!(seq.jam_channel(1).unwrap().active_pattern_index, 1);
    }

    #[test]
    fn flushed_jam_channel_is_released_on_next_tick() {
        let mut song = jam_song();
        let mut r = OfflineRenderer::new();
        let mut seq = play(&mut song, &mut r);
        run_until(&mut seq, &mut song, &mut r, 0.5);
        assert_eq!(seq.voice_queue(0).unwrap().len(), 1);

        let at = seq.transport().next_note_time;
        seq.flush_jam_channel(0);
        r.advance_by(0.05);
        seq.collect(&mut song, &mut r);

        assert!(seq.voice_queue(0).unwrap().is_empty());
        assert_eq!(r.next_callback_time(), Some(at));
        assert_eq!(seq.voice_queue(1).unwrap().len(), 1);
    }
}
