//! Wall-clock renderer.
//!
//! Keeps every timestamped start and stop in a timeline and applies them
//! once the monotonic clock reaches them. Sounding voices are reported
//! through `log`; a synthesis backend hangs off `process`.

use std::collections::BTreeMap;
use std::time::Instant;

use tj_engine::{AudioRenderer, CallbackHandle, CallbackQueue, NoteTrigger, Time};
use tj_ir::{Action, ModuleParam, VoiceId};

/// A voice between its start and its release.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SoundingVoice {
    pub voice: VoiceId,
    pub channel: usize,
    pub action: Action,
    pub midi_note: u8,
    pub instrument: u8,
    /// Instrument volume (0-100)
    pub volume: u8,
    pub mp: Option<ModuleParam>,
    pub started: Time,
}

#[derive(Clone, Copy, Debug)]
enum Scheduled {
    Start(SoundingVoice),
    Stop(VoiceId),
    Click(bool),
}

/// Renderer driven by [`Instant`].
pub struct SystemRenderer {
    epoch: Instant,
    running: bool,
    timeline: Vec<(Time, Scheduled)>,
    sounding: BTreeMap<VoiceId, SoundingVoice>,
    callbacks: CallbackQueue,
}

impl Default for SystemRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemRenderer {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            running: false,
            timeline: Vec::new(),
            sounding: BTreeMap::new(),
            callbacks: CallbackQueue::new(),
        }
    }

    /// Start the output. Until then the renderer reports itself unavailable.
    pub fn start(&mut self) {
        self.running = true;
        log::info!("system renderer started");
    }

    /// Stop the output and drop everything scheduled.
    pub fn stop(&mut self) {
        self.running = false;
        self.timeline.clear();
        self.sounding.clear();
        self.callbacks.clear();
        log::info!("system renderer stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Apply every start and stop that is due. Returns how many were applied.
    pub fn process(&mut self) -> usize {
        let now = self.now();
        let due = self.timeline.partition_point(|(t, _)| *t <= now);
        let applied: Vec<(Time, Scheduled)> = self.timeline.drain(..due).collect();

        for &(at, item) in &applied {
            match item {
                Scheduled::Start(voice) => match voice.action {
                    Action::NoteOn => {
                        log::info!(
                            "ch{} note {} inst {} vol {} at {:.3}s",
                            voice.channel,
                            voice.midi_note,
                            voice.instrument,
                            voice.volume,
                            at
                        );
                        self.sounding.insert(voice.voice, voice);
                    }
                    Action::AutoOnly => {
                        if let Some(mp) = voice.mp {
                            log::debug!("ch{} param {} -> {:.1}%", voice.channel, mp.module.0, mp.value);
                        }
                    }
                    Action::NoteOff | Action::None => {
                        log::trace!("ch{} cut at {:.3}s", voice.channel, at);
                    }
                },
                Scheduled::Stop(voice) => {
                    if let Some(v) = self.sounding.remove(&voice) {
                        log::debug!("ch{} release {:?} after {:.3}s", v.channel, voice, at - v.started);
                    }
                }
                Scheduled::Click(accent) => {
                    log::info!("{}", if accent { "TICK" } else { "tick" });
                }
            }
        }
        applied.len()
    }

    /// Voices currently sounding.
    pub fn sounding(&self) -> impl Iterator<Item = &SoundingVoice> {
        self.sounding.values()
    }

    pub fn sounding_count(&self) -> usize {
        self.sounding.len()
    }

    /// Start and stop items not yet due.
    pub fn pending(&self) -> usize {
        self.timeline.len()
    }

    fn insert(&mut self, at: Time, item: Scheduled) {
        let index = self.timeline.partition_point(|(t, _)| t.total_cmp(&at).is_le());
        self.timeline.insert(index, (at, item));
    }
}

impl AudioRenderer for SystemRenderer {
    fn is_available(&self) -> bool {
        self.running
    }

    fn now(&self) -> Time {
        self.epoch.elapsed().as_secs_f64()
    }

    fn note_on(&mut self, trigger: &NoteTrigger<'_>, at: Time) {
        let (volume, muted) = trigger.instrument.map_or((100, false), |i| (i.volume, i.muted));
        if muted {
            log::trace!("ch{} muted, dropping {:?}", trigger.channel, trigger.voice);
            return;
        }
        let voice = SoundingVoice {
            voice: trigger.voice,
            channel: trigger.channel,
            action: trigger.event.action,
            midi_note: trigger.event.midi_note(),
            instrument: trigger.event.instrument,
            volume,
            mp: trigger.event.mp,
            started: at,
        };
        self.insert(at, Scheduled::Start(voice));
    }

    fn note_off(&mut self, voice: VoiceId, at: Time) {
        self.insert(at, Scheduled::Stop(voice));
    }

    fn click(&mut self, accent: bool, at: Time) {
        self.insert(at, Scheduled::Click(accent));
    }

    fn schedule_callback(&mut self, handle: CallbackHandle, at: Time) {
        self.callbacks.push(handle, at);
    }

    fn cancel_callback(&mut self, handle: CallbackHandle) {
        self.callbacks.cancel(handle);
    }

    fn take_due_callbacks(&mut self, due: &mut Vec<CallbackHandle>) {
        let now = self.now();
        self.callbacks.pop_due(now, due);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tj_engine::VoiceRegistry;
    use tj_ir::{Event, EventRef, InstrumentConfig, Note};

    fn trigger<'a>(voice: VoiceId, event: &'a Event, instrument: &'a InstrumentConfig) -> NoteTrigger<'a> {
        NoteTrigger { voice, channel: 0, event, instrument: Some(instrument) }
    }

    #[test]
    fn unavailable_until_started() {
        let mut r = SystemRenderer::new();
        assert!(!r.is_available());
        r.start();
        assert!(r.is_available());
        r.stop();
        assert!(!r.is_running());
    }

    #[test]
    fn due_items_apply_in_time_order() {
        let mut r = SystemRenderer::new();
        r.start();
        let event = Event::note_on(Note::A, 4, 0);
        let inst = InstrumentConfig::new("lead");

        r.note_on(&trigger(VoiceId(1), &event, &inst), 0.0);
        r.note_on(&trigger(VoiceId(2), &event, &inst), 1.0e6);
        assert_eq!(r.process(), 1);
        assert_eq!(r.sounding_count(), 1);
        assert_eq!(r.sounding().next().map(|v| v.midi_note), Some(69));
        assert_eq!(r.pending(), 1);

        r.note_off(VoiceId(1), 0.0);
        r.process();
        assert_eq!(r.sounding_count(), 0);
    }

    #[test]
    fn only_note_starts_count_as_sounding() {
        let mut r = SystemRenderer::new();
        r.start();
        let inst = InstrumentConfig::new("bass");
        let cut = Event::note_off(0);

        r.note_on(&trigger(VoiceId(1), &cut, &inst), 0.0);
        assert_eq!(r.process(), 1);
        assert_eq!(r.sounding_count(), 0);
    }

    #[test]
    fn muted_instrument_is_dropped() {
        let mut r = SystemRenderer::new();
        let event = Event::note_on(Note::C, 4, 0);
        let mut inst = InstrumentConfig::new("muted");
        inst.muted = true;

        r.note_on(&trigger(VoiceId(1), &event, &inst), 0.0);
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn callbacks_report_when_due() {
        let mut registry = VoiceRegistry::new();
        let voice = registry.mint(EventRef::new(0, 0, 0));
        let handle = registry.schedule(tj_engine::PendingRelease {
            voice,
            at: EventRef::new(0, 0, 0),
            channel: 0,
            time: 0.0,
        });
        let later = registry.schedule(tj_engine::PendingRelease {
            voice,
            at: EventRef::new(0, 0, 0),
            channel: 0,
            time: 1.0e6,
        });

        let mut r = SystemRenderer::new();
        r.schedule_callback(handle, 0.0);
        r.schedule_callback(later, 1.0e6);
        let mut due = Vec::new();
        r.take_due_callbacks(&mut due);
        assert_eq!(due, vec![handle]);

        r.cancel_callback(later);
        r.stop();
        r.take_due_callbacks(&mut due);
        assert_eq!(due.len(), 1);
    }
}
