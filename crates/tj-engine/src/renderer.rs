//! The audio rendering layer as seen by the scheduler.

use alloc::vec::Vec;
use tj_ir::{Event, InstrumentConfig, VoiceId};

use crate::registry::CallbackHandle;

/// Seconds in the renderer's own monotonic clock domain.
pub type Time = f64;

/// Everything a renderer needs to start a voice.
#[derive(Clone, Copy, Debug)]
pub struct NoteTrigger<'a> {
    /// Token the voice is stopped with later
    pub voice: VoiceId,
    pub channel: usize,
    pub event: &'a Event,
    /// Instrument slot config, if the slot exists
    pub instrument: Option<&'a InstrumentConfig>,
}

/// Renders and kills voices at absolute times.
///
/// Every call carries an explicit timestamp; the renderer honours it with
/// its own clock, so scheduling jitter never becomes audio jitter.
pub trait AudioRenderer {
    /// Whether the runtime can produce audio at all.
    fn is_available(&self) -> bool {
        true
    }

    /// Current time of the render clock.
    fn now(&self) -> Time;

    /// Start a voice (note and/or automation) at `at`.
    fn note_on(&mut self, trigger: &NoteTrigger<'_>, at: Time);

    /// Release a voice at `at`.
    fn note_off(&mut self, voice: VoiceId, at: Time);

    /// Metronome click at `at`.
    fn click(&mut self, _accent: bool, _at: Time) {}

    /// Arrange for `handle` to be reported by `take_due_callbacks` once the
    /// render clock reaches `at`.
    fn schedule_callback(&mut self, handle: CallbackHandle, at: Time);

    /// Forget a scheduled callback.
    fn cancel_callback(&mut self, handle: CallbackHandle);

    /// Move every callback whose time has come into `due`, in time order.
    fn take_due_callbacks(&mut self, due: &mut Vec<CallbackHandle>);
}
