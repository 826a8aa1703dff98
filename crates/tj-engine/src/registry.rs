//! Voice tokens and pending release callbacks.
//!
//! The session owns every outstanding release until it fires or is
//! cancelled; nothing relies on a callback staying alive by itself.

use alloc::collections::BTreeMap;
use slotmap::{new_key_type, SlotMap};
use tj_ir::{EventRef, VoiceId};

use crate::renderer::Time;

new_key_type! {
    /// Handle of a scheduled release callback.
    pub struct CallbackHandle;
}

/// A voice release waiting for the render clock.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PendingRelease {
    pub voice: VoiceId,
    /// Event the voice was triggered from
    pub at: EventRef,
    pub channel: usize,
    /// When the voice stops
    pub time: Time,
}

/// Live voices and scheduled releases of a playback session.
#[derive(Clone, Debug)]
pub struct VoiceRegistry {
    pending: SlotMap<CallbackHandle, PendingRelease>,
    live: BTreeMap<VoiceId, EventRef>,
    next_id: u64,
}

impl Default for VoiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceRegistry {
    pub fn new() -> Self {
        Self {
            pending: SlotMap::with_key(),
            live: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Mint a fresh voice token for an event and mark it live.
    pub fn mint(&mut self, at: EventRef) -> VoiceId {
        let id = VoiceId(self.next_id);
        self.next_id += 1;
        self.live.insert(id, at);
        id
    }

    /// Retire a voice. Returns true only the first time, so a voice is
    /// never stopped twice.
    pub fn release(&mut self, voice: VoiceId) -> bool {
        self.live.remove(&voice).is_some()
    }

    pub fn is_live(&self, voice: VoiceId) -> bool {
        self.live.contains_key(&voice)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Register a release and return the handle to schedule it under.
    pub fn schedule(&mut self, release: PendingRelease) -> CallbackHandle {
        self.pending.insert(release)
    }

    /// Claim a fired release. None for cancelled or unknown handles.
    pub fn take(&mut self, handle: CallbackHandle) -> Option<PendingRelease> {
        self.pending.remove(handle)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Remove every pending release.
    pub fn drain_pending(&mut self) -> impl Iterator<Item = (CallbackHandle, PendingRelease)> + '_ {
        self.pending.drain()
    }

    /// Remove every live voice.
    pub fn drain_live(&mut self) -> impl Iterator<Item = (VoiceId, EventRef)> {
        core::mem::take(&mut self.live).into_iter()
    }
}
