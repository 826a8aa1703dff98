//! Playback engine for the trackjam sequencer.
//!
//! Walks the song ahead of the render clock and hands timestamped voice
//! starts and releases to an [`AudioRenderer`].

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod cache;
mod config;
mod event_queue;
mod jam;
mod metronome;
pub mod offline;
mod registry;
pub mod renderer;
pub mod scheduler;
mod transport;
mod voice_queue;

pub use cache::{calculate_jam_channel_event_lengths, cache_tracker_channels, ActiveChannels, CachedStep};
pub use config::SequencerConfig;
pub use event_queue::CallbackQueue;
pub use jam::{JamChannel, JamState};
pub use metronome::{Metronome, MetronomeConfig, Subdivision};
pub use offline::{OfflineRenderer, RenderCall};
pub use registry::{CallbackHandle, PendingRelease, VoiceRegistry};
pub use renderer::{AudioRenderer, NoteTrigger, Time};
pub use scheduler::Sequencer;
pub use transport::Transport;
pub use voice_queue::{QueuedVoice, VoiceQueue, VOICE_QUEUE_CAPACITY};
