//! Core song types for the trackjam sequencer.
//!
//! This crate defines the musical data model (songs, patterns, step
//! events) and the per-channel event timeline that derives how long
//! every event sounds. The scheduling engine reads these types and
//! editors mutate them.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod edit;
mod event;
mod pattern;
mod position;
pub mod song;
pub mod timeline;
pub mod timing;

pub use edit::Edit;
pub use event::{Action, Event, EventRef, ModuleParam, Note, ParamId, SeqState, VoiceId};
pub use pattern::Pattern;
pub use position::PlaybackPosition;
pub use song::{InstrumentConfig, Song, SongMeta, SongType};
pub use timeline::{ChannelTimeline, EventTimeline, LinkKey, StepPos};
pub use timing::{distance, measure_length, set_position, step_length, step_offset};
