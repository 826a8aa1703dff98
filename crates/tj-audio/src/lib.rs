//! Audio renderer backends for the trackjam sequencer.

mod system;

pub use system::{SoundingVoice, SystemRenderer};
