//! Patterns: per-channel step grids.

use alloc::vec;
use alloc::vec::Vec;

use crate::event::Event;

/// A pattern holding one step lane per channel.
///
/// Every lane has exactly `steps` slots; `None` marks an empty step.
#[derive(Clone, Debug, PartialEq)]
pub struct Pattern {
    /// Step subdivision of one measure (typically 16, 32 or 64)
    pub steps: u16,
    /// Step lanes, indexed `channels[channel][step]`
    pub channels: Vec<Vec<Option<Event>>>,
}

impl Pattern {
    /// Create an empty pattern.
    pub fn new(steps: u16, channels: usize) -> Self {
        Self {
            steps,
            channels: vec![vec![None; steps as usize]; channels],
        }
    }

    /// Number of channel lanes.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Get the event at a step, if any.
    pub fn step(&self, channel: usize, step: u16) -> Option<&Event> {
        self.channels.get(channel)?.get(step as usize)?.as_ref()
    }

    /// Get a mutable reference to the event at a step, if any.
    pub fn step_mut(&mut self, channel: usize, step: u16) -> Option<&mut Event> {
        self.channels.get_mut(channel)?.get_mut(step as usize)?.as_mut()
    }

    /// Get the raw slot at a step (None if out of range).
    pub fn slot_mut(&mut self, channel: usize, step: u16) -> Option<&mut Option<Event>> {
        self.channels.get_mut(channel)?.get_mut(step as usize)
    }

    /// Place an event, returning the previous occupant. Out-of-range steps are ignored.
    pub fn set_step(&mut self, channel: usize, step: u16, event: Event) -> Option<Event> {
        self.slot_mut(channel, step)?.replace(event)
    }

    /// Empty a step, returning its event.
    pub fn clear_step(&mut self, channel: usize, step: u16) -> Option<Event> {
        self.slot_mut(channel, step)?.take()
    }

    /// Iterate over the populated steps of a channel in step order.
    pub fn events(&self, channel: usize) -> impl Iterator<Item = (u16, &Event)> + '_ {
        self.channels
            .get(channel)
            .into_iter()
            .flat_map(|lane| lane.iter().enumerate())
            .filter_map(|(step, slot)| slot.as_ref().map(|e| (step as u16, e)))
    }

    /// Returns true if the channel has no events at all.
    pub fn channel_is_empty(&self, channel: usize) -> bool {
        self.events(channel).next().is_none()
    }

    /// Returns true if nothing in the channel would start or stop a note.
    pub fn channel_is_silent(&self, channel: usize) -> bool {
        !self.events(channel).any(|(_, e)| e.action.is_note())
    }
}
