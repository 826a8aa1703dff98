//! Per-channel event ordering and duration resolution.
//!
//! Every channel keeps its populated steps in timeline order (pattern index,
//! then step) as a doubly-linked list in a slot arena. An event's `length`
//! is the distance to its successor, wrapping from the last event back to
//! the first, so editing a step only ever changes its own length and its
//! predecessor's.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::ops::Bound::{Excluded, Unbounded};
use slotmap::{new_key_type, SlotMap};

use crate::event::{Event, EventRef};
use crate::song::Song;
use crate::timing::{distance, measure_length, set_position};

new_key_type! {
    /// Handle of a node in a channel's linked order.
    pub struct LinkKey;
}

/// Position of a step in timeline order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StepPos {
    pub pattern: usize,
    pub step: u16,
}

impl StepPos {
    pub const fn new(pattern: usize, step: u16) -> Self {
        Self { pattern, step }
    }

    fn event_ref(self, channel: usize) -> EventRef {
        EventRef::new(self.pattern, channel, self.step)
    }
}

#[derive(Clone, Debug)]
struct LinkNode {
    at: StepPos,
    prev: Option<LinkKey>,
    next: Option<LinkKey>,
}

/// Linked timeline order for one channel.
#[derive(Clone, Debug, Default)]
pub struct ChannelTimeline {
    nodes: SlotMap<LinkKey, LinkNode>,
    /// Locates a node by position; the links give O(1) neighbours.
    index: BTreeMap<StepPos, LinkKey>,
    head: Option<LinkKey>,
    tail: Option<LinkKey>,
}

impl ChannelTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, at: StepPos) -> bool {
        self.index.contains_key(&at)
    }

    pub fn first(&self) -> Option<StepPos> {
        self.head.map(|k| self.nodes[k].at)
    }

    pub fn last(&self) -> Option<StepPos> {
        self.tail.map(|k| self.nodes[k].at)
    }

    /// The event linked before `at`, without wrapping.
    pub fn previous(&self, at: StepPos) -> Option<StepPos> {
        let key = *self.index.get(&at)?;
        self.nodes[key].prev.map(|k| self.nodes[k].at)
    }

    /// The event linked after `at`, without wrapping.
    pub fn next(&self, at: StepPos) -> Option<StepPos> {
        let key = *self.index.get(&at)?;
        self.nodes[key].next.map(|k| self.nodes[k].at)
    }

    /// The event that ends `at`: its successor, or the head once the
    /// timeline wraps around.
    pub fn successor(&self, at: StepPos) -> Option<StepPos> {
        self.next(at).or_else(|| self.contains(at).then(|| self.first()).flatten())
    }

    /// The event that `at` ends: its predecessor, or the tail once the
    /// timeline wraps around.
    pub fn predecessor(&self, at: StepPos) -> Option<StepPos> {
        self.previous(at).or_else(|| self.contains(at).then(|| self.last()).flatten())
    }

    /// Iterate in timeline order.
    pub fn iter(&self) -> impl Iterator<Item = StepPos> + '_ {
        let mut cursor = self.head;
        core::iter::from_fn(move || {
            let key = cursor?;
            let node = &self.nodes[key];
            cursor = node.next;
            Some(node.at)
        })
    }

    /// Link a position before the first later position, or as the new tail.
    /// Linking an existing position is a no-op.
    pub fn insert(&mut self, at: StepPos) -> LinkKey {
        if let Some(&key) = self.index.get(&at) {
            return key;
        }

        let successor = self
            .index
            .range((Excluded(at), Unbounded))
            .next()
            .map(|(_, &k)| k);

        let key = match successor {
            Some(next) => {
                let prev = self.nodes[next].prev;
                let key = self.nodes.insert(LinkNode { at, prev, next: Some(next) });
                self.nodes[next].prev = Some(key);
                match prev {
                    Some(p) => self.nodes[p].next = Some(key),
                    None => self.head = Some(key),
                }
                key
            }
            None => {
                let prev = self.tail;
                let key = self.nodes.insert(LinkNode { at, prev, next: None });
                match prev {
                    Some(p) => self.nodes[p].next = Some(key),
                    None => self.head = Some(key),
                }
                self.tail = Some(key);
                key
            }
        };

        self.index.insert(at, key);
        key
    }

    /// Unlink a position. Returns its former (previous, next) neighbours,
    /// or None if it was not linked.
    pub fn remove(&mut self, at: StepPos) -> Option<(Option<StepPos>, Option<StepPos>)> {
        let key = self.index.remove(&at)?;
        let node = self.nodes.remove(key)?;

        match node.prev {
            Some(p) => self.nodes[p].next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(n) => self.nodes[n].prev = node.prev,
            None => self.tail = node.prev,
        }

        let prev = node.prev.map(|k| self.nodes[k].at);
        let next = node.next.map(|k| self.nodes[k].at);
        Some((prev, next))
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
    }
}

/// Linked orders for every channel of a song.
#[derive(Clone, Debug, Default)]
pub struct EventTimeline {
    channels: Vec<ChannelTimeline>,
}

impl EventTimeline {
    pub fn new(num_channels: usize) -> Self {
        Self {
            channels: (0..num_channels).map(|_| ChannelTimeline::new()).collect(),
        }
    }

    /// Build and fully resolve the timeline of a song.
    pub fn from_song(song: &mut Song) -> Self {
        let mut timeline = Self::new(song.channel_count());
        timeline.link_events(song);
        timeline
    }

    pub fn channel(&self, channel: usize) -> Option<&ChannelTimeline> {
        self.channels.get(channel)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Rebuild every channel from scratch and resolve all lengths.
    ///
    /// Needed whenever patterns are replaced wholesale or the tempo changes.
    pub fn link_events(&mut self, song: &mut Song) {
        let num_channels = song.channel_count();
        self.channels.resize_with(num_channels, ChannelTimeline::new);
        for list in &mut self.channels {
            list.clear();
        }

        let tempo = song.meta.tempo;
        for (pattern_index, pattern) in song.patterns.iter_mut().enumerate() {
            let steps = pattern.steps;
            for (channel, lane) in pattern.channels.iter_mut().enumerate().take(num_channels) {
                for (step, slot) in lane.iter_mut().enumerate() {
                    if let Some(event) = slot {
                        set_position(event, steps, pattern_index, step as u16, tempo, None);
                        self.channels[channel].insert(StepPos::new(pattern_index, step as u16));
                    }
                }
            }
        }

        for channel in 0..num_channels {
            let positions: Vec<StepPos> = self.channels[channel].iter().collect();
            for at in positions {
                self.resolve_length(song, channel, at);
            }
        }

        log::debug!(
            target: "timeline",
            "linked {} events over {} channels",
            self.channels.iter().map(ChannelTimeline::len).sum::<usize>(),
            num_channels
        );
    }

    /// Link (or relink) the event at one step.
    ///
    /// The event's predecessor is re-resolved against it; its own length is
    /// resolved against its current successor. Empty steps are ignored.
    pub fn link_event(&mut self, song: &mut Song, channel: usize, at: StepPos) {
        let tempo = song.meta.tempo;
        let Some(pattern) = song.patterns.get_mut(at.pattern) else {
            return;
        };
        let steps = pattern.steps;
        let Some(event) = pattern.step_mut(channel, at.step) else {
            return;
        };
        let Some(list) = self.channels.get_mut(channel) else {
            return;
        };

        set_position(event, steps, at.pattern, at.step, tempo, None);
        list.insert(at);

        if let Some(prev) = list.predecessor(at) {
            self.resolve_length(song, channel, prev);
        }
        // Also resolve the new event against its successor, so an insert
        // leaves the same lengths a full relink would.
        self.resolve_length(song, channel, at);
    }

    /// Remove the event at one step and heal the channel order.
    ///
    /// The old predecessor is re-resolved against the node that used to
    /// follow the removed one. Returns the removed event.
    pub fn clear_event(&mut self, song: &mut Song, channel: usize, at: StepPos) -> Option<Event> {
        let removed = song
            .patterns
            .get_mut(at.pattern)
            .and_then(|p| p.clear_step(channel, at.step));

        let list = self.channels.get_mut(channel)?;
        let Some((prev, _next)) = list.remove(at) else {
            return removed;
        };

        // The tail's predecessor wraps to the new tail.
        let prev = prev.or_else(|| list.last());
        if let Some(prev) = prev {
            self.resolve_length(song, channel, prev);
        }
        removed
    }

    /// Recompute `length` and `end_measure` of the event at `at` from its
    /// (wrapping) successor.
    fn resolve_length(&self, song: &mut Song, channel: usize, at: StepPos) {
        let Some(list) = self.channels.get(channel) else {
            return;
        };
        let Some(next) = list.successor(at) else {
            return;
        };
        let pattern_count = song.patterns.len();
        let measure = measure_length(song.meta.tempo);

        let Some(next_offset) = song
            .event(next.event_ref(channel))
            .map(|e| e.seq.start_measure_offset)
        else {
            return;
        };
        let Some(event) = song.event_mut(at.event_ref(channel)) else {
            log::trace!(target: "timeline", "stale link at {:?} ch {}", at, channel);
            return;
        };

        let bars_ahead = if next > at {
            next.pattern - at.pattern
        } else {
            // Wrapped around (or the only event in the channel).
            pattern_count - at.pattern + next.pattern
        };

        event.seq.length = distance(event.seq.start_measure_offset, next_offset, bars_ahead, measure);
        event.seq.end_measure = at.pattern + bars_ahead;
    }
}
