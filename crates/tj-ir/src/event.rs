//! Step events and their derived scheduling state.

/// What a step does when the sequencer reaches it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Action {
    /// Placeholder, never scheduled
    #[default]
    None,
    /// Start a sustained note
    NoteOn,
    /// Stop whatever sounds in the channel
    NoteOff,
    /// Automation only, no note
    AutoOnly,
}

impl Action {
    /// True for actions that affect a channel's sounding note.
    pub const fn is_note(self) -> bool {
        matches!(self, Action::NoteOn | Action::NoteOff)
    }
}

/// Pitch class of a note.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Note {
    #[default]
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl Note {
    const ALL: [Note; 12] = [
        Note::C,
        Note::CSharp,
        Note::D,
        Note::DSharp,
        Note::E,
        Note::F,
        Note::FSharp,
        Note::G,
        Note::GSharp,
        Note::A,
        Note::ASharp,
        Note::B,
    ];

    /// Create a note from a semitone (wraps modulo 12).
    pub const fn from_semitone(semitone: u8) -> Self {
        Self::ALL[(semitone % 12) as usize]
    }

    /// Semitone within the octave (0-11).
    pub const fn semitone(self) -> u8 {
        self as u8
    }

    /// MIDI note number at the given octave (C-4 = 60).
    pub const fn midi(self, octave: u8) -> u8 {
        (octave + 1) * 12 + self.semitone()
    }

    /// Display name ("C", "C#", ...).
    pub const fn name(self) -> &'static str {
        match self {
            Note::C => "C",
            Note::CSharp => "C#",
            Note::D => "D",
            Note::DSharp => "D#",
            Note::E => "E",
            Note::F => "F",
            Note::FSharp => "F#",
            Note::G => "G",
            Note::GSharp => "G#",
            Note::A => "A",
            Note::ASharp => "A#",
            Note::B => "B",
        }
    }
}

/// Identifier of an automatable instrument module parameter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParamId(pub u16);

/// Automation instruction attached to a step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModuleParam {
    /// Target parameter
    pub module: ParamId,
    /// Value in percent (0-100)
    pub value: f32,
    /// Ramp linearly from the previous value over one step
    pub glide: bool,
}

impl ModuleParam {
    pub fn new(module: ParamId, value: f32, glide: bool) -> Self {
        Self {
            module,
            value: value.clamp(0.0, 100.0),
            glide,
        }
    }
}

/// Opaque token correlating a triggered event with its voice in the renderer.
///
/// Minted from a monotonic counter at trigger time, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VoiceId(pub u64);

/// Derived timing for an event. All durations are in seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SeqState {
    /// Handed to the renderer and not yet confirmed stopped
    pub playing: bool,
    /// Measure (pattern index) the event starts in
    pub start_measure: usize,
    /// Seconds from the start of its measure
    pub start_measure_offset: f64,
    /// Measure the event stops sounding in
    pub end_measure: usize,
    /// Sounding duration: distance to the next event in the channel
    pub length: f64,
    /// Duration of an automation glide (one pattern step)
    pub mp_length: f64,
}

/// A populated step.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub action: Action,
    pub note: Note,
    pub octave: u8,
    /// Instrument slot (index into `Song::instruments`)
    pub instrument: u8,
    /// Being written by live recording, skipped by the scheduler
    pub recording: bool,
    /// Optional automation applied together with the note
    pub mp: Option<ModuleParam>,
    pub seq: SeqState,
    /// Live voice token, assigned by the scheduler
    pub id: Option<VoiceId>,
}

impl Event {
    /// Create a note-on event.
    pub fn note_on(note: Note, octave: u8, instrument: u8) -> Self {
        Self {
            action: Action::NoteOn,
            note,
            octave,
            instrument,
            recording: false,
            mp: None,
            seq: SeqState::default(),
            id: None,
        }
    }

    /// Create a note-off event.
    pub fn note_off(instrument: u8) -> Self {
        Self {
            action: Action::NoteOff,
            ..Self::note_on(Note::C, 0, instrument)
        }
    }

    /// Create an automation-only event.
    pub fn automation(instrument: u8, mp: ModuleParam) -> Self {
        Self {
            action: Action::AutoOnly,
            mp: Some(mp),
            ..Self::note_on(Note::C, 0, instrument)
        }
    }

    /// Attach automation to this event.
    pub fn with_param(mut self, mp: ModuleParam) -> Self {
        self.mp = Some(mp);
        self
    }

    /// MIDI note number of this event.
    pub fn midi_note(&self) -> u8 {
        self.note.midi(self.octave)
    }
}

/// Address of a step slot in the song.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventRef {
    /// Index into `Song::patterns`
    pub pattern: usize,
    pub channel: usize,
    pub step: u16,
}

impl EventRef {
    pub const fn new(pattern: usize, channel: usize, step: u16) -> Self {
        Self { pattern, channel, step }
    }
}
