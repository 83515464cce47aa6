use crate::timeline::sort_timeline;
use encore_ports::types::{Channel, Seconds};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TEMPO: u32 = 120;
pub const DEFAULT_VELOCITY: u8 = 64;

fn default_velocity() -> u8 {
    DEFAULT_VELOCITY
}

/// One entry of a song's timeline. Times and durations are absolute seconds
/// from song start; numeric ranges are not validated here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Note {
        time: Seconds,
        #[serde(default)]
        channel: Channel,
        pitch: u8,
        #[serde(default = "default_velocity")]
        velocity: u8,
        #[serde(default)]
        duration: Seconds,
    },
    Chord {
        time: Seconds,
        #[serde(default)]
        channel: Channel,
        notes: Vec<u8>,
        #[serde(default = "default_velocity")]
        velocity: u8,
        #[serde(default)]
        duration: Seconds,
    },
    Rest {
        time: Seconds,
        #[serde(default)]
        channel: Channel,
        #[serde(default)]
        duration: Seconds,
    },
    ProgramChange {
        time: Seconds,
        #[serde(default)]
        channel: Channel,
        program: u8,
    },
    ControlChange {
        time: Seconds,
        #[serde(default)]
        channel: Channel,
        control: u8,
        value: u8,
    },
}

impl Event {
    pub fn time(&self) -> Seconds {
        match *self {
            Event::Note { time, .. }
            | Event::Chord { time, .. }
            | Event::Rest { time, .. }
            | Event::ProgramChange { time, .. }
            | Event::ControlChange { time, .. } => time,
        }
    }

    pub fn channel(&self) -> Channel {
        match *self {
            Event::Note { channel, .. }
            | Event::Chord { channel, .. }
            | Event::Rest { channel, .. }
            | Event::ProgramChange { channel, .. }
            | Event::ControlChange { channel, .. } => channel,
        }
    }

    /// `None` for the kinds that occupy no time.
    pub fn duration(&self) -> Option<Seconds> {
        match *self {
            Event::Note { duration, .. }
            | Event::Chord { duration, .. }
            | Event::Rest { duration, .. } => Some(duration),
            Event::ProgramChange { .. } | Event::ControlChange { .. } => None,
        }
    }

    pub fn end_time(&self) -> Option<Seconds> {
        self.duration().map(|duration| self.time() + duration)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SongFormatError {
    #[error("invalid song record: {0}")]
    Invalid(String),
}

/// Serialized form of a song, as exchanged at the boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SongRecord {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_tempo")]
    pub tempo: u32,
    #[serde(default)]
    pub duration: Seconds,
    #[serde(default)]
    pub events: Vec<Event>,
}

fn default_name() -> String {
    "Untitled".to_string()
}

fn default_tempo() -> u32 {
    DEFAULT_TEMPO
}

/// Append-only event log with a derived duration and a cached sorted view.
#[derive(Clone, Debug)]
pub struct Song {
    name: String,
    tempo: u32,
    events: Vec<Event>,
    duration: Seconds,
    sorted: Vec<Event>,
    is_sorted: bool,
}

impl Song {
    pub fn new(name: impl Into<String>, tempo: u32) -> Self {
        Self {
            name: name.into(),
            tempo,
            events: Vec::new(),
            duration: 0.0,
            sorted: Vec::new(),
            is_sorted: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn tempo(&self) -> u32 {
        self.tempo
    }

    pub fn duration(&self) -> Seconds {
        self.duration
    }

    /// Events in insertion order.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn is_sorted(&self) -> bool {
        self.is_sorted
    }

    pub fn push(&mut self, event: Event) {
        if let Some(end) = event.end_time() {
            if end > self.duration {
                self.duration = end;
            }
        }
        self.events.push(event);
        self.is_sorted = false;
    }

    pub fn add_note(
        &mut self,
        pitch: u8,
        time: Seconds,
        duration: Seconds,
        velocity: u8,
        channel: Channel,
    ) {
        self.push(Event::Note {
            time,
            channel,
            pitch,
            velocity,
            duration,
        });
    }

    pub fn add_chord(
        &mut self,
        notes: Vec<u8>,
        time: Seconds,
        duration: Seconds,
        velocity: u8,
        channel: Channel,
    ) {
        self.push(Event::Chord {
            time,
            channel,
            notes,
            velocity,
            duration,
        });
    }

    pub fn add_rest(&mut self, time: Seconds, duration: Seconds) {
        self.push(Event::Rest {
            time,
            channel: 0,
            duration: duration.max(0.0),
        });
    }

    pub fn add_program_change(&mut self, program: u8, time: Seconds, channel: Channel) {
        self.push(Event::ProgramChange {
            time,
            channel,
            program,
        });
    }

    pub fn add_control_change(&mut self, control: u8, value: u8, time: Seconds, channel: Channel) {
        self.push(Event::ControlChange {
            time,
            channel,
            control,
            value,
        });
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.sorted.clear();
        self.is_sorted = true;
        self.duration = 0.0;
    }

    /// Rebuild the sorted view from the current log.
    pub fn sort(&mut self) -> &[Event] {
        self.sorted = sort_timeline(&self.events);
        self.is_sorted = true;
        &self.sorted
    }

    /// Sorted view, rebuilt only when an append invalidated it.
    pub fn sorted_events(&mut self) -> &[Event] {
        if !self.is_sorted {
            return self.sort();
        }
        &self.sorted
    }

    /// Recompute the duration from scratch; used after importers edit events in place.
    pub(crate) fn recompute_duration(&mut self) {
        self.duration = self
            .events
            .iter()
            .filter_map(Event::end_time)
            .fold(0.0, f64::max);
    }

    pub(crate) fn events_mut(&mut self) -> &mut [Event] {
        self.is_sorted = false;
        &mut self.events
    }

    pub fn to_record(&self) -> SongRecord {
        SongRecord {
            name: self.name.clone(),
            tempo: self.tempo,
            duration: self.duration,
            events: self.events.clone(),
        }
    }

    /// Rebuild through `push`, so the stored duration is derived rather than trusted.
    pub fn from_record(record: SongRecord) -> Self {
        let mut song = Song::new(record.name, record.tempo);
        for event in record.events {
            song.push(event);
        }
        song
    }

    pub fn to_json(&self) -> Result<String, SongFormatError> {
        serde_json::to_string(&self.to_record()).map_err(|e| SongFormatError::Invalid(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, SongFormatError> {
        let record: SongRecord =
            serde_json::from_str(json).map_err(|e| SongFormatError::Invalid(e.to_string()))?;
        Ok(Song::from_record(record))
    }
}

impl Default for Song {
    fn default() -> Self {
        Song::new("Untitled", DEFAULT_TEMPO)
    }
}
