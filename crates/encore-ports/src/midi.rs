use crate::types::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const CC_ALL_NOTES_OFF: u8 = 123;

/// Outgoing channel message, one variant per send-capability kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MidiMessage {
    NoteOn {
        note: u8,
        velocity: u8,
        channel: Channel,
    },
    NoteOff {
        note: u8,
        channel: Channel,
    },
    ProgramChange {
        program: u8,
        channel: Channel,
    },
    ControlChange {
        control: u8,
        value: u8,
        channel: Channel,
    },
}

impl MidiMessage {
    pub fn channel(&self) -> Channel {
        match *self {
            MidiMessage::NoteOn { channel, .. }
            | MidiMessage::NoteOff { channel, .. }
            | MidiMessage::ProgramChange { channel, .. }
            | MidiMessage::ControlChange { channel, .. } => channel,
        }
    }

    /// Raw status + data bytes. Channel is masked to 4 bits, data bytes to 7.
    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            MidiMessage::NoteOn {
                note,
                velocity,
                channel,
            } => vec![0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MidiMessage::NoteOff { note, channel } => {
                vec![0x80 | (channel & 0x0F), note & 0x7F, 0]
            }
            MidiMessage::ProgramChange { program, channel } => {
                vec![0xC0 | (channel & 0x0F), program & 0x7F]
            }
            MidiMessage::ControlChange {
                control,
                value,
                channel,
            } => vec![0xB0 | (channel & 0x0F), control & 0x7F, value & 0x7F],
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MidiError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("no output connected")]
    NotConnected,
    #[error("backend error: {0}")]
    Backend(String),
}

/// Send capability: the only way the engine reaches a device.
///
/// Called concurrently from the scheduler and from every pending note-off
/// timer of a run; implementations must serialize access to non thread-safe
/// transports themselves.
pub trait MidiSink: Send + Sync {
    fn note_on(&self, note: u8, velocity: u8, channel: Channel) -> Result<(), MidiError>;
    fn note_off(&self, note: u8, channel: Channel) -> Result<(), MidiError>;
    fn program_change(&self, program: u8, channel: Channel) -> Result<(), MidiError>;
    fn control_change(&self, control: u8, value: u8, channel: Channel) -> Result<(), MidiError>;

    fn send(&self, message: MidiMessage) -> Result<(), MidiError> {
        match message {
            MidiMessage::NoteOn {
                note,
                velocity,
                channel,
            } => self.note_on(note, velocity, channel),
            MidiMessage::NoteOff { note, channel } => self.note_off(note, channel),
            MidiMessage::ProgramChange { program, channel } => {
                self.program_change(program, channel)
            }
            MidiMessage::ControlChange {
                control,
                value,
                channel,
            } => self.control_change(control, value, channel),
        }
    }
}

pub type SharedSink = Arc<dyn MidiSink>;

/// Device discovery and connection, owned by the connection-management side.
pub trait MidiOutputPort: Send + Sync {
    fn list_outputs(&self) -> Result<Vec<MidiOutputDevice>, MidiError>;

    /// Open an output; the returned sink stays valid until dropped.
    fn open_output(&self, device_id: &DeviceId) -> Result<SharedSink, MidiError>;
}
