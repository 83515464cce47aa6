#![allow(dead_code)]

use encore_ports::midi::{MidiError, MidiMessage, MidiSink, SharedSink, CC_ALL_NOTES_OFF};
use encore_ports::types::Channel;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::time::Instant;

/// Records every send with its offset on the (paused) tokio clock.
pub struct RecordingSink {
    start: Instant,
    sent: Mutex<Vec<(u128, MidiMessage)>>,
    fail_note_on: Option<u8>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start: Instant::now(),
            sent: Mutex::new(Vec::new()),
            fail_note_on: None,
        })
    }

    /// Fails every note-on for `pitch`; everything else is recorded.
    pub fn failing_on(pitch: u8) -> Arc<Self> {
        Arc::new(Self {
            start: Instant::now(),
            sent: Mutex::new(Vec::new()),
            fail_note_on: Some(pitch),
        })
    }

    pub fn shared(self: &Arc<Self>) -> SharedSink {
        self.clone()
    }

    pub fn messages(&self) -> Vec<MidiMessage> {
        self.sent.lock().iter().map(|(_, m)| *m).collect()
    }

    /// `(millis, message)` pairs in send order.
    pub fn timed(&self) -> Vec<(u128, MidiMessage)> {
        self.sent.lock().clone()
    }

    pub fn note_ons(&self) -> Vec<u8> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                MidiMessage::NoteOn { note, .. } => Some(note),
                _ => None,
            })
            .collect()
    }

    pub fn note_offs(&self) -> Vec<(u8, Channel)> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                MidiMessage::NoteOff { note, channel } => Some((note, channel)),
                _ => None,
            })
            .collect()
    }

    pub fn all_notes_off_channels(&self) -> Vec<Channel> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                MidiMessage::ControlChange {
                    control: CC_ALL_NOTES_OFF,
                    channel,
                    ..
                } => Some(channel),
                _ => None,
            })
            .collect()
    }

    fn record(&self, message: MidiMessage) -> Result<(), MidiError> {
        let elapsed = self.start.elapsed().as_millis();
        self.sent.lock().push((elapsed, message));
        Ok(())
    }
}

impl MidiSink for RecordingSink {
    fn note_on(&self, note: u8, velocity: u8, channel: Channel) -> Result<(), MidiError> {
        if self.fail_note_on == Some(note) {
            return Err(MidiError::Backend(format!("note {} rejected", note)));
        }
        self.record(MidiMessage::NoteOn {
            note,
            velocity,
            channel,
        })
    }

    fn note_off(&self, note: u8, channel: Channel) -> Result<(), MidiError> {
        self.record(MidiMessage::NoteOff { note, channel })
    }

    fn program_change(&self, program: u8, channel: Channel) -> Result<(), MidiError> {
        self.record(MidiMessage::ProgramChange { program, channel })
    }

    fn control_change(&self, control: u8, value: u8, channel: Channel) -> Result<(), MidiError> {
        self.record(MidiMessage::ControlChange {
            control,
            value,
            channel,
        })
    }
}
