use encore_ports::midi::{MidiError, MidiMessage, MidiOutputPort, MidiSink, SharedSink};
use encore_ports::types::{Channel, DeviceId, MidiOutputDevice};
use midir::{MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use std::sync::Arc;

pub struct MidirMidiOutputPort {
    client_name: String,
}

impl MidirMidiOutputPort {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
        }
    }

    fn create_midi_out(&self) -> Result<MidiOutput, MidiError> {
        MidiOutput::new(&self.client_name).map_err(|e| MidiError::Backend(e.to_string()))
    }

    pub fn device_id(index: usize, name: &str) -> DeviceId {
        DeviceId(format!("midir:{}:{}", index, name))
    }

    /// Resolve `device_id` against the current port list. Besides full ids,
    /// a bare port name (or a unique prefix of one) is accepted.
    fn find_port(
        midi_out: &MidiOutput,
        device_id: &DeviceId,
    ) -> Result<(midir::MidiOutputPort, String), MidiError> {
        let mut by_name = Vec::new();
        for (index, port) in midi_out.ports().into_iter().enumerate() {
            let name = midi_out
                .port_name(&port)
                .unwrap_or_else(|_| "Unknown Output".to_string());
            if &Self::device_id(index, &name) == device_id || name == device_id.0 {
                return Ok((port, name));
            }
            if name.starts_with(&device_id.0) {
                by_name.push((port, name));
            }
        }

        if by_name.len() == 1 {
            if let Some(found) = by_name.pop() {
                return Ok(found);
            }
        }
        Err(MidiError::DeviceNotFound(device_id.to_string()))
    }
}

impl Default for MidirMidiOutputPort {
    fn default() -> Self {
        Self::new("Encore")
    }
}

impl MidiOutputPort for MidirMidiOutputPort {
    fn list_outputs(&self) -> Result<Vec<MidiOutputDevice>, MidiError> {
        let midi_out = self.create_midi_out()?;
        let devices = midi_out
            .ports()
            .iter()
            .enumerate()
            .map(|(index, port)| {
                let name = midi_out
                    .port_name(port)
                    .unwrap_or_else(|_| "Unknown Output".to_string());
                MidiOutputDevice {
                    id: Self::device_id(index, &name),
                    name,
                    is_available: true,
                }
            })
            .collect();
        Ok(devices)
    }

    fn open_output(&self, device_id: &DeviceId) -> Result<SharedSink, MidiError> {
        let midi_out = self.create_midi_out()?;
        let (port, name) = Self::find_port(&midi_out, device_id)?;
        let connection = midi_out
            .connect(&port, "encore-midi-output")
            .map_err(|e| MidiError::DeviceUnavailable(format!("{}: {}", name, e)))?;
        log::info!("opened MIDI output '{}'", name);

        Ok(Arc::new(MidirMidiSink {
            name,
            connection: Mutex::new(Some(connection)),
        }))
    }
}

/// Send capability over one midir connection. The connection is not
/// thread-safe, so every send goes through the lock.
pub struct MidirMidiSink {
    name: String,
    connection: Mutex<Option<MidiOutputConnection>>,
}

impl MidirMidiSink {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn send_bytes(&self, message: MidiMessage) -> Result<(), MidiError> {
        let mut guard = self.connection.lock();
        let connection = guard.as_mut().ok_or(MidiError::NotConnected)?;
        connection
            .send(&message.to_bytes())
            .map_err(|e| MidiError::Backend(e.to_string()))
    }
}

impl MidiSink for MidirMidiSink {
    fn note_on(&self, note: u8, velocity: u8, channel: Channel) -> Result<(), MidiError> {
        self.send_bytes(MidiMessage::NoteOn {
            note,
            velocity,
            channel,
        })
    }

    fn note_off(&self, note: u8, channel: Channel) -> Result<(), MidiError> {
        self.send_bytes(MidiMessage::NoteOff { note, channel })
    }

    fn program_change(&self, program: u8, channel: Channel) -> Result<(), MidiError> {
        self.send_bytes(MidiMessage::ProgramChange { program, channel })
    }

    fn control_change(&self, control: u8, value: u8, channel: Channel) -> Result<(), MidiError> {
        self.send_bytes(MidiMessage::ControlChange {
            control,
            value,
            channel,
        })
    }
}

impl Drop for MidirMidiSink {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.get_mut().take() {
            let _ = connection.close();
            log::debug!("closed MIDI output '{}'", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_ids_carry_index_and_name() {
        assert_eq!(
            MidirMidiOutputPort::device_id(2, "IAC Driver Bus 1"),
            DeviceId("midir:2:IAC Driver Bus 1".to_string())
        );
    }
}
