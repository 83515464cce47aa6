use encore_ports::midi::{MidiError, MidiSink, CC_ALL_NOTES_OFF};
use encore_ports::types::{Channel, CHANNEL_COUNT};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};

/// One sounding pitch of one run. Whoever releases it first owes the note-off.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoteTicket {
    pub id: u64,
    pub pitch: u8,
    pub channel: Channel,
}

#[derive(Default)]
struct LedgerState {
    next_id: u64,
    open: BTreeMap<u64, NoteTicket>,
    touched: BTreeSet<Channel>,
}

/// Notes sounding in a single playback run, plus every channel the run has
/// sent on. Created per run and dropped with it.
#[derive(Default)]
pub struct ActiveNotes {
    state: Mutex<LedgerState>,
}

impl ActiveNotes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch(&self, channel: Channel) {
        self.state.lock().touched.insert(channel);
    }

    pub fn open(&self, pitch: u8, channel: Channel) -> NoteTicket {
        let mut state = self.state.lock();
        let ticket = NoteTicket {
            id: state.next_id,
            pitch,
            channel,
        };
        state.next_id += 1;
        state.open.insert(ticket.id, ticket);
        state.touched.insert(channel);
        ticket
    }

    /// `true` exactly once per ticket: the caller must now send the note-off.
    pub fn release(&self, ticket: &NoteTicket) -> bool {
        self.state.lock().open.remove(&ticket.id).is_some()
    }

    /// Take every ticket still open, oldest first.
    pub fn drain(&self) -> Vec<NoteTicket> {
        let open = std::mem::take(&mut self.state.lock().open);
        open.into_values().collect()
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().open.len()
    }

    pub fn touched_channels(&self) -> Vec<Channel> {
        self.state.lock().touched.iter().copied().collect()
    }

    /// Send a note-off for every open ticket, then CC 123 on every touched
    /// channel. Send failures are logged and the pass continues.
    pub fn release_all(&self, sink: &dyn MidiSink) {
        let remaining = self.drain();
        for ticket in &remaining {
            if let Err(e) = sink.note_off(ticket.pitch, ticket.channel) {
                log::warn!(
                    "cleanup note-off failed: note {} channel {}: {}",
                    ticket.pitch,
                    ticket.channel,
                    e
                );
            }
        }

        let channels = self.touched_channels();
        if let Err(e) = all_notes_off(sink, channels.iter().copied()) {
            log::warn!("cleanup all-notes-off failed: {}", e);
        }
        log::debug!(
            "cleanup: {} pending note-off(s), all-notes-off on {} channel(s)",
            remaining.len(),
            channels.len()
        );
    }
}

pub fn all_channels() -> impl Iterator<Item = Channel> {
    0..CHANNEL_COUNT
}

/// CC 123 value 0 on each channel. Every channel is attempted; the first
/// failure is returned.
pub fn all_notes_off(
    sink: &dyn MidiSink,
    channels: impl IntoIterator<Item = Channel>,
) -> Result<(), MidiError> {
    let mut first_error = None;
    for channel in channels {
        if let Err(e) = sink.control_change(CC_ALL_NOTES_OFF, 0, channel) {
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
