use crate::midi_import::REFERENCE_US_PER_BEAT;
use crate::model::{Event, Song};
use encore_ports::types::Seconds;
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::path::Path;

pub const EXPORT_TICKS_PER_BEAT: u16 = 480;

#[derive(thiserror::Error, Debug)]
pub enum MidiExportError {
    #[error("io error: {0}")]
    Io(String),
    #[error("invalid song: {0}")]
    InvalidSong(String),
}

pub fn export_midi_path(song: &Song, path: &Path) -> Result<(), MidiExportError> {
    let data = export_midi_bytes(song)?;
    std::fs::write(path, data).map_err(|e| MidiExportError::Io(e.to_string()))
}

/// Single-track SMF at the same fixed 120 BPM reference the importer uses.
pub fn export_midi_bytes(song: &Song) -> Result<Vec<u8>, MidiExportError> {
    let mut events = build_events(song)?;
    // stable: equal ranks keep timeline order
    events.sort_by(|a, b| {
        a.tick
            .cmp(&b.tick)
            .then_with(|| track_event_rank(&a.kind).cmp(&track_event_rank(&b.kind)))
    });

    let mut track_events = Vec::with_capacity(events.len() + 2);
    track_events.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(REFERENCE_US_PER_BEAT))),
    });

    let mut last_tick: u32 = 0;
    for event in events {
        let delta = event.tick.saturating_sub(last_tick);
        last_tick = event.tick;
        track_events.push(TrackEvent {
            delta: u28::new(delta),
            kind: event.kind,
        });
    }

    track_events.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header: Header {
            format: Format::SingleTrack,
            timing: Timing::Metrical(u15::new(EXPORT_TICKS_PER_BEAT)),
        },
        tracks: vec![track_events],
    };

    let mut data = Vec::new();
    smf.write(&mut data)
        .map_err(|e| MidiExportError::Io(e.to_string()))?;
    Ok(data)
}

pub fn seconds_to_ticks(seconds: Seconds) -> u32 {
    let beats = seconds * 1_000_000.0 / REFERENCE_US_PER_BEAT as f64;
    (beats * EXPORT_TICKS_PER_BEAT as f64).round().max(0.0) as u32
}

struct MidiEvent {
    tick: u32,
    kind: TrackEventKind<'static>,
}

fn track_event_rank(kind: &TrackEventKind<'static>) -> u8 {
    match kind {
        TrackEventKind::Midi { message, .. } => match message {
            MidiMessage::ProgramChange { .. } | MidiMessage::Controller { .. } => 0,
            MidiMessage::NoteOff { .. } => 1,
            MidiMessage::NoteOn { .. } => 2,
            _ => 3,
        },
        _ => 4,
    }
}

fn midi(channel: u8, message: MidiMessage) -> TrackEventKind<'static> {
    TrackEventKind::Midi {
        channel: u4::new(channel & 0x0F),
        message,
    }
}

fn push_note(events: &mut Vec<MidiEvent>, pitch: u8, velocity: u8, channel: u8, start: u32, end: u32) {
    // note-offs sort before note-ons on a shared tick, so a note spans at least one tick
    let end = end.max(start + 1);
    let key = u7::new(pitch & 0x7F);
    events.push(MidiEvent {
        tick: start,
        kind: midi(
            channel,
            MidiMessage::NoteOn {
                key,
                vel: u7::new(velocity.clamp(1, 127)),
            },
        ),
    });
    events.push(MidiEvent {
        tick: end,
        kind: midi(
            channel,
            MidiMessage::NoteOff {
                key,
                vel: u7::new(64),
            },
        ),
    });
}

fn build_events(song: &Song) -> Result<Vec<MidiEvent>, MidiExportError> {
    let mut events = Vec::new();

    for event in song.events() {
        if !event.time().is_finite() || event.time() < 0.0 {
            return Err(MidiExportError::InvalidSong(format!(
                "event time {} out of range",
                event.time()
            )));
        }
        let start = seconds_to_ticks(event.time());
        match event {
            Event::Note {
                channel,
                pitch,
                velocity,
                duration,
                ..
            } => {
                let end = seconds_to_ticks(event.time() + duration.max(0.0));
                push_note(&mut events, *pitch, *velocity, *channel, start, end);
            }
            Event::Chord {
                channel,
                notes,
                velocity,
                duration,
                ..
            } => {
                let end = seconds_to_ticks(event.time() + duration.max(0.0));
                for pitch in notes {
                    push_note(&mut events, *pitch, *velocity, *channel, start, end);
                }
            }
            Event::Rest { .. } => {}
            Event::ProgramChange {
                channel, program, ..
            } => events.push(MidiEvent {
                tick: start,
                kind: midi(
                    *channel,
                    MidiMessage::ProgramChange {
                        program: u7::new(program & 0x7F),
                    },
                ),
            }),
            Event::ControlChange {
                channel,
                control,
                value,
                ..
            } => events.push(MidiEvent {
                tick: start,
                kind: midi(
                    *channel,
                    MidiMessage::Controller {
                        controller: u7::new(control & 0x7F),
                        value: u7::new(value & 0x7F),
                    },
                ),
            }),
        }
    }

    Ok(events)
}
