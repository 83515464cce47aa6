use crate::model::{Event, Song, DEFAULT_TEMPO};
use encore_ports::types::{Channel, Seconds};
use midly::{Format, Fps, MidiMessage, Smf, Timing, TrackEventKind};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Fixed 120 BPM reference. Tempo meta events in the file are not applied.
pub const REFERENCE_US_PER_BEAT: u32 = 500_000;

/// Duration given to a note until its note-off is seen.
pub const PLACEHOLDER_DURATION: Seconds = 0.1;

#[derive(thiserror::Error, Debug)]
pub enum MidiImportError {
    #[error("io error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("no tracks in {0}")]
    Empty(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MidiFileInfo {
    /// SMF format 0, 1 or 2.
    pub format: u8,
    pub track_count: usize,
    pub ticks_per_beat: u16,
}

#[derive(Clone, Debug)]
pub struct ImportedMidi {
    pub song: Song,
    pub info: MidiFileInfo,
}

/// Song name for a file: its stem, with `.mid`/`.midi` removed.
pub fn song_name_for_path(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".to_string())
}

pub fn import_midi_path(path: &Path, name: Option<&str>) -> Result<ImportedMidi, MidiImportError> {
    let name = name
        .map(str::to_string)
        .unwrap_or_else(|| song_name_for_path(path));
    let data = std::fs::read(path)
        .map_err(|e| MidiImportError::Io(format!("{}: {}", path.display(), e)))?;
    import_midi_bytes(&name, &data)
}

pub fn import_midi_bytes(name: &str, data: &[u8]) -> Result<ImportedMidi, MidiImportError> {
    let smf = Smf::parse(data).map_err(|e| MidiImportError::Parse(format!("{}: {}", name, e)))?;
    import_smf(name, &smf)
}

pub fn import_smf(name: &str, smf: &Smf<'_>) -> Result<ImportedMidi, MidiImportError> {
    if smf.tracks.is_empty() {
        return Err(MidiImportError::Empty(name.to_string()));
    }

    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(ticks) => ticks.as_int(),
        Timing::Timecode(fps, ticks_per_frame) => timecode_ticks_per_beat(fps, ticks_per_frame),
    };
    if ticks_per_beat == 0 {
        return Err(MidiImportError::Parse(format!("{}: zero ticks per beat", name)));
    }

    let mut song = Song::new(name, DEFAULT_TEMPO);
    // Indices into the song's event log of notes still waiting for a note-off.
    let mut open_notes: Vec<usize> = Vec::new();

    for track in &smf.tracks {
        let mut now: Seconds = 0.0;
        for event in track {
            let delta = event.delta.as_int();
            if delta > 0 {
                now += ticks_to_seconds(delta, ticks_per_beat);
            }

            let TrackEventKind::Midi { channel, message } = event.kind else {
                continue;
            };
            let channel: Channel = channel.as_int();

            match message {
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                    open_notes.push(song.len());
                    song.add_note(key.as_int(), now, PLACEHOLDER_DURATION, vel.as_int(), channel);
                }
                MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                    close_note(&mut song, &mut open_notes, key.as_int(), channel, now);
                }
                MidiMessage::ProgramChange { program } => {
                    song.add_program_change(program.as_int(), now, channel);
                }
                MidiMessage::Controller { controller, value } => {
                    song.add_control_change(controller.as_int(), value.as_int(), now, channel);
                }
                _ => {}
            }
        }
    }

    if !open_notes.is_empty() {
        log::debug!(
            "{}: {} note(s) never closed, keeping placeholder duration",
            name,
            open_notes.len()
        );
    }

    song.recompute_duration();
    song.sort();

    let format = match smf.header.format {
        Format::SingleTrack => 0,
        Format::Parallel => 1,
        Format::Sequential => 2,
    };

    log::info!(
        "imported MIDI '{}': format {}, {} track(s), {} events, {:.2}s",
        name,
        format,
        smf.tracks.len(),
        song.len(),
        song.duration()
    );

    Ok(ImportedMidi {
        song,
        info: MidiFileInfo {
            format,
            track_count: smf.tracks.len(),
            ticks_per_beat,
        },
    })
}

pub fn ticks_to_seconds(ticks: u32, ticks_per_beat: u16) -> Seconds {
    ticks as f64 * REFERENCE_US_PER_BEAT as f64 / ticks_per_beat as f64 / 1_000_000.0
}

/// Scan backwards for the most recently opened note with this pitch and channel
/// and stretch it to `now`. With several overlapping notes of the same pitch the
/// pairing is ambiguous; the most recent open one wins.
fn close_note(song: &mut Song, open_notes: &mut Vec<usize>, key: u8, channel: Channel, now: Seconds) {
    let events = song.events_mut();
    let found = open_notes.iter().rposition(|&index| {
        matches!(
            events[index],
            Event::Note { pitch, channel: ch, .. } if pitch == key && ch == channel
        )
    });

    let Some(slot) = found else {
        log::debug!("unmatched note-off: note {} channel {} at {:.3}s", key, channel, now);
        return;
    };

    let index = open_notes.remove(slot);
    if let Event::Note { time, duration, .. } = &mut events[index] {
        *duration = (now - *time).max(0.0);
    }
}

fn timecode_ticks_per_beat(fps: Fps, ticks_per_frame: u8) -> u16 {
    let ticks_per_frame = ticks_per_frame.max(1) as u16;
    match fps {
        Fps::Fps24 => 24 * ticks_per_frame,
        Fps::Fps25 => 25 * ticks_per_frame,
        Fps::Fps29 | Fps::Fps30 => 30 * ticks_per_frame,
    }
}
