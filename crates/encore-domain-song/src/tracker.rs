//! Tracker grid notation.
//!
//! A document is an optional header block followed by a pipe-delimited grid:
//!
//! ```text
//! TITLE: Scale
//! TEMPO: 120
//! SPEED: 4
//! INSTRUMENT 0: Acoustic Grand Piano
//!
//! |Ch1       |Ch2       |
//! |----------|----------|
//! |C-4 00 64 |.....     | Row 00
//! |D-4 00 -- |E-3 .. 40 | Row 01
//! ```
//!
//! Every row lasts `1/speed` of a beat and every note lasts exactly one row.
//! Anything that does not parse is skipped; compiling never fails.

use crate::model::Song;
use encore_ports::types::{Channel, Seconds};
use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_TRACKER_TEMPO: u32 = 120;
pub const DEFAULT_TRACKER_SPEED: u32 = 4;
/// Velocity used when a cell has no volume column.
pub const DEFAULT_TRACKER_VELOCITY: u8 = 64;

const EMPTY_NOTE_TOKENS: [&str; 3] = ["...", "---", "....."];
const EMPTY_FIELD_TOKENS: [&str; 2] = ["..", "--"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackerCell {
    pub row: u32,
    pub channel: Channel,
    pub note: u8,
    pub instrument: Option<u8>,
    /// Tracker scale, 0..=64.
    pub volume: Option<u8>,
}

impl TrackerCell {
    pub fn velocity(&self) -> u8 {
        match self.volume {
            Some(volume) => (volume as u16 * 2).min(127) as u8,
            None => DEFAULT_TRACKER_VELOCITY,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrackerDocument {
    pub title: String,
    pub tempo: u32,
    pub speed: u32,
    pub instruments: BTreeMap<u8, String>,
    pub channel_names: Vec<String>,
    pub cells: Vec<TrackerCell>,
}

impl Default for TrackerDocument {
    fn default() -> Self {
        Self {
            title: "Untitled".to_string(),
            tempo: DEFAULT_TRACKER_TEMPO,
            speed: DEFAULT_TRACKER_SPEED,
            instruments: BTreeMap::new(),
            channel_names: Vec::new(),
            cells: Vec::new(),
        }
    }
}

impl TrackerDocument {
    pub fn seconds_per_row(&self) -> Seconds {
        (60.0 / self.tempo as f64) / self.speed as f64
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TrackerCommand {
    ProgramChange {
        program: u8,
        time: Seconds,
        channel: Channel,
    },
    Note {
        pitch: u8,
        time: Seconds,
        duration: Seconds,
        velocity: u8,
        channel: Channel,
    },
}

#[derive(Clone, Debug)]
pub struct CompiledTracker {
    pub song: Song,
    pub title: String,
    pub channel_count: usize,
    pub note_count: usize,
}

/// `C-4`, `F#5`, `Bb_3`, `E4` → MIDI pitch, `(octave + 1) * 12 + semitone`.
pub fn parse_note_token(token: &str) -> Option<u8> {
    let mut chars = token.chars().peekable();
    let base: i32 = match chars.next()? {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    let accidental = match chars.peek() {
        Some('#') => 1,
        Some('b') => -1,
        _ => 0,
    };
    if accidental != 0 {
        chars.next();
    }
    if matches!(chars.peek(), Some('-') | Some('_')) {
        chars.next();
    }
    let octave = chars.next()?.to_digit(10)? as i32;

    // semitone stays inside the table (Cb/B# are not names it knows)
    let semitone = base + accidental;
    if !(0..12).contains(&semitone) {
        return None;
    }
    u8::try_from((octave + 1) * 12 + semitone)
        .ok()
        .filter(|pitch| *pitch <= 127)
}

/// `(note, instrument, volume)` of one grid cell; placeholders are `None`, not zero.
pub fn parse_cell(cell: &str) -> (Option<u8>, Option<u8>, Option<u8>) {
    let mut parts = cell.split_whitespace();

    let note = parts
        .next()
        .filter(|token| !EMPTY_NOTE_TOKENS.contains(token))
        .and_then(|token| {
            let note = parse_note_token(token);
            if note.is_none() {
                log::debug!("tracker: skipping note token '{}'", token);
            }
            note
        });
    let instrument = parts.next().and_then(parse_field);
    let volume = parts.next().and_then(parse_field);

    (note, instrument, volume)
}

fn parse_field(token: &str) -> Option<u8> {
    if EMPTY_FIELD_TOKENS.contains(&token) {
        return None;
    }
    token.parse().ok()
}

fn parse_header_number(field: &str, value: &str, default: u32) -> u32 {
    match value.trim().parse::<u32>() {
        Ok(parsed) if parsed > 0 => parsed,
        _ => {
            log::warn!(
                "tracker: invalid {} '{}', using {}",
                field,
                value.trim(),
                default
            );
            default
        }
    }
}

fn parse_header_line(doc: &mut TrackerDocument, line: &str) {
    if let Some(title) = line.strip_prefix("TITLE:") {
        doc.title = title.trim().to_string();
    } else if let Some(tempo) = line.strip_prefix("TEMPO:") {
        doc.tempo = parse_header_number("tempo", tempo, DEFAULT_TRACKER_TEMPO);
    } else if let Some(speed) = line.strip_prefix("SPEED:") {
        doc.speed = parse_header_number("speed", speed, DEFAULT_TRACKER_SPEED);
    } else if let Some(rest) = line.strip_prefix("INSTRUMENT") {
        let Some((number, name)) = rest.split_once(':') else {
            return;
        };
        match number.trim().parse::<u8>() {
            Ok(number) => {
                doc.instruments.insert(number, name.trim().to_string());
            }
            Err(_) => log::debug!("tracker: skipping instrument line '{}'", line),
        }
    }
}

/// Split a grid line into its cells and the free text after the last pipe.
fn split_grid_line(line: &str) -> (Vec<&str>, &str) {
    let parts: Vec<&str> = line.split('|').collect();
    if parts.len() < 2 {
        return (Vec::new(), "");
    }
    let trailing = parts[parts.len() - 1];
    let cells = parts[1..parts.len() - 1].iter().map(|c| c.trim()).collect();
    (cells, trailing)
}

/// `Row 12` anywhere in the text → 12.
fn row_label(text: &str) -> Option<u32> {
    let start = text.find("Row")?;
    text[start + 3..]
        .split_whitespace()
        .next()
        .and_then(|digits| digits.parse().ok())
}

pub fn parse_tracker(text: &str) -> TrackerDocument {
    let mut doc = TrackerDocument::default();
    let mut lines = text.trim().lines().map(str::trim).peekable();

    while let Some(line) = lines.next_if(|line| !line.starts_with('|')) {
        parse_header_line(&mut doc, line);
    }

    let Some(header) = lines.next() else {
        return doc;
    };
    let (channel_names, _) = split_grid_line(header);
    doc.channel_names = channel_names.iter().map(|name| name.to_string()).collect();
    let channel_count = doc.channel_names.len();

    lines.next_if(|line| line.starts_with("|---"));

    let mut row: u32 = 0;
    for line in lines {
        if !line.starts_with('|') {
            if !line.is_empty() {
                log::debug!("tracker: skipping line outside the grid '{}'", line);
            }
            continue;
        }

        let (cells, trailing) = split_grid_line(line);
        let label = row_label(trailing);
        if label.is_none() && cells.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        if let Some(label) = label {
            row = label;
        }

        for (channel, cell) in cells.iter().enumerate().take(channel_count) {
            if let (Some(note), instrument, volume) = parse_cell(cell) {
                doc.cells.push(TrackerCell {
                    row,
                    channel: channel as Channel,
                    note,
                    instrument,
                    volume,
                });
            }
        }
        row += 1;
    }

    doc
}

fn instrument_program(number: u8, name: &str) -> u8 {
    let digits: String = name
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(number)
}

pub fn compile(doc: &TrackerDocument) -> Vec<TrackerCommand> {
    let seconds_per_row = doc.seconds_per_row();
    let mut commands = Vec::with_capacity(doc.instruments.len() + doc.cells.len());

    for (number, name) in &doc.instruments {
        commands.push(TrackerCommand::ProgramChange {
            program: instrument_program(*number, name),
            time: 0.0,
            channel: *number,
        });
    }

    let mut cells: Vec<&TrackerCell> = doc.cells.iter().collect();
    cells.sort_by_key(|cell| (cell.row, cell.channel));
    for cell in cells {
        commands.push(TrackerCommand::Note {
            pitch: cell.note,
            time: cell.row as f64 * seconds_per_row,
            duration: seconds_per_row,
            velocity: cell.velocity(),
            channel: cell.channel,
        });
    }

    commands
}

pub fn compile_song(name: &str, text: &str) -> CompiledTracker {
    let doc = parse_tracker(text);
    let commands = compile(&doc);

    let mut song = Song::new(name, doc.tempo);
    let mut channels = BTreeSet::new();
    let mut note_count = 0;
    for command in &commands {
        match *command {
            TrackerCommand::ProgramChange {
                program,
                time,
                channel,
            } => {
                channels.insert(channel);
                song.add_program_change(program, time, channel);
            }
            TrackerCommand::Note {
                pitch,
                time,
                duration,
                velocity,
                channel,
            } => {
                channels.insert(channel);
                note_count += 1;
                song.add_note(pitch, time, duration, velocity, channel);
            }
        }
    }

    log::info!(
        "compiled tracker '{}' ({}): {} notes on {} channel(s), {:.2}s",
        name,
        doc.title,
        note_count,
        channels.len(),
        song.duration()
    );

    CompiledTracker {
        song,
        title: doc.title,
        channel_count: channels.len(),
        note_count,
    }
}

pub const DEMO_TRACKER: &str = "TITLE: Happy Birthday
TEMPO: 125
SPEED: 4
INSTRUMENT 0: Acoustic Grand Piano
INSTRUMENT 1: String Ensemble 48
INSTRUMENT 2: Acoustic Bass 32

|Ch1      |Ch2      |Ch3      |
|---------|---------|---------|
|C-4 00 48|.....    |.....    | Row 00
|C-4 00 40|.....    |.....    | Row 02
|D-4 00 48|.....    |.....    | Row 04
|C-4 00 48|.....    |.....    | Row 08
|F-4 00 48|.....    |C-3 02 40| Row 12
|E-4 00 48|C-4 01 32|G-2 02 40| Row 16
|C-4 00 48|.....    |C-3 02 40| Row 24
|C-4 00 40|.....    |.....    | Row 26
|D-4 00 48|.....    |.....    | Row 28
|C-4 00 48|.....    |.....    | Row 32
|G-4 00 48|E-4 01 32|E-3 02 40| Row 36
|F-4 00 48|.....    |C-3 02 40| Row 40
|.....    |.....    |.....    | Row 47
";
