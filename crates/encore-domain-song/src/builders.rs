use crate::model::{Song, DEFAULT_TEMPO, DEFAULT_VELOCITY};
use encore_ports::types::Seconds;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scale {
    #[default]
    Major,
    Minor,
    Pentatonic,
    Blues,
    Chromatic,
}

impl Scale {
    /// Semitone offsets from the root, ending on the octave.
    pub fn intervals(self) -> &'static [u8] {
        match self {
            Scale::Major => &[0, 2, 4, 5, 7, 9, 11, 12],
            Scale::Minor => &[0, 2, 3, 5, 7, 8, 10, 12],
            Scale::Pentatonic => &[0, 2, 4, 7, 9, 12],
            Scale::Blues => &[0, 3, 5, 6, 7, 10, 12],
            Scale::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12],
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown scale: {0}")]
pub struct UnknownScale(pub String);

impl FromStr for Scale {
    type Err = UnknownScale;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "major" => Ok(Scale::Major),
            "minor" => Ok(Scale::Minor),
            "pentatonic" => Ok(Scale::Pentatonic),
            "blues" => Ok(Scale::Blues),
            "chromatic" => Ok(Scale::Chromatic),
            _ => Err(UnknownScale(s.to_string())),
        }
    }
}

/// Notes back to back on channel 0; the shorter of the two lists wins.
pub fn simple_song(name: &str, notes: &[u8], durations: &[Seconds], tempo: u32) -> Song {
    let mut song = Song::new(name, tempo);
    let mut time = 0.0;
    for (&pitch, &duration) in notes.iter().zip(durations) {
        song.add_note(pitch, time, duration, DEFAULT_VELOCITY, 0);
        time += duration;
    }
    song
}

/// Up the scale for `octaves` octaves, then back down without repeating the top note.
/// Pitches above 127 are dropped.
pub fn scale_song(name: &str, root: u8, scale: Scale, octaves: u8, note_duration: Seconds) -> Song {
    let intervals = scale.intervals();
    let octaves = octaves.max(1) as u16;

    let mut ascending = Vec::new();
    for octave in 0..octaves {
        let last = octave == octaves - 1;
        let steps = if last {
            intervals
        } else {
            &intervals[..intervals.len() - 1]
        };
        for &interval in steps {
            let pitch = root as u16 + octave * 12 + interval as u16;
            if pitch <= 127 {
                ascending.push(pitch as u8);
            }
        }
    }

    let descending = ascending.iter().rev().skip(1).copied();
    let pitches: Vec<u8> = ascending.iter().copied().chain(descending).collect();
    let durations = vec![note_duration; pitches.len()];
    simple_song(name, &pitches, &durations, DEFAULT_TEMPO)
}

/// One chord per entry, each chord given as semitone offsets from `root`.
pub fn chord_progression_song(
    name: &str,
    root: u8,
    progression: &[Vec<u8>],
    durations: &[Seconds],
) -> Song {
    let mut song = Song::new(name, DEFAULT_TEMPO);
    let mut time = 0.0;
    for (intervals, &duration) in progression.iter().zip(durations) {
        let notes = intervals
            .iter()
            .map(|&interval| root as u16 + interval as u16)
            .filter(|&pitch| pitch <= 127)
            .map(|pitch| pitch as u8)
            .collect();
        song.add_chord(notes, time, duration, DEFAULT_VELOCITY, 0);
        time += duration;
    }
    song
}
