use crate::manager::{MidiFileEntry, SongSummary, TrackerImport};
use crate::scheduler::{StartOutcome, StopOutcome};
use encore_domain_song::MidiFileInfo;
use encore_ports::types::{Channel, DeviceId, MidiOutputDevice, Seconds};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Command {
    ListPorts,
    ConnectPort { device_id: DeviceId },
    NoteOn { note: u8, velocity: Option<u8>, channel: Option<Channel> },
    NoteOff { note: u8, channel: Option<Channel> },
    ProgramChange { program: u8, channel: Option<Channel> },
    ControlChange { control: u8, value: u8, channel: Option<Channel> },
    AllNotesOff,
    CreateSong { name: String, tempo: Option<u32> },
    AddNote {
        song: String,
        pitch: u8,
        time: Seconds,
        duration: Seconds,
        velocity: Option<u8>,
        channel: Option<Channel>,
    },
    AddChord {
        song: String,
        notes: Vec<u8>,
        time: Seconds,
        duration: Seconds,
        velocity: Option<u8>,
        channel: Option<Channel>,
    },
    AddRest { song: String, time: Seconds, duration: Seconds },
    AddProgramChange { song: String, program: u8, time: Seconds, channel: Option<Channel> },
    AddControlChange {
        song: String,
        control: u8,
        value: u8,
        time: Seconds,
        channel: Option<Channel>,
    },
    ClearSong { name: String },
    PlaySong { name: String },
    StopSong { name: Option<String> },
    ListSongs,
    SongInfo { name: String },
    ExportSongJson { name: String },
    ImportSongJson { json: String },
    LoadTracker { name: String, content: String },
    LoadMidiFile { path: String, name: Option<String> },
    ListMidiFiles,
    SaveSong { name: String, path: String },
    LoadSong { path: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    Started,
    AlreadyPlaying,
    Stopping,
    NotPlaying,
}

impl From<StartOutcome> for PlaybackStatus {
    fn from(outcome: StartOutcome) -> Self {
        match outcome {
            StartOutcome::Started => PlaybackStatus::Started,
            StartOutcome::AlreadyPlaying => PlaybackStatus::AlreadyPlaying,
        }
    }
}

impl From<StopOutcome> for PlaybackStatus {
    fn from(outcome: StopOutcome) -> Self {
        match outcome {
            StopOutcome::Stopping => PlaybackStatus::Stopping,
            StopOutcome::NotPlaying => PlaybackStatus::NotPlaying,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Reply {
    Ports { devices: Vec<MidiOutputDevice> },
    Connected { device_id: DeviceId },
    Sent,
    SongCreated { name: String },
    SongUpdated { name: String, event_count: usize, duration: Seconds },
    Playback { name: Option<String>, status: PlaybackStatus },
    Songs { names: Vec<String>, current: Option<String> },
    SongInfo(SongSummary),
    SongJson { json: String },
    Tracker(TrackerImport),
    MidiLoaded { name: String, info: MidiFileInfo },
    MidiFiles { files: Vec<MidiFileEntry> },
    Saved { path: String },
}
