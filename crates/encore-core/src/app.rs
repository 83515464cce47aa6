use crate::active_notes::{all_channels, all_notes_off};
use crate::ipc::{Command, PlaybackStatus, Reply};
use crate::manager::{ManagerError, SongManager};
use crate::scheduler::PlaybackError;
use encore_domain_song::{Song, SongFormatError};
use encore_ports::midi::{MidiError, MidiOutputPort, SharedSink};
use encore_ports::storage::{SettingsDto, StorageError, StoragePort};
use encore_ports::types::DeviceId;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("midi error: {0}")]
    Midi(#[from] MidiError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Manager(#[from] ManagerError),
    #[error("playback error: {0}")]
    Playback(#[from] PlaybackError),
    #[error("song format error: {0}")]
    Format(#[from] SongFormatError),
}

/// Command surface over one output port, the song collection and persisted
/// settings. `PlaySong` spawns onto the ambient tokio runtime.
pub struct AppCore {
    midi_port: Box<dyn MidiOutputPort>,
    storage: Option<Box<dyn StoragePort>>,
    settings: SettingsDto,
    sink: Option<SharedSink>,
    songs: SongManager,
}

impl AppCore {
    pub fn new(midi_port: Box<dyn MidiOutputPort>, storage: Option<Box<dyn StoragePort>>) -> Self {
        let settings = match storage.as_ref().map(|storage| storage.load_settings()) {
            Some(Ok(settings)) => settings,
            Some(Err(e)) => {
                log::warn!("could not load settings, using defaults: {}", e);
                SettingsDto::default()
            }
            None => SettingsDto::default(),
        };

        Self {
            midi_port,
            storage,
            settings,
            sink: None,
            songs: SongManager::new(),
        }
    }

    pub fn settings(&self) -> &SettingsDto {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut SettingsDto {
        &mut self.settings
    }

    pub fn songs(&self) -> &SongManager {
        &self.songs
    }

    pub fn songs_mut(&mut self) -> &mut SongManager {
        &mut self.songs
    }

    pub fn is_connected(&self) -> bool {
        self.sink.is_some()
    }

    pub fn connect_port(&mut self, device_id: &DeviceId) -> Result<(), AppError> {
        let sink = self.midi_port.open_output(device_id)?;
        log::info!("connected to MIDI output {}", device_id);
        self.sink = Some(sink.clone());
        self.songs.set_sink(Some(sink));
        self.settings.selected_midi_out = Some(device_id.clone());
        self.save_settings();
        Ok(())
    }

    /// Reconnect to the output remembered in the settings, if it is still there.
    pub fn connect_saved_port(&mut self) -> Option<DeviceId> {
        let device_id = self.settings.selected_midi_out.clone()?;
        match self.connect_port(&device_id) {
            Ok(()) => Some(device_id),
            Err(e) => {
                log::warn!("saved MIDI output {} unavailable: {}", device_id, e);
                None
            }
        }
    }

    /// Bind an already opened sink, bypassing port discovery.
    pub fn attach_sink(&mut self, sink: SharedSink) {
        self.sink = Some(sink.clone());
        self.songs.set_sink(Some(sink));
    }

    /// `PlaySong` spawns its run onto the current tokio runtime and fails with
    /// `PlaybackError::NoRuntime` when called outside one.
    pub fn handle_command(&mut self, cmd: Command) -> Result<Reply, AppError> {
        let velocity_default = self.settings.default_velocity;
        let channel_default = self.settings.default_channel;

        let reply = match cmd {
            Command::ListPorts => Reply::Ports {
                devices: self.midi_port.list_outputs()?,
            },
            Command::ConnectPort { device_id } => {
                self.connect_port(&device_id)?;
                Reply::Connected { device_id }
            }
            Command::NoteOn {
                note,
                velocity,
                channel,
            } => {
                self.connected_sink()?.note_on(
                    note,
                    velocity.unwrap_or(velocity_default),
                    channel.unwrap_or(channel_default),
                )?;
                Reply::Sent
            }
            Command::NoteOff { note, channel } => {
                self.connected_sink()?
                    .note_off(note, channel.unwrap_or(channel_default))?;
                Reply::Sent
            }
            Command::ProgramChange { program, channel } => {
                self.connected_sink()?
                    .program_change(program, channel.unwrap_or(channel_default))?;
                Reply::Sent
            }
            Command::ControlChange {
                control,
                value,
                channel,
            } => {
                self.connected_sink()?.control_change(
                    control,
                    value,
                    channel.unwrap_or(channel_default),
                )?;
                Reply::Sent
            }
            Command::AllNotesOff => {
                let sink = self.connected_sink()?;
                all_notes_off(sink.as_ref(), all_channels())?;
                Reply::Sent
            }
            Command::CreateSong { name, tempo } => Reply::SongCreated {
                name: self
                    .songs
                    .create_song(&name, tempo.unwrap_or(encore_domain_song::DEFAULT_TEMPO)),
            },
            Command::AddNote {
                song,
                pitch,
                time,
                duration,
                velocity,
                channel,
            } => self.edit_song(&song, |s| {
                s.add_note(
                    pitch,
                    time,
                    duration,
                    velocity.unwrap_or(velocity_default),
                    channel.unwrap_or(channel_default),
                )
            })?,
            Command::AddChord {
                song,
                notes,
                time,
                duration,
                velocity,
                channel,
            } => self.edit_song(&song, |s| {
                s.add_chord(
                    notes,
                    time,
                    duration,
                    velocity.unwrap_or(velocity_default),
                    channel.unwrap_or(channel_default),
                )
            })?,
            Command::AddRest {
                song,
                time,
                duration,
            } => self.edit_song(&song, |s| s.add_rest(time, duration))?,
            Command::AddProgramChange {
                song,
                program,
                time,
                channel,
            } => self.edit_song(&song, |s| {
                s.add_program_change(program, time, channel.unwrap_or(channel_default))
            })?,
            Command::AddControlChange {
                song,
                control,
                value,
                time,
                channel,
            } => self.edit_song(&song, |s| {
                s.add_control_change(control, value, time, channel.unwrap_or(channel_default))
            })?,
            Command::ClearSong { name } => self.edit_song(&name, Song::clear)?,
            Command::PlaySong { name } => {
                let status = self.songs.play_song(&name)?;
                Reply::Playback {
                    name: Some(name),
                    status: status.into(),
                }
            }
            Command::StopSong { name } => {
                let status = match name.as_deref() {
                    Some(name) => self.songs.stop_song(name)?,
                    None => self.songs.stop_current(),
                };
                Reply::Playback {
                    name: name.or_else(|| self.songs.current().map(str::to_string)),
                    status: PlaybackStatus::from(status),
                }
            }
            Command::ListSongs => Reply::Songs {
                names: self.songs.names(),
                current: self.songs.current().map(str::to_string),
            },
            Command::SongInfo { name } => Reply::SongInfo(self.songs.song_summary(&name)?),
            Command::ExportSongJson { name } => {
                let song = self
                    .songs
                    .get(&name)
                    .ok_or(ManagerError::SongNotFound(name))?;
                Reply::SongJson {
                    json: song.to_json()?,
                }
            }
            Command::ImportSongJson { json } => {
                let song = Song::from_json(&json)?;
                Reply::SongCreated {
                    name: self.songs.add_song(song),
                }
            }
            Command::LoadTracker { name, content } => {
                Reply::Tracker(self.songs.import_tracker(&name, &content))
            }
            Command::LoadMidiFile { path, name } => {
                let (name, info) = self
                    .songs
                    .import_midi_file(Path::new(&path), name.as_deref())?;
                Reply::MidiLoaded { name, info }
            }
            Command::ListMidiFiles => Reply::MidiFiles {
                files: self.songs.midi_files(),
            },
            Command::SaveSong { name, path } => {
                self.songs.save_song(&name, Path::new(&path))?;
                Reply::Saved { path }
            }
            Command::LoadSong { path } => Reply::SongCreated {
                name: self.songs.load_song(Path::new(&path))?,
            },
        };
        Ok(reply)
    }

    fn connected_sink(&self) -> Result<SharedSink, MidiError> {
        self.sink.clone().ok_or(MidiError::NotConnected)
    }

    fn edit_song(&mut self, name: &str, edit: impl FnOnce(&mut Song)) -> Result<Reply, AppError> {
        let song = self
            .songs
            .get_mut(name)
            .ok_or_else(|| ManagerError::SongNotFound(name.to_string()))?;
        edit(song);
        Ok(Reply::SongUpdated {
            name: name.to_string(),
            event_count: song.len(),
            duration: song.duration(),
        })
    }

    fn save_settings(&self) {
        if let Some(storage) = self.storage.as_ref() {
            if let Err(e) = storage.save_settings(&self.settings) {
                log::warn!("could not save settings: {}", e);
            }
        }
    }
}
