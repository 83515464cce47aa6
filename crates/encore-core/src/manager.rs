use crate::scheduler::{PlaybackError, RunOutcome, SongPlayer, StartOutcome, StopOutcome};
use encore_domain_song::{
    chord_progression_song, compile_song, import_midi_path, scale_song, simple_song,
    song_name_for_path, MidiFileInfo, Scale, Song, SongFormatError,
};
use encore_ports::midi::SharedSink;
use encore_ports::types::Seconds;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum ManagerError {
    #[error("song not found: {0}")]
    SongNotFound(String),
    #[error("no current song")]
    NoCurrentSong,
    #[error(transparent)]
    Playback(#[from] PlaybackError),
    #[error("import failed: {0}")]
    Import(String),
    #[error("song format error: {0}")]
    Format(#[from] SongFormatError),
    #[error("io error: {0}")]
    Io(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SongSummary {
    pub name: String,
    pub tempo: u32,
    pub duration: Seconds,
    pub event_count: usize,
    pub is_playing: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackerImport {
    pub name: String,
    pub title: String,
    pub channel_count: usize,
    pub note_count: usize,
    pub duration: Seconds,
}

struct SongEntry {
    song: Song,
    player: SongPlayer,
}

/// A song that came from a Standard MIDI File.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MidiFileEntry {
    pub name: String,
    pub path: String,
    pub info: MidiFileInfo,
}

/// Named songs, each with its own player, sharing one send capability.
#[derive(Default)]
pub struct SongManager {
    songs: BTreeMap<String, SongEntry>,
    midi_files: BTreeMap<String, MidiFileEntry>,
    current: Option<String>,
    sink: Option<SharedSink>,
}

impl SongManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind (or unbind) the output for every song, present and future.
    pub fn set_sink(&mut self, sink: Option<SharedSink>) {
        for entry in self.songs.values() {
            entry.player.set_sink(sink.clone());
        }
        self.sink = sink;
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// First free name among `base`, `base_1`, `base_2`, ...
    pub fn unique_name(&self, base: &str) -> String {
        if !self.songs.contains_key(base) {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| !self.songs.contains_key(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Store `song`, renaming it on collision. Returns the name it was stored under.
    pub fn add_song(&mut self, mut song: Song) -> String {
        let name = self.unique_name(song.name());
        if name != song.name() {
            log::info!("song '{}' already exists, storing as '{}'", song.name(), name);
        }
        song.set_name(name.clone());
        let player = SongPlayer::new(name.clone(), self.sink.clone());
        self.songs.insert(name.clone(), SongEntry { song, player });
        name
    }

    pub fn get(&self, name: &str) -> Option<&Song> {
        self.songs.get(name).map(|entry| &entry.song)
    }

    /// Edits made while the song plays apply to its next run.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Song> {
        self.songs.get_mut(name).map(|entry| &mut entry.song)
    }

    pub fn names(&self) -> Vec<String> {
        self.songs.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn remove(&mut self, name: &str) -> Option<Song> {
        let entry = self.songs.remove(name)?;
        entry.player.stop_playback();
        self.midi_files.remove(name);
        if self.current.as_deref() == Some(name) {
            self.current = None;
        }
        Some(entry.song)
    }

    pub fn set_current(&mut self, name: &str) -> Result<(), ManagerError> {
        if !self.songs.contains_key(name) {
            return Err(ManagerError::SongNotFound(name.to_string()));
        }
        self.current = Some(name.to_string());
        Ok(())
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn is_playing(&self, name: &str) -> bool {
        self.songs
            .get(name)
            .is_some_and(|entry| entry.player.is_playing())
    }

    fn entry_mut(&mut self, name: &str) -> Result<&mut SongEntry, ManagerError> {
        self.songs
            .get_mut(name)
            .ok_or_else(|| ManagerError::SongNotFound(name.to_string()))
    }

    fn player(&self, name: &str) -> Result<&SongPlayer, ManagerError> {
        self.songs
            .get(name)
            .map(|entry| &entry.player)
            .ok_or_else(|| ManagerError::SongNotFound(name.to_string()))
    }

    /// Start `name` in the background and make it current. A different song
    /// that is still playing as current is stopped first.
    pub fn play_song(&mut self, name: &str) -> Result<StartOutcome, ManagerError> {
        if !self.songs.contains_key(name) {
            return Err(ManagerError::SongNotFound(name.to_string()));
        }
        if self.sink.is_none() {
            return Err(PlaybackError::NoSink.into());
        }
        if let Some(current) = self.current.clone() {
            if current != name {
                if let Some(entry) = self.songs.get(&current) {
                    entry.player.stop_playback();
                }
            }
        }
        self.current = Some(name.to_string());

        let entry = self.entry_mut(name)?;
        let events = entry.song.sorted_events().to_vec();
        Ok(entry.player.start_playback(events)?)
    }

    pub fn play_current(&mut self) -> Result<StartOutcome, ManagerError> {
        let name = self.current.clone().ok_or(ManagerError::NoCurrentSong)?;
        self.play_song(&name)
    }

    /// Play `name` in the foreground and return once the run is over.
    pub async fn play_song_to_end(&mut self, name: &str) -> Result<RunOutcome, ManagerError> {
        let entry = self.entry_mut(name)?;
        let events = entry.song.sorted_events().to_vec();
        let player = entry.player.clone();
        self.current = Some(name.to_string());
        Ok(player.play(events).await?)
    }

    pub fn stop_song(&self, name: &str) -> Result<StopOutcome, ManagerError> {
        Ok(self.player(name)?.stop_playback())
    }

    pub fn stop_current(&self) -> StopOutcome {
        self.current
            .as_deref()
            .and_then(|name| self.songs.get(name))
            .map(|entry| entry.player.stop_playback())
            .unwrap_or(StopOutcome::NotPlaying)
    }

    /// Returns how many songs were playing.
    pub fn stop_all(&self) -> usize {
        self.songs
            .values()
            .filter(|entry| entry.player.stop_playback() == StopOutcome::Stopping)
            .count()
    }

    /// Await the background run started by `play_song`, if any.
    pub async fn wait_song(&self, name: &str) -> Result<Option<RunOutcome>, ManagerError> {
        let player = self.player(name)?.clone();
        Ok(player.wait().await.transpose()?)
    }

    pub fn song_summary(&self, name: &str) -> Result<SongSummary, ManagerError> {
        let entry = self
            .songs
            .get(name)
            .ok_or_else(|| ManagerError::SongNotFound(name.to_string()))?;
        Ok(SongSummary {
            name: name.to_string(),
            tempo: entry.song.tempo(),
            duration: entry.song.duration(),
            event_count: entry.song.len(),
            is_playing: entry.player.is_playing(),
        })
    }

    pub fn save_song(&self, name: &str, path: &Path) -> Result<(), ManagerError> {
        let song = self
            .get(name)
            .ok_or_else(|| ManagerError::SongNotFound(name.to_string()))?;
        let record = song.to_record();
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| SongFormatError::Invalid(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ManagerError::Io(e.to_string()))?;
        }
        std::fs::write(path, json).map_err(|e| ManagerError::Io(e.to_string()))?;
        log::info!("saved '{}' to {}", name, path.display());
        Ok(())
    }

    pub fn load_song(&mut self, path: &Path) -> Result<String, ManagerError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| ManagerError::Io(format!("{}: {}", path.display(), e)))?;
        let song = Song::from_json(&json)?;
        Ok(self.add_song(song))
    }

    /// Write every song as `<name>.json` under `dir`.
    pub fn save_all(&self, dir: &Path) -> BTreeMap<String, bool> {
        self.songs
            .keys()
            .map(|name| {
                let path = dir.join(format!("{}.json", name));
                let saved = match self.save_song(name, &path) {
                    Ok(()) => true,
                    Err(e) => {
                        log::warn!("saving '{}' failed: {}", name, e);
                        false
                    }
                };
                (name.clone(), saved)
            })
            .collect()
    }

    /// Load every `*.json` file in `dir`, keyed by file name.
    pub fn load_all(&mut self, dir: &Path) -> Result<BTreeMap<String, bool>, ManagerError> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| ManagerError::Io(format!("{}: {}", dir.display(), e)))?;

        let mut paths: Vec<_> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut results = BTreeMap::new();
        for path in paths {
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let loaded = match self.load_song(&path) {
                Ok(_) => true,
                Err(e) => {
                    log::warn!("loading {} failed: {}", path.display(), e);
                    false
                }
            };
            results.insert(file_name, loaded);
        }
        Ok(results)
    }

    pub fn create_song(&mut self, name: &str, tempo: u32) -> String {
        self.add_song(Song::new(name, tempo))
    }

    pub fn create_simple_song(
        &mut self,
        name: &str,
        notes: &[u8],
        durations: &[Seconds],
        tempo: u32,
    ) -> String {
        self.add_song(simple_song(name, notes, durations, tempo))
    }

    /// Unknown scale names fall back to major.
    pub fn create_scale_song(
        &mut self,
        name: &str,
        root: u8,
        scale: &str,
        octaves: u8,
        note_duration: Seconds,
    ) -> String {
        let scale = scale.parse::<Scale>().unwrap_or_else(|e| {
            log::warn!("{}, using major", e);
            Scale::Major
        });
        self.add_song(scale_song(name, root, scale, octaves, note_duration))
    }

    pub fn create_chord_progression_song(
        &mut self,
        name: &str,
        root: u8,
        progression: &[Vec<u8>],
        durations: &[Seconds],
    ) -> String {
        self.add_song(chord_progression_song(name, root, progression, durations))
    }

    pub fn import_midi_file(
        &mut self,
        path: &Path,
        name: Option<&str>,
    ) -> Result<(String, MidiFileInfo), ManagerError> {
        let imported =
            import_midi_path(path, name).map_err(|e| ManagerError::Import(e.to_string()))?;
        let name = self.add_song(imported.song);
        self.midi_files.insert(
            name.clone(),
            MidiFileEntry {
                name: name.clone(),
                path: path.display().to_string(),
                info: imported.info.clone(),
            },
        );
        Ok((name, imported.info))
    }

    /// Songs imported from MIDI files that are still loaded, by song name.
    pub fn midi_files(&self) -> Vec<MidiFileEntry> {
        self.midi_files.values().cloned().collect()
    }

    pub fn midi_file_info(&self, name: &str) -> Option<&MidiFileEntry> {
        self.midi_files.get(name)
    }

    pub fn import_tracker(&mut self, name: &str, text: &str) -> TrackerImport {
        let compiled = compile_song(name, text);
        let duration = compiled.song.duration();
        let name = self.add_song(compiled.song);
        TrackerImport {
            name,
            title: compiled.title,
            channel_count: compiled.channel_count,
            note_count: compiled.note_count,
            duration,
        }
    }

    pub fn import_tracker_file(
        &mut self,
        path: &Path,
        name: Option<&str>,
    ) -> Result<TrackerImport, ManagerError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ManagerError::Io(format!("{}: {}", path.display(), e)))?;
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| song_name_for_path(path));
        Ok(self.import_tracker(&name, &text))
    }
}
