use encore_ports::storage::{SettingsDto, StorageError, StoragePort};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "Encore";
const SETTINGS_FILE: &str = "settings.json";
const SONGS_DIR: &str = "songs";
const SONG_EXTENSION: &str = "json";

/// Everything Encore keeps on disk, rooted at one base directory:
/// `settings.json` and, unless configured elsewhere, a `songs/` folder.
pub struct FsStorage {
    base_dir: PathBuf,
}

fn io_error(path: &Path, e: io::Error) -> StorageError {
    StorageError::Io(format!("{}: {}", path.display(), e))
}

impl FsStorage {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// `<platform config dir>/Encore`.
    pub fn default_base_dir() -> Result<PathBuf, StorageError> {
        dirs_next::config_dir()
            .map(|config| config.join(APP_DIR))
            .ok_or_else(|| StorageError::Io("no platform config directory".to_string()))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn settings_path(&self) -> PathBuf {
        self.base_dir.join(SETTINGS_FILE)
    }

    /// The configured songs directory, else `<base>/songs`.
    pub fn songs_dir(&self, settings: &SettingsDto) -> PathBuf {
        match settings.songs_dir.as_deref() {
            Some(dir) => PathBuf::from(dir),
            None => self.base_dir.join(SONGS_DIR),
        }
    }

    /// Where a song named `name` is saved: `<songs dir>/<name>.json`.
    pub fn song_path(&self, settings: &SettingsDto, name: &str) -> PathBuf {
        self.songs_dir(settings)
            .join(format!("{}.{}", name, SONG_EXTENSION))
    }

    /// Like `songs_dir`, creating the directory when it is missing.
    pub fn ensure_songs_dir(&self, settings: &SettingsDto) -> Result<PathBuf, StorageError> {
        let dir = self.songs_dir(settings);
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        Ok(dir)
    }

    /// `None` when the file does not exist yet.
    fn load<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(path, e)),
        };
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| StorageError::Serde(format!("{}: {}", path.display(), e)))
    }

    /// Pretty JSON written next to `path` and renamed over it.
    fn store<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        let data =
            serde_json::to_vec_pretty(value).map_err(|e| StorageError::Serde(e.to_string()))?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, data).map_err(|e| io_error(&staging, e))?;
        fs::rename(&staging, path).map_err(|e| io_error(path, e))
    }
}

impl Default for FsStorage {
    /// Falls back to the working directory where no config directory exists.
    fn default() -> Self {
        Self::new(Self::default_base_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

impl StoragePort for FsStorage {
    fn load_settings(&self) -> Result<SettingsDto, StorageError> {
        Ok(Self::load(&self.settings_path())?.unwrap_or_default())
    }

    fn save_settings(&self, settings: &SettingsDto) -> Result<(), StorageError> {
        Self::store(&self.settings_path(), settings)
    }
}
