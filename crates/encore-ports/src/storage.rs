use crate::types::*;
use serde::{Deserialize, Serialize};

fn default_velocity() -> u8 {
    64
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsDto {
    pub selected_midi_out: Option<DeviceId>,
    pub songs_dir: Option<String>,
    #[serde(default = "default_velocity")]
    pub default_velocity: u8,
    pub default_channel: Channel,
}

impl Default for SettingsDto {
    fn default() -> Self {
        Self {
            selected_midi_out: None,
            songs_dir: None,
            default_velocity: default_velocity(),
            default_channel: 0,
        }
    }
}

pub trait StoragePort: Send + Sync {
    fn load_settings(&self) -> Result<SettingsDto, StorageError>;
    fn save_settings(&self, s: &SettingsDto) -> Result<(), StorageError>;
}
