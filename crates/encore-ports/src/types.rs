use serde::{Deserialize, Serialize};
use std::fmt;

pub type Channel = u8; // 0..=15
pub type Seconds = f64; // song time, relative to song start

pub const CHANNEL_COUNT: u8 = 16;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiOutputDevice {
    pub id: DeviceId,
    pub name: String,
    pub is_available: bool,
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
