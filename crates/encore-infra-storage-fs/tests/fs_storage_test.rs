use encore_infra_storage_fs::FsStorage;
use encore_ports::storage::{SettingsDto, StorageError, StoragePort};
use encore_ports::types::DeviceId;
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_base(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!("encore-{name}-{nanos}"))
}

#[test]
fn missing_file_yields_defaults() {
    let storage = FsStorage::new(temp_base("fresh"));
    assert_eq!(storage.load_settings().expect("defaults"), SettingsDto::default());
}

#[test]
fn settings_round_trip() {
    let base = temp_base("settings");
    let storage = FsStorage::new(base.clone());
    let settings = SettingsDto {
        selected_midi_out: Some(DeviceId("midir:0:Synth".to_string())),
        songs_dir: Some("/music/encore".to_string()),
        default_velocity: 90,
        default_channel: 9,
    };

    storage.save_settings(&settings).expect("save");
    assert_eq!(storage.load_settings().expect("load"), settings);
    assert!(!base.join("settings.json.tmp").exists());

    let _ = std::fs::remove_dir_all(&base);
}

#[test]
fn partial_file_fills_in_defaults() {
    let base = temp_base("partial");
    std::fs::create_dir_all(&base).expect("mkdir");
    std::fs::write(base.join("settings.json"), r#"{"default_channel": 4}"#).expect("write");

    let storage = FsStorage::new(base.clone());
    let settings = storage.load_settings().expect("load");
    assert_eq!(settings.default_channel, 4);
    assert_eq!(settings.default_velocity, 64);
    assert_eq!(settings.selected_midi_out, None);

    let _ = std::fs::remove_dir_all(&base);
}

#[test]
fn corrupt_file_is_a_serde_error() {
    let base = temp_base("corrupt");
    std::fs::create_dir_all(&base).expect("mkdir");
    std::fs::write(base.join("settings.json"), "{{{").expect("write");

    let storage = FsStorage::new(base.clone());
    assert!(matches!(storage.load_settings(), Err(StorageError::Serde(_))));

    let _ = std::fs::remove_dir_all(&base);
}

#[test]
fn songs_dir_prefers_configured_path() {
    let storage = FsStorage::new(PathBuf::from("/cfg/Encore"));
    let mut settings = SettingsDto::default();
    assert_eq!(storage.songs_dir(&settings), PathBuf::from("/cfg/Encore/songs"));

    settings.songs_dir = Some("/elsewhere".to_string());
    assert_eq!(storage.songs_dir(&settings), PathBuf::from("/elsewhere"));
}

#[test]
fn song_files_live_in_the_songs_dir() {
    let base = temp_base("songs");
    let storage = FsStorage::new(base.clone());
    let settings = SettingsDto::default();

    assert_eq!(
        storage.song_path(&settings, "waltz"),
        base.join("songs").join("waltz.json")
    );
    assert!(!base.join("songs").exists());
    let dir = storage.ensure_songs_dir(&settings).expect("create");
    assert_eq!(dir, base.join("songs"));
    assert!(dir.is_dir());

    let _ = std::fs::remove_dir_all(&base);
}
