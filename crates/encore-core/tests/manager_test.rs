mod common;

use common::RecordingSink;
use encore_core::{ManagerError, PlaybackError, RunOutcome, SongManager, StartOutcome, StopOutcome};
use encore_domain_song::{export_midi_bytes, Event, Song, DEMO_TRACKER};
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn temp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!("encore-{name}-{nanos}"))
}

#[test]
fn colliding_names_get_numbered_suffixes() {
    let mut manager = SongManager::new();
    assert_eq!(manager.add_song(Song::new("tune", 120)), "tune");
    assert_eq!(manager.add_song(Song::new("tune", 120)), "tune_1");
    assert_eq!(manager.add_song(Song::new("tune", 120)), "tune_2");

    manager.remove("tune_1");
    assert_eq!(manager.add_song(Song::new("tune", 120)), "tune_1");
    assert_eq!(manager.get("tune_2").map(Song::name), Some("tune_2"));
    assert_eq!(manager.names(), vec!["tune", "tune_1", "tune_2"]);
}

#[test]
fn current_song_must_exist() {
    let mut manager = SongManager::new();
    assert!(matches!(
        manager.set_current("ghost"),
        Err(ManagerError::SongNotFound(_))
    ));
    let name = manager.create_song("real", 100);
    manager.set_current(&name).expect("known song");
    assert_eq!(manager.current(), Some("real"));

    manager.remove("real");
    assert_eq!(manager.current(), None);
}

#[test]
fn builders_register_songs() {
    let mut manager = SongManager::new();
    let scale = manager.create_scale_song("scale", 60, "no-such-scale", 1, 0.5);
    let summary = manager.song_summary(&scale).expect("summary");
    // unknown scale falls back to major: 8 up, 7 down
    assert_eq!(summary.event_count, 15);
    assert_eq!(summary.duration, 7.5);
    assert!(!summary.is_playing);

    let chords =
        manager.create_chord_progression_song("chords", 48, &[vec![0, 4, 7], vec![5, 9]], &[1.0, 2.0]);
    assert_eq!(manager.get(&chords).map(Song::duration), Some(3.0));

    let simple = manager.create_simple_song("simple", &[60, 64], &[0.25, 0.25], 90);
    assert_eq!(manager.get(&simple).map(Song::tempo), Some(90));
}

#[test]
fn tracker_import_reports_what_was_compiled() {
    let mut manager = SongManager::new();
    let import = manager.import_tracker("demo", DEMO_TRACKER);
    assert_eq!(import.name, "demo");
    assert_eq!(import.title, "Happy Birthday");
    assert_eq!(import.note_count, 19);
    assert_eq!(import.channel_count, 3);
    assert!(manager.get("demo").is_some());
}

#[test]
fn songs_survive_save_and_load() {
    let dir = temp_dir("songs");
    let mut manager = SongManager::new();
    let name = manager.create_song("keep", 110);
    {
        let song = manager.get_mut(&name).expect("song");
        song.add_note(60, 0.0, 0.5, 100, 0);
        song.add_chord(vec![60, 64, 67], 0.5, 1.0, 80, 1);
    }
    manager.create_song("other", 120);

    let saved = manager.save_all(&dir);
    assert_eq!(saved.values().filter(|ok| **ok).count(), 2);
    std::fs::write(dir.join("broken.json"), "{ not json").expect("write");

    let mut restored = SongManager::new();
    let loaded = restored.load_all(&dir).expect("read dir");
    assert_eq!(loaded.get("keep.json"), Some(&true));
    assert_eq!(loaded.get("other.json"), Some(&true));
    assert_eq!(loaded.get("broken.json"), Some(&false));

    let song = restored.get("keep").expect("restored");
    assert_eq!(song.tempo(), 110);
    assert_eq!(song.duration(), 1.5);
    assert!(matches!(song.events()[1], Event::Chord { channel: 1, .. }));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_song_operations_fail() {
    let mut manager = SongManager::new();
    assert!(matches!(
        manager.play_song("nope"),
        Err(ManagerError::SongNotFound(_))
    ));
    assert!(matches!(
        manager.stop_song("nope"),
        Err(ManagerError::SongNotFound(_))
    ));
    assert!(matches!(
        manager.play_current(),
        Err(ManagerError::NoCurrentSong)
    ));
    assert!(matches!(
        manager.load_song(&temp_dir("missing").join("x.json")),
        Err(ManagerError::Io(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn playing_without_output_is_a_configuration_error() {
    let mut manager = SongManager::new();
    let name = manager.create_simple_song("quiet", &[60], &[1.0], 120);
    assert!(matches!(
        manager.play_song(&name),
        Err(ManagerError::Playback(PlaybackError::NoSink))
    ));
    assert!(!manager.is_playing(&name));
}

#[tokio::test(start_paused = true)]
async fn playing_another_song_stops_the_current_one() {
    let sink = RecordingSink::new();
    let mut manager = SongManager::new();
    manager.set_sink(Some(sink.shared()));
    let first = manager.create_simple_song("first", &[60, 62], &[1.0, 1.0], 120);
    let second = manager.create_simple_song("second", &[72], &[0.5], 120);

    assert_eq!(manager.play_song(&first).expect("play"), StartOutcome::Started);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(manager.play_song(&second).expect("play"), StartOutcome::Started);
    assert_eq!(manager.current(), Some("second"));

    assert_eq!(
        manager.wait_song(&first).await.expect("known"),
        Some(RunOutcome::Stopped)
    );
    assert_eq!(
        manager.wait_song(&second).await.expect("known"),
        Some(RunOutcome::Completed)
    );
    assert_eq!(sink.note_ons(), vec![60, 72]);
    assert_eq!(manager.stop_all(), 0);
    assert_eq!(manager.stop_current(), StopOutcome::NotPlaying);
}

#[tokio::test(start_paused = true)]
async fn songs_added_after_binding_share_the_output() {
    let sink = RecordingSink::new();
    let mut manager = SongManager::new();
    manager.set_sink(Some(sink.shared()));
    let name = manager.create_simple_song("late", &[65], &[0.25], 120);

    assert_eq!(
        manager.play_song_to_end(&name).await.expect("play"),
        RunOutcome::Completed
    );
    assert_eq!(sink.note_offs(), vec![(65, 0)]);
}

#[test]
fn imported_midi_files_stay_listed_until_removed() {
    let dir = temp_dir("midi");
    std::fs::create_dir_all(&dir).expect("mkdir");
    let path = dir.join("tune.mid");
    let mut source = Song::new("tune", 120);
    source.add_note(60, 0.0, 0.5, 100, 0);
    source.add_note(64, 0.5, 0.5, 100, 0);
    std::fs::write(&path, export_midi_bytes(&source).expect("export")).expect("write");

    let mut manager = SongManager::new();
    let (name, info) = manager.import_midi_file(&path, None).expect("import");
    assert_eq!(name, "tune");
    let (again, _) = manager.import_midi_file(&path, None).expect("import again");
    assert_eq!(again, "tune_1");
    manager.create_song("scratch", 120);

    let listed: Vec<String> = manager.midi_files().into_iter().map(|f| f.name).collect();
    assert_eq!(listed, vec!["tune", "tune_1"]);
    let entry = manager.midi_file_info("tune").expect("listed");
    assert_eq!(entry.info, info);
    assert_eq!(entry.path, path.display().to_string());
    assert!(manager.midi_file_info("scratch").is_none());

    manager.remove("tune");
    assert!(manager.midi_file_info("tune").is_none());
    assert_eq!(manager.midi_files().len(), 1);

    let _ = std::fs::remove_dir_all(&dir);
}
