use encore_domain_song::{
    chord_progression_song, scale_song, simple_song, sort_timeline, Event, Scale, Song,
    UnknownScale,
};
use pretty_assertions::assert_eq;

fn note(time: f64, pitch: u8) -> Event {
    Event::Note {
        time,
        channel: 0,
        pitch,
        velocity: 64,
        duration: 0.25,
    }
}

#[test]
fn sort_is_stable_for_equal_times() {
    let events = vec![note(1.0, 60), note(0.0, 61), note(1.0, 62), note(0.5, 63), note(1.0, 64)];
    let pitches: Vec<u8> = sort_timeline(&events)
        .iter()
        .map(|e| match e {
            Event::Note { pitch, .. } => *pitch,
            _ => 0,
        })
        .collect();
    assert_eq!(pitches, vec![61, 63, 60, 62, 64]);
}

#[test]
fn sorted_view_is_rebuilt_after_append() {
    let mut song = Song::new("cache", 120);
    song.add_note(60, 2.0, 0.5, 64, 0);
    song.add_note(62, 1.0, 0.5, 64, 0);
    assert!(!song.is_sorted());
    assert_eq!(song.sorted_events()[0].time(), 1.0);
    assert!(song.is_sorted());

    song.add_note(64, 0.0, 0.5, 64, 0);
    assert!(!song.is_sorted());
    assert_eq!(song.sorted_events()[0].time(), 0.0);
    // insertion order is untouched
    assert_eq!(song.events()[0].time(), 2.0);
}

#[test]
fn duration_tracks_the_latest_end_and_never_shrinks() {
    let mut song = Song::new("length", 120);
    assert_eq!(song.duration(), 0.0);

    song.add_note(60, 1.0, 2.0, 64, 0);
    assert_eq!(song.duration(), 3.0);

    song.add_note(62, 0.0, 0.5, 64, 0);
    assert_eq!(song.duration(), 3.0);

    song.add_program_change(5, 10.0, 0);
    song.add_control_change(7, 100, 12.0, 0);
    assert_eq!(song.duration(), 3.0);

    song.add_rest(3.0, 1.5);
    assert_eq!(song.duration(), 4.5);

    song.clear();
    assert!(song.is_empty());
    assert_eq!(song.duration(), 0.0);
}

#[test]
fn rest_duration_is_clamped() {
    let mut song = Song::new("rest", 120);
    song.add_rest(1.0, -3.0);
    assert_eq!(song.events()[0].duration(), Some(0.0));
    assert_eq!(song.duration(), 1.0);
}

#[test]
fn json_round_trip_keeps_events_and_derives_duration() {
    let mut song = Song::new("Round", 96);
    song.add_note(60, 0.0, 0.5, 100, 1);
    song.add_chord(vec![60, 64, 67], 0.5, 1.0, 80, 0);
    song.add_rest(0.1, 0.3);
    song.add_program_change(12, 0.0, 2);
    song.add_control_change(7, 90, 1.1, 2);

    let json = song.to_json().expect("serialize");
    let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
    let kinds: Vec<&str> = value["events"]
        .as_array()
        .expect("event list")
        .iter()
        .filter_map(|event| event["type"].as_str())
        .collect();
    assert_eq!(
        kinds,
        vec!["note", "chord", "rest", "program_change", "control_change"]
    );

    let loaded = Song::from_json(&json).expect("deserialize");
    assert_eq!(loaded.name(), "Round");
    assert_eq!(loaded.tempo(), 96);
    assert_eq!(loaded.events(), song.events());
    assert_eq!(loaded.duration(), 1.5);

    // serialize, deserialize, serialize again: byte-identical
    assert_eq!(loaded.to_json().expect("serialize again"), json);
}

#[test]
fn record_fields_fall_back_to_defaults() {
    let json = r#"{"events":[{"type":"note","time":0.5,"pitch":60}]}"#;
    let song = Song::from_json(json).expect("deserialize");
    assert_eq!(song.name(), "Untitled");
    assert_eq!(song.tempo(), 120);
    assert_eq!(
        song.events(),
        &[Event::Note {
            time: 0.5,
            channel: 0,
            pitch: 60,
            velocity: 64,
            duration: 0.0,
        }]
    );
}

#[test]
fn malformed_json_is_an_error() {
    assert!(Song::from_json("{\"events\": 3}").is_err());
}

#[test]
fn simple_song_plays_notes_back_to_back() {
    let song = simple_song("simple", &[60, 62, 64], &[0.5, 0.25, 1.0], 100);
    let times: Vec<_> = song.events().iter().map(Event::time).collect();
    assert_eq!(times, vec![0.0, 0.5, 0.75]);
    assert_eq!(song.duration(), 1.75);
    assert_eq!(song.tempo(), 100);
}

#[test]
fn scale_goes_up_and_back_down_once() {
    let song = scale_song("c-major", 60, Scale::Major, 1, 0.5);
    let pitches: Vec<u8> = song
        .events()
        .iter()
        .filter_map(|e| match e {
            Event::Note { pitch, .. } => Some(*pitch),
            _ => None,
        })
        .collect();
    assert_eq!(
        pitches,
        vec![60, 62, 64, 65, 67, 69, 71, 72, 71, 69, 67, 65, 64, 62, 60]
    );
    assert_eq!(song.duration(), 7.5);
}

#[test]
fn two_octave_scale_does_not_repeat_the_joining_note() {
    let song = scale_song("a-penta", 57, Scale::Pentatonic, 2, 0.25);
    // 5 notes per octave plus the top, up then down without the peak twice
    assert_eq!(song.len(), 11 + 10);
}

#[test]
fn scale_names_parse_case_insensitively() {
    assert_eq!("Blues".parse::<Scale>(), Ok(Scale::Blues));
    assert_eq!("chromatic".parse::<Scale>(), Ok(Scale::Chromatic));
    assert_eq!(
        "lydian".parse::<Scale>(),
        Err(UnknownScale("lydian".to_string()))
    );
}

#[test]
fn chord_progression_stacks_intervals_on_the_root() {
    let song = chord_progression_song(
        "I-IV-V",
        60,
        &[vec![0, 4, 7], vec![5, 9, 12], vec![7, 11, 14]],
        &[1.0, 1.0, 2.0],
    );
    assert_eq!(song.len(), 3);
    assert_eq!(
        song.events()[1],
        Event::Chord {
            time: 1.0,
            channel: 0,
            notes: vec![65, 69, 72],
            velocity: 64,
            duration: 1.0,
        }
    );
    assert_eq!(song.duration(), 4.0);
}
