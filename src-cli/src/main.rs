use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use encore_core::{AppCore, Command, Reply, RunOutcome, SongManager};
use encore_domain_song::{export_midi_path, DEMO_TRACKER};
use encore_infra_midi_midir::MidirMidiOutputPort;
use encore_infra_storage_fs::FsStorage;
use encore_ports::storage::SettingsDto;
use encore_ports::types::DeviceId;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "encore", about = "Sequence songs and play them on a MIDI output")]
struct Cli {
    /// Output to use: device id, exact port name or a unique name prefix
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Songs directory for this run, searched for files not found as given
    #[arg(long, global = true)]
    songs_dir: Option<PathBuf>,

    /// Directory holding settings.json
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List MIDI outputs
    Ports,
    /// Play a song (.json), a MIDI file (.mid/.midi) or tracker text
    Play {
        file: PathBuf,
        /// Name to register the song under
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Play the built-in tracker demo
    Demo,
    /// Compile tracker text into a song file (.json) or a MIDI file (.mid)
    Convert { input: PathBuf, output: PathBuf },
    /// Send all-notes-off on every channel
    Panic,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let base_dir = match cli.config_dir.clone() {
        Some(dir) => dir,
        None => FsStorage::default_base_dir()?,
    };
    let storage = FsStorage::new(base_dir.clone());
    let mut app = AppCore::new(
        Box::new(MidirMidiOutputPort::new("Encore")),
        Some(Box::new(storage)),
    );

    match cli.command {
        Commands::Ports => list_ports(&mut app),
        Commands::Convert { input, output } => convert(app.songs_mut(), &input, &output),
        Commands::Panic => {
            connect(&mut app, cli.port.as_deref())?;
            app.handle_command(Command::AllNotesOff)?;
            log::info!("sent all notes off on every channel");
            Ok(())
        }
        Commands::Demo => {
            connect(&mut app, cli.port.as_deref())?;
            let import = app.songs_mut().import_tracker("demo", DEMO_TRACKER);
            log::info!(
                "compiled '{}': {} notes on {} channels",
                import.title,
                import.note_count,
                import.channel_count
            );
            play_to_end(&mut app, &import.name).await
        }
        Commands::Play { file, name } => {
            connect(&mut app, cli.port.as_deref())?;
            let mut settings = app.settings().clone();
            if let Some(dir) = cli.songs_dir {
                settings.songs_dir = Some(dir.to_string_lossy().into_owned());
            }
            let path = resolve_song_path(&file, &FsStorage::new(base_dir), &settings);
            let name = load_song_file(app.songs_mut(), &path, name.as_deref())?;
            play_to_end(&mut app, &name).await
        }
    }
}

fn list_ports(app: &mut AppCore) -> Result<()> {
    let Reply::Ports { devices } = app.handle_command(Command::ListPorts)? else {
        bail!("unexpected reply to a port listing");
    };
    if devices.is_empty() {
        println!("no MIDI outputs found");
    }
    for device in devices {
        println!("{}\t{}", device.id, device.name);
    }
    Ok(())
}

/// Explicit port first, then the remembered one, then the first output found.
fn connect(app: &mut AppCore, port: Option<&str>) -> Result<()> {
    if let Some(port) = port {
        let device_id = DeviceId(port.to_string());
        app.connect_port(&device_id)
            .with_context(|| format!("connecting to MIDI output '{}'", port))?;
        return Ok(());
    }
    if app.connect_saved_port().is_some() {
        return Ok(());
    }

    let Reply::Ports { devices } = app.handle_command(Command::ListPorts)? else {
        bail!("unexpected reply to a port listing");
    };
    let Some(device) = devices.into_iter().find(|d| d.is_available) else {
        bail!("no MIDI output available, pass --port or attach a synthesizer");
    };
    app.connect_port(&device.id)
        .with_context(|| format!("connecting to MIDI output '{}'", device.name))?;
    Ok(())
}

/// The path as given, else the same path under the songs directory, else a
/// bare song name saved there as `<name>.json`.
fn resolve_song_path(file: &Path, storage: &FsStorage, settings: &SettingsDto) -> PathBuf {
    if file.exists() || file.is_absolute() {
        return file.to_path_buf();
    }
    let in_songs_dir = storage.songs_dir(settings).join(file);
    if in_songs_dir.exists() {
        return in_songs_dir;
    }
    if file.extension().is_none() {
        if let Some(name) = file.to_str() {
            let saved = storage.song_path(settings, name);
            if saved.exists() {
                return saved;
            }
        }
    }
    file.to_path_buf()
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

fn load_song_file(songs: &mut SongManager, path: &Path, name: Option<&str>) -> Result<String> {
    let name = match extension(path).as_str() {
        "json" => {
            let loaded = songs.load_song(path)?;
            match name {
                Some(name) if name != loaded => {
                    let mut song = songs
                        .remove(&loaded)
                        .with_context(|| format!("song '{}' vanished after loading", loaded))?;
                    song.set_name(name);
                    songs.add_song(song)
                }
                _ => loaded,
            }
        }
        "mid" | "midi" => {
            let (name, info) = songs.import_midi_file(path, name)?;
            log::info!(
                "imported SMF format {} with {} tracks at {} ticks per beat",
                info.format,
                info.track_count,
                info.ticks_per_beat
            );
            name
        }
        _ => songs.import_tracker_file(path, name)?.name,
    };
    Ok(name)
}

/// Play in the background until the run ends. Ctrl-C requests a stop and
/// still waits for the cleanup pass so no note is left hanging.
async fn play_to_end(app: &mut AppCore, name: &str) -> Result<()> {
    let summary = app.songs().song_summary(name)?;
    log::info!(
        "playing '{}': {} events, {:.2}s at {} BPM",
        summary.name,
        summary.event_count,
        summary.duration,
        summary.tempo
    );

    app.songs_mut().play_song(name)?;
    let songs = app.songs();
    let wait = songs.wait_song(name);
    tokio::pin!(wait);
    let outcome = tokio::select! {
        outcome = &mut wait => outcome?,
        Ok(()) = tokio::signal::ctrl_c() => {
            log::info!("interrupted, stopping playback");
            songs.stop_all();
            wait.await?
        }
    };

    match outcome {
        Some(RunOutcome::Stopped) => log::info!("'{}' stopped", name),
        Some(_) => log::info!("'{}' finished", name),
        None => log::warn!("'{}' was not playing", name),
    }
    Ok(())
}

fn convert(songs: &mut SongManager, input: &Path, output: &Path) -> Result<()> {
    let import = songs.import_tracker_file(input, None)?;
    match extension(output).as_str() {
        "json" => songs.save_song(&import.name, output)?,
        "mid" | "midi" => {
            let song = songs
                .get(&import.name)
                .with_context(|| format!("song '{}' missing after import", import.name))?;
            export_midi_path(song, output)
                .with_context(|| format!("writing {}", output.display()))?;
        }
        other => bail!("unsupported output extension '{}', use .json or .mid", other),
    }
    log::info!(
        "wrote '{}' ({} notes, {:.2}s) to {}",
        import.title,
        import.note_count,
        import.duration,
        output.display()
    );
    Ok(())
}
