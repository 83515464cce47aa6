use crate::active_notes::ActiveNotes;
use crate::note_off::{deadline_after, stopped, NoteOffTimers};
use encore_domain_song::Event;
use encore_ports::midi::{MidiError, MidiSink, SharedSink};
use encore_ports::types::{Channel, Seconds};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("no MIDI output bound")]
    NoSink,
    #[error("send failed: {0}")]
    Send(#[from] MidiError),
    #[error("playback task aborted: {0}")]
    Aborted(String),
    #[error("no tokio runtime to run playback on")]
    NoRuntime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Stopped,
    AlreadyPlaying,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Started,
    AlreadyPlaying,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    Stopping,
    NotPlaying,
}

struct RunControl {
    id: u64,
    stop: watch::Sender<bool>,
    vacated: watch::Receiver<()>,
}

impl RunControl {
    fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }
}

/// The run currently holding the player, plus starts queued behind a run
/// that is winding down. Every stop bumps `generation`, which cancels the
/// queued starts made before it.
#[derive(Default)]
struct Slot {
    run: Option<RunControl>,
    queued: usize,
    generation: u64,
}

struct PlayerShared {
    name: String,
    sink: RwLock<Option<SharedSink>>,
    slot: Mutex<Slot>,
    next_run: AtomicU64,
    background: Mutex<Option<JoinHandle<Result<RunOutcome, PlaybackError>>>>,
}

/// Holds the slot for one run. Dropping it vacates the slot and then wakes
/// anyone waiting to start the next run.
struct RunRegistration {
    shared: Arc<PlayerShared>,
    id: u64,
    stop: watch::Receiver<bool>,
    _vacate: watch::Sender<()>,
}

impl Drop for RunRegistration {
    fn drop(&mut self) {
        let mut slot = self.shared.slot.lock();
        if slot.run.as_ref().is_some_and(|run| run.id == self.id) {
            slot.run = None;
        }
    }
}

/// A start waiting for the previous run to vacate. Counted in the slot
/// until it either registers or gives up.
struct QueuedStart {
    shared: Arc<PlayerShared>,
    generation: u64,
}

impl Drop for QueuedStart {
    fn drop(&mut self) {
        let mut slot = self.shared.slot.lock();
        slot.queued = slot.queued.saturating_sub(1);
    }
}

enum Claim {
    Registered(RunRegistration),
    Busy,
    Queued(QueuedStart, watch::Receiver<()>),
}

enum Begin {
    Registered(RunRegistration),
    Busy,
    Cancelled,
}

/// Playback state of one song: at most one run at a time.
///
/// Idle → Playing → (Completed | Stopped) → Idle. A stopped or finished song
/// can be played again.
#[derive(Clone)]
pub struct SongPlayer {
    shared: Arc<PlayerShared>,
}

impl SongPlayer {
    pub fn new(name: impl Into<String>, sink: Option<SharedSink>) -> Self {
        Self {
            shared: Arc::new(PlayerShared {
                name: name.into(),
                sink: RwLock::new(sink),
                slot: Mutex::new(Slot::default()),
                next_run: AtomicU64::new(1),
                background: Mutex::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn set_sink(&self, sink: Option<SharedSink>) {
        *self.shared.sink.write() = sink;
    }

    pub fn sink(&self) -> Option<SharedSink> {
        self.shared.sink.read().clone()
    }

    /// True while a run holds the player or a start is queued behind one.
    pub fn is_playing(&self) -> bool {
        let slot = self.shared.slot.lock();
        slot.run.is_some() || slot.queued > 0
    }

    /// Play `events` (already in timeline order) and return when the run ends.
    pub async fn play(&self, events: Vec<Event>) -> Result<RunOutcome, PlaybackError> {
        let sink = self.sink().ok_or(PlaybackError::NoSink)?;
        let claim = self.claim();
        run_claimed(&self.shared.name, events, sink, claim).await
    }

    /// Spawn the run in the background and return immediately. A run that is
    /// still winding down after a stop is waited out first. Needs a tokio
    /// runtime on the calling thread.
    pub fn start_playback(&self, events: Vec<Event>) -> Result<StartOutcome, PlaybackError> {
        let sink = self.sink().ok_or(PlaybackError::NoSink)?;
        let runtime = Handle::try_current().map_err(|_| PlaybackError::NoRuntime)?;
        let name = self.shared.name.clone();

        let claim = self.claim();
        if matches!(claim, Claim::Busy) {
            log::info!("'{}' is already playing", name);
            return Ok(StartOutcome::AlreadyPlaying);
        }
        let handle =
            runtime.spawn(async move { run_claimed(&name, events, sink, claim).await });

        // an earlier handle nobody waited on is detached, not aborted
        *self.shared.background.lock() = Some(handle);
        Ok(StartOutcome::Started)
    }

    /// Raise the stop flag of the current run and cancel any queued start.
    /// Idempotent.
    pub fn stop_playback(&self) -> StopOutcome {
        let mut slot = self.shared.slot.lock();
        let queued = slot.queued > 0;
        slot.generation += 1;
        match slot.run.as_ref() {
            Some(run) => {
                if !run.stop_requested() || queued {
                    log::info!("stopping '{}'", self.shared.name);
                }
                run.stop.send_replace(true);
                StopOutcome::Stopping
            }
            None if queued => {
                log::info!("cancelling queued start of '{}'", self.shared.name);
                StopOutcome::Stopping
            }
            None => StopOutcome::NotPlaying,
        }
    }

    /// Await the most recent background run, if one was started and not yet awaited.
    pub async fn wait(&self) -> Option<Result<RunOutcome, PlaybackError>> {
        let handle = self.shared.background.lock().take()?;
        Some(match handle.await {
            Ok(result) => result,
            Err(e) => Err(PlaybackError::Aborted(e.to_string())),
        })
    }

    /// Take the slot if it is free. Behind a stopping run with no other
    /// start already queued, queue up; otherwise the player is busy.
    fn claim(&self) -> Claim {
        let mut slot = self.shared.slot.lock();
        if let Some(run) = slot.run.as_ref() {
            if !run.stop_requested() || slot.queued > 0 {
                return Claim::Busy;
            }
            let vacated = run.vacated.clone();
            slot.queued += 1;
            let queued = QueuedStart {
                shared: self.shared.clone(),
                generation: slot.generation,
            };
            return Claim::Queued(queued, vacated);
        }
        Claim::Registered(register(&self.shared, &mut slot))
    }
}

fn register(shared: &Arc<PlayerShared>, slot: &mut Slot) -> RunRegistration {
    let id = shared.next_run.fetch_add(1, Ordering::Relaxed);
    let (stop_tx, stop_rx) = watch::channel(false);
    let (vacate_tx, vacate_rx) = watch::channel(());
    slot.run = Some(RunControl {
        id,
        stop: stop_tx,
        vacated: vacate_rx,
    });
    RunRegistration {
        shared: shared.clone(),
        id,
        stop: stop_rx,
        _vacate: vacate_tx,
    }
}

/// Wait out the stopping run, then register unless a stop arrived meanwhile.
async fn begin_queued(queued: QueuedStart, mut vacated: watch::Receiver<()>) -> Begin {
    loop {
        // errors once the registration holding the sender is dropped
        while vacated.changed().await.is_ok() {}

        let shared = queued.shared.clone();
        let mut slot = shared.slot.lock();
        if slot.generation != queued.generation {
            return Begin::Cancelled;
        }
        let still_stopping = match slot.run.as_ref() {
            None => None,
            Some(run) if run.stop_requested() => Some(run.vacated.clone()),
            Some(_) => return Begin::Busy,
        };
        match still_stopping {
            Some(next) => vacated = next,
            None => return Begin::Registered(register(&shared, &mut slot)),
        }
    }
}

async fn run_claimed(
    name: &str,
    events: Vec<Event>,
    sink: SharedSink,
    claim: Claim,
) -> Result<RunOutcome, PlaybackError> {
    let registration = match claim {
        Claim::Registered(registration) => registration,
        Claim::Busy => {
            log::info!("'{}' is already playing", name);
            return Ok(RunOutcome::AlreadyPlaying);
        }
        Claim::Queued(queued, vacated) => match begin_queued(queued, vacated).await {
            Begin::Registered(registration) => registration,
            Begin::Busy => {
                log::info!("'{}' is already playing", name);
                return Ok(RunOutcome::AlreadyPlaying);
            }
            Begin::Cancelled => {
                log::info!("queued start of '{}' was stopped before it began", name);
                return Ok(RunOutcome::Stopped);
            }
        },
    };
    run_registered(name, events, sink, registration).await
}

async fn run_registered(
    name: &str,
    events: Vec<Event>,
    sink: SharedSink,
    registration: RunRegistration,
) -> Result<RunOutcome, PlaybackError> {
    log::info!("playing '{}' ({} events)", name, events.len());
    let result = run_timeline(&events, sink, registration.stop.clone()).await;
    match &result {
        Ok(outcome) => log::info!("'{}' finished: {:?}", name, outcome),
        Err(e) => log::error!("'{}' failed: {}", name, e),
    }
    drop(registration);
    result
}

/// Sends the remaining note-offs and the all-notes-off pass when the run
/// unwinds, whichever way it ends.
struct Cleanup {
    sink: SharedSink,
    ledger: Arc<ActiveNotes>,
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        self.ledger.release_all(self.sink.as_ref());
    }
}

/// Walk `events` in order against a clock started now, racing every wait
/// against `stop`. Events at or before the previous event's time go out
/// without suspending.
pub async fn run_timeline(
    events: &[Event],
    sink: SharedSink,
    mut stop: watch::Receiver<bool>,
) -> Result<RunOutcome, PlaybackError> {
    let ledger = Arc::new(ActiveNotes::new());
    let _cleanup = Cleanup {
        sink: sink.clone(),
        ledger: ledger.clone(),
    };
    // declared after the cleanup guard so pending timers are aborted before it runs
    let mut timers = NoteOffTimers::new(sink.clone(), ledger.clone(), stop.clone());

    let start = Instant::now();
    let mut last_time: Seconds = 0.0;

    for event in events {
        let time = event.time();
        if time > last_time {
            tokio::select! {
                biased;
                _ = stopped(&mut stop) => {}
                _ = tokio::time::sleep_until(deadline_after(start, time)) => {}
            }
            last_time = time;
        }
        let stop_requested = *stop.borrow();
        if stop_requested {
            timers.join_all().await;
            return Ok(RunOutcome::Stopped);
        }

        if let Err(e) = dispatch(event, sink.as_ref(), &ledger, &mut timers) {
            timers.abort_all();
            return Err(PlaybackError::Send(e));
        }
    }

    timers.join_all().await;
    let stop_requested = *stop.borrow();
    if stop_requested {
        Ok(RunOutcome::Stopped)
    } else {
        Ok(RunOutcome::Completed)
    }
}

fn dispatch(
    event: &Event,
    sink: &dyn MidiSink,
    ledger: &ActiveNotes,
    timers: &mut NoteOffTimers,
) -> Result<(), MidiError> {
    match event {
        Event::Note {
            channel,
            pitch,
            velocity,
            duration,
            ..
        } => start_note(*pitch, *velocity, *channel, *duration, sink, ledger, timers),
        Event::Chord {
            channel,
            notes,
            velocity,
            duration,
            ..
        } => {
            for pitch in notes {
                start_note(*pitch, *velocity, *channel, *duration, sink, ledger, timers)?;
            }
            Ok(())
        }
        Event::Rest { .. } => Ok(()),
        Event::ProgramChange {
            channel, program, ..
        } => {
            ledger.touch(*channel);
            sink.program_change(*program, *channel)
        }
        Event::ControlChange {
            channel,
            control,
            value,
            ..
        } => {
            ledger.touch(*channel);
            sink.control_change(*control, *value, *channel)
        }
    }
}

fn start_note(
    pitch: u8,
    velocity: u8,
    channel: Channel,
    duration: Seconds,
    sink: &dyn MidiSink,
    ledger: &ActiveNotes,
    timers: &mut NoteOffTimers,
) -> Result<(), MidiError> {
    ledger.touch(channel);
    sink.note_on(pitch, velocity, channel)?;
    let ticket = ledger.open(pitch, channel);
    timers.arm(ticket, duration);
    Ok(())
}
