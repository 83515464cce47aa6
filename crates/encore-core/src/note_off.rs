use crate::active_notes::{ActiveNotes, NoteTicket};
use encore_ports::midi::SharedSink;
use encore_ports::types::Seconds;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Resolves once the run's stop flag is raised. With the sender gone nobody
/// can raise it any more, so this never resolves.
pub(crate) async fn stopped(stop: &mut watch::Receiver<bool>) {
    if stop.wait_for(|stopped| *stopped).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Negative and NaN lengths collapse to zero; absurdly long ones saturate.
pub(crate) fn seconds_to_duration(seconds: Seconds) -> Duration {
    if seconds.is_nan() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

pub(crate) fn deadline_after(start: Instant, seconds: Seconds) -> Instant {
    let offset = seconds_to_duration(seconds);
    start
        .checked_add(offset)
        .unwrap_or_else(|| start + Duration::from_secs(60 * 60 * 24 * 365))
}

/// One timer task per sounding pitch of a run.
///
/// Each timer sleeps for the note's duration or until the run is stopped,
/// whichever is first, then releases its ticket and sends the note-off if
/// the cleanup pass has not already taken it. Timers never affect one
/// another; dropping the set aborts whatever is still pending.
pub struct NoteOffTimers {
    sink: SharedSink,
    ledger: Arc<ActiveNotes>,
    stop: watch::Receiver<bool>,
    tasks: JoinSet<()>,
}

impl NoteOffTimers {
    pub fn new(sink: SharedSink, ledger: Arc<ActiveNotes>, stop: watch::Receiver<bool>) -> Self {
        Self {
            sink,
            ledger,
            stop,
            tasks: JoinSet::new(),
        }
    }

    pub fn arm(&mut self, ticket: NoteTicket, duration: Seconds) {
        let deadline = deadline_after(Instant::now(), duration);
        let sink = self.sink.clone();
        let ledger = self.ledger.clone();
        let mut stop = self.stop.clone();

        self.tasks.spawn(async move {
            tokio::select! {
                biased;
                _ = stopped(&mut stop) => {}
                _ = tokio::time::sleep_until(deadline) => {}
            }
            if !ledger.release(&ticket) {
                return;
            }
            if let Err(e) = sink.note_off(ticket.pitch, ticket.channel) {
                log::warn!(
                    "note-off failed: note {} channel {}: {}",
                    ticket.pitch,
                    ticket.channel,
                    e
                );
            }
        });
    }

    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every armed timer. Timers still race the stop flag while this waits.
    pub async fn join_all(&mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                if e.is_panic() {
                    log::error!("note-off timer panicked: {}", e);
                }
            }
        }
    }

    pub fn abort_all(&mut self) {
        self.tasks.abort_all();
    }
}
