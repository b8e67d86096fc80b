//! Probe scheduling.
//!
//! A probe is requested whenever something suggests the topology changed
//! (see [`ProbeSource`]).  Each request gets a [`ProbeTicket`] with a
//! monotonically increasing generation.  The actual query runs on a worker
//! thread after a settle delay, and its [`ProbeOutcome`] is posted back to
//! the daemon's queue.  The daemon asks [`ProbeScheduler::accept`] whether
//! the outcome is still the newest one; superseded outcomes are dropped.

use crate::config::ProbeConfig;
use crate::daemon::Message;
use crate::traits::StateProbe;
use crate::workspace::StateSnapshot;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Errors from the introspection interface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    /// The interface could not be reached (socket missing, compositor gone).
    #[error("introspection unavailable: {0}")]
    Unavailable(String),
    /// The interface answered with something that does not parse or
    /// violates the snapshot invariants.
    #[error("malformed introspection result: {0}")]
    Malformed(String),
    /// No usable current-workspace indicator was reported.
    #[error("no current workspace reported")]
    NoCurrentSlot,
}

/// What caused a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProbeSource {
    /// Daemon start.
    Startup,
    /// The compositor announced a workspace change.
    WorkspaceChanged,
    /// Monitors were added, removed or reconfigured.
    DisplaysChanged,
    /// Generic input activity (focus changes, window open/close).
    InputActivity,
    /// An explicit `Refresh` command.
    Manual,
}

impl fmt::Display for ProbeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeSource::Startup => write!(f, "startup"),
            ProbeSource::WorkspaceChanged => write!(f, "workspace-changed"),
            ProbeSource::DisplaysChanged => write!(f, "displays-changed"),
            ProbeSource::InputActivity => write!(f, "input-activity"),
            ProbeSource::Manual => write!(f, "manual"),
        }
    }
}

/// Identifies one probe request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTicket {
    pub generation: u64,
    pub source: ProbeSource,
}

/// Result of one probe, posted back to the daemon.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub ticket: ProbeTicket,
    pub result: Result<StateSnapshot, ProbeError>,
}

/// Hands out generations and decides which outcomes are still current.
#[derive(Debug, Default)]
pub struct ProbeScheduler {
    latest: u64,
}

impl ProbeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a ticket for a new probe.
    pub fn issue(&mut self, source: ProbeSource) -> ProbeTicket {
        self.latest += 1;
        ProbeTicket {
            generation: self.latest,
            source,
        }
    }

    /// `true` if no newer probe has been issued since `ticket`.
    pub fn accept(&self, ticket: &ProbeTicket) -> bool {
        ticket.generation >= self.latest
    }

    pub fn latest_generation(&self) -> u64 {
        self.latest
    }
}

/// Timing of a single probe run.
#[derive(Debug, Clone, Copy)]
pub struct ProbeTiming {
    /// Wait before the first query so the compositor can finish its own
    /// bookkeeping.
    pub settle: Duration,
    /// How many queries to try while no current workspace is reported.
    pub attempts: u32,
    /// Pause between those attempts.
    pub retry: Duration,
}

impl From<&ProbeConfig> for ProbeTiming {
    fn from(cfg: &ProbeConfig) -> Self {
        Self {
            settle: Duration::from_millis(cfg.settle_ms),
            attempts: cfg.detect_attempts.max(1),
            retry: Duration::from_millis(cfg.retry_ms),
        }
    }
}

/// Run one probe synchronously: settle, then query until a current
/// workspace is reported or the detection window runs out.
pub fn run_probe<P: StateProbe + ?Sized>(probe: &P, timing: ProbeTiming) -> Result<StateSnapshot, ProbeError> {
    if !timing.settle.is_zero() {
        thread::sleep(timing.settle);
    }
    let mut attempt = 1;
    loop {
        match probe.query() {
            Err(ProbeError::NoCurrentSlot) if attempt < timing.attempts => {
                debug!("no current workspace yet (attempt {}), retrying", attempt);
                attempt += 1;
                thread::sleep(timing.retry);
            }
            other => return other,
        }
    }
}

/// Run a probe on a worker thread and post the outcome to `sink`.
pub fn spawn_probe<P>(probe: Arc<P>, ticket: ProbeTicket, timing: ProbeTiming, sink: mpsc::SyncSender<Message>)
where
    P: StateProbe + ?Sized + 'static,
{
    let spawned = thread::Builder::new()
        .name(format!("probe-{}", ticket.generation))
        .spawn(move || {
            let result = run_probe(probe.as_ref(), timing);
            if sink.send(Message::Probed(ProbeOutcome { ticket, result })).is_err() {
                debug!("daemon gone, dropping probe {}", ticket.generation);
            }
        });
    if let Err(e) = spawned {
        warn!("could not spawn probe thread: {}", e);
    }
}
