//! Notification bridge: debounced publication of the current state for
//! out-of-process consumers, and answers to the two query commands.
//!
//! ```text
//!  store change ─► state_changed() ─► Debouncer ─(window elapsed)─► Publisher
//!                                      ▲    │
//!                     next change ─────┘    └─ deadline, reset on every change
//! ```
//!
//! The bridge itself never blocks: [`FilePublisher`] does the file write
//! and the reload signal on its own thread.

use crate::command::{Command, Response, WorkspaceListEntry, WorkspaceRef};
use crate::persist::write_json_atomic;
use crate::store::StateStore;
use crate::traits::Publisher;
use crate::workspace::Workspace;
use crate::writer::BackgroundWriter;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};

//  Shared state blob

/// What external consumers read after each publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedState {
    /// The workspace the user is looking at, if known.
    pub active: Option<SharedWorkspace>,
    /// Every display with its live workspaces in user order.
    pub displays: Vec<SharedDisplay>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedWorkspace {
    pub id: String,
    pub name: String,
    pub position_number: u32,
    pub is_fullscreen: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedDisplay {
    pub display_id: String,
    pub active_id: Option<String>,
    pub workspaces: Vec<SharedWorkspace>,
}

impl SharedWorkspace {
    fn of(ws: &Workspace) -> Self {
        Self {
            id: ws.id.clone(),
            name: ws.display_name(),
            position_number: ws.position_index,
            is_fullscreen: ws.is_fullscreen,
        }
    }
}

impl SharedState {
    pub fn from_store(store: &StateStore) -> Self {
        let mut displays: Vec<SharedDisplay> = Vec::new();
        for ws in store.live_workspaces() {
            match displays.last_mut() {
                Some(d) if d.display_id == ws.display_id => d.workspaces.push(SharedWorkspace::of(ws)),
                _ => displays.push(SharedDisplay {
                    display_id: ws.display_id.clone(),
                    active_id: store.active_on(&ws.display_id).map(|a| a.id.clone()),
                    workspaces: vec![SharedWorkspace::of(ws)],
                }),
            }
        }
        Self {
            active: store.active().map(SharedWorkspace::of),
            displays,
        }
    }
}

//  Debouncer

/// A resettable one-shot deadline.
///
/// Every [`touch`](Debouncer::touch) replaces the pending deadline with
/// `now + window`; it is never extended cumulatively.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    pub fn touch(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// `true` (and disarmed) if the deadline has passed.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(d) if now >= d => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

//  Bridge

pub struct NotificationBridge {
    publisher: Box<dyn Publisher>,
    debouncer: Debouncer,
    pending: Option<SharedState>,
    enabled: bool,
}

impl NotificationBridge {
    pub fn new(publisher: Box<dyn Publisher>, debounce: Duration, enabled: bool) -> Self {
        Self {
            publisher,
            debouncer: Debouncer::new(debounce),
            pending: None,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable query answers.  Publishing is unaffected.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            info!("query answers {}", if enabled { "enabled" } else { "disabled" });
        }
        self.enabled = enabled;
    }

    /// Record a new state and restart the debounce window.
    pub fn state_changed(&mut self, state: SharedState, now: Instant) {
        self.pending = Some(state);
        self.debouncer.touch(now);
    }

    /// When [`poll`](Self::poll) next has work to do.
    pub fn deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// Publish the pending state if the window has elapsed.  Returns
    /// `true` if something was published.
    pub fn poll(&mut self, now: Instant) -> bool {
        if !self.debouncer.fire(now) {
            return false;
        }
        self.publish_pending()
    }

    /// Publish the pending state immediately, if any.
    pub fn flush(&mut self) -> bool {
        self.debouncer.cancel();
        self.publish_pending()
    }

    fn publish_pending(&mut self) -> bool {
        match self.pending.take() {
            Some(state) => {
                debug!("publishing state ({} displays)", state.displays.len());
                self.publisher.publish(state);
                true
            }
            None => false,
        }
    }

    /// Answer a query command.  `None` for non-queries, when disabled, or
    /// when there is nothing to report.
    pub fn answer(&self, command: &Command, store: &StateStore) -> Option<Response> {
        if !self.enabled {
            debug!("bridge disabled, ignoring {:?}", command);
            return None;
        }
        match command {
            Command::GetActiveWorkspace => store.active().map(|ws| {
                Response::ActiveWorkspace(WorkspaceRef {
                    id: ws.id.clone(),
                    name: ws.display_name(),
                    position_number: ws.position_index,
                })
            }),
            Command::GetWorkspaceList => Some(Response::WorkspaceList(
                store
                    .live_workspaces()
                    .into_iter()
                    .map(|ws| WorkspaceListEntry {
                        id: ws.id.clone(),
                        name: ws.display_name(),
                        position_number: ws.position_index,
                        display_id: ws.display_id.clone(),
                    })
                    .collect(),
            )),
            _ => None,
        }
    }
}

//  File publisher

/// Writes the state blob to a file and runs a reload command, on a
/// background thread.  Dropping it waits for the last publish to finish.
pub struct FilePublisher {
    writer: BackgroundWriter<SharedState>,
}

impl FilePublisher {
    pub fn spawn(path: PathBuf, reload_command: Option<Vec<String>>) -> io::Result<Self> {
        let writer = BackgroundWriter::spawn("publish", true, move |state: SharedState| {
            if let Some(parent) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    warn!("cannot create {}: {}", parent.display(), e);
                    return;
                }
            }
            if let Err(e) = write_json_atomic(&path, &state) {
                warn!("skipping state publish: {}", e);
                return;
            }
            if let Some(cmd) = &reload_command {
                signal_reload(cmd);
            }
        })?;
        Ok(Self { writer })
    }
}

impl Publisher for FilePublisher {
    fn publish(&self, state: SharedState) {
        if !self.writer.send(state) {
            warn!("publish thread is gone; state not published");
        }
    }
}

fn signal_reload(cmd: &[String]) {
    let Some((program, args)) = cmd.split_first() else {
        return;
    };
    match process::Command::new(program).args(args).output() {
        Ok(output) if output.status.success() => {}
        Ok(output) => warn!(
            "reload command {:?} exited with {}: {}",
            cmd,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ),
        Err(e) => warn!("failed to run reload command {:?}: {}", cmd, e),
    }
}
