//! The owner loop.
//!
//! [`Daemon`] is the only owner of the [`StateStore`].  Every external
//! trigger (socket commands, compositor events, probe results) arrives as a
//! [`Message`] on one bounded queue and is handled here, one at a time.
//! Anything that may block (probes, switches, disk writes, publishing) is
//! handed to a worker thread; the loop itself only waits on the queue or on
//! the bridge's debounce deadline.

use crate::bridge::{NotificationBridge, SharedState};
use crate::command::{Command, Response};
use crate::diagnostics::{DiagnosticLog, Disposition};
use crate::persist::PersistedState;
use crate::probe::{spawn_probe, ProbeOutcome, ProbeScheduler, ProbeSource, ProbeTiming};
use crate::store::StateStore;
use crate::switcher::{SwitchCoordinator, SwitchPlan};
use crate::traits::{Desktop, Persist, StateProbe};
use crate::workspace::Workspace;
use log::{debug, info, warn};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Instant;

/// Capacity of the daemon's message queue.
pub const QUEUE_CAPACITY: usize = 256;

/// Everything the owner loop reacts to.
#[derive(Debug)]
pub enum Message {
    /// A command from a client.  Queries are answered on `reply`.
    Command {
        command: Command,
        reply: Option<mpsc::Sender<Response>>,
    },
    /// Something suggests the topology changed; schedule a probe.
    Trigger(ProbeSource),
    /// A probe finished.
    Probed(ProbeOutcome),
    /// Flush pending publications and stop.
    Shutdown,
}

/// Settings the owner loop needs beyond its collaborators.
#[derive(Debug, Clone, Copy)]
pub struct DaemonOptions {
    pub probe_timing: ProbeTiming,
    /// `SwitchNext` past the last workspace goes to the first.
    pub wrap_around: bool,
}

pub struct Daemon<D: Desktop + 'static> {
    store: StateStore,
    scheduler: ProbeScheduler,
    probe: Arc<dyn StateProbe>,
    switcher: SwitchCoordinator<D>,
    bridge: NotificationBridge,
    persist: Box<dyn Persist>,
    diagnostics: DiagnosticLog,
    options: DaemonOptions,
    tx: mpsc::SyncSender<Message>,
    rx: mpsc::Receiver<Message>,
}

impl<D: Desktop + 'static> Daemon<D> {
    pub fn new(
        store: StateStore,
        probe: Arc<dyn StateProbe>,
        switcher: SwitchCoordinator<D>,
        bridge: NotificationBridge,
        persist: Box<dyn Persist>,
        options: DaemonOptions,
    ) -> Self {
        let (tx, rx) = mpsc::sync_channel(QUEUE_CAPACITY);
        Self {
            store,
            scheduler: ProbeScheduler::new(),
            probe,
            switcher,
            bridge,
            persist,
            diagnostics: DiagnosticLog::disabled(),
            options,
            tx,
            rx,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: DiagnosticLog) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// A handle for message sources.
    pub fn sender(&self) -> mpsc::SyncSender<Message> {
        self.tx.clone()
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Process messages until [`Message::Shutdown`].
    ///
    /// Returns once the final publish and every queued save have been
    /// written: dropping the collaborators joins their writer threads.
    pub fn run(mut self) {
        info!("daemon running");
        loop {
            let received = match self.bridge.deadline() {
                Some(deadline) => self
                    .rx
                    .recv_timeout(deadline.saturating_duration_since(Instant::now())),
                None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(Message::Shutdown) => break,
                Ok(msg) => self.handle(msg),
                Err(RecvTimeoutError::Timeout) => {
                    self.bridge.poll(Instant::now());
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.bridge.flush();
        info!("daemon stopped");
    }

    /// Handle one message.  [`Message::Shutdown`] is handled by
    /// [`run`](Self::run).
    pub fn handle(&mut self, msg: Message) {
        match msg {
            Message::Trigger(source) => self.schedule_probe(source),
            Message::Probed(outcome) => self.apply_probe(outcome),
            Message::Command { command, reply } => self.handle_command(command, reply),
            Message::Shutdown => {}
        }
    }

    //  Probing

    fn schedule_probe(&mut self, source: ProbeSource) {
        let ticket = self.scheduler.issue(source);
        debug!("probe {} scheduled ({})", ticket.generation, source);
        spawn_probe(
            Arc::clone(&self.probe),
            ticket,
            self.options.probe_timing,
            self.tx.clone(),
        );
    }

    fn apply_probe(&mut self, outcome: ProbeOutcome) {
        let ticket = outcome.ticket;
        if !self.scheduler.accept(&ticket) {
            debug!(
                "discarding probe {} (latest is {})",
                ticket.generation,
                self.scheduler.latest_generation()
            );
            self.diagnostics.record(&outcome, Disposition::Superseded);
            return;
        }
        let disposition = match &outcome.result {
            Ok(snapshot) => {
                let changed = self.store.refresh(snapshot.clone());
                if changed {
                    self.state_changed();
                }
                Disposition::Applied { changed }
            }
            Err(e) => {
                debug!("probe {} failed, keeping state: {}", ticket.generation, e);
                Disposition::Kept
            }
        };
        self.diagnostics.record(&outcome, disposition);
    }

    /// Fan a store change out to the bridge and to disk.
    fn state_changed(&mut self) {
        self.bridge
            .state_changed(SharedState::from_store(&self.store), Instant::now());
        self.persist.save(PersistedState::new(
            self.store.workspaces(),
            self.store.caches(),
        ));
    }

    //  Commands

    fn handle_command(&mut self, command: Command, reply: Option<mpsc::Sender<Response>>) {
        debug!("command {:?}", command);
        match command {
            Command::SwitchNext { display } => self.switch_relative(display, Step::Next),
            Command::SwitchPrevious { display } => self.switch_relative(display, Step::Previous),
            Command::SwitchTo { id } => self.switch_to(&id),
            Command::Rename { id, name } => {
                let result = self.store.rename(&id, &name);
                self.after_edit("rename", result);
            }
            Command::Reorder { id, position } => {
                let result = self.store.reorder(&id, position);
                self.after_edit("reorder", result);
            }
            Command::Delete { id } => {
                let result = self.store.delete(&id).map(|_| true);
                self.after_edit("delete", result);
            }
            Command::SetBridgeEnabled(enabled) => self.bridge.set_enabled(enabled),
            Command::Refresh => self.schedule_probe(ProbeSource::Manual),
            query @ (Command::GetActiveWorkspace | Command::GetWorkspaceList) => {
                let Some(response) = self.bridge.answer(&query, &self.store) else {
                    return;
                };
                match reply {
                    Some(reply) => {
                        if reply.send(response).is_err() {
                            debug!("query client went away");
                        }
                    }
                    None => debug!("query without reply channel"),
                }
            }
        }
    }

    fn after_edit(&mut self, what: &str, result: Result<bool, crate::store::StoreError>) {
        match result {
            Ok(true) => self.state_changed(),
            Ok(false) => debug!("{}: nothing changed", what),
            Err(e) => warn!("{} rejected: {}", what, e),
        }
    }

    fn switch_relative(&mut self, display: Option<String>, step: Step) {
        let Some(display) = display.or_else(|| self.store.current_display_id().map(String::from)) else {
            debug!("no current display yet");
            return;
        };
        match relative_target(&self.store, &display, step, self.options.wrap_around) {
            Some(id) => self.switch_to(&id),
            None => debug!("no {:?} workspace on {}", step, display),
        }
    }

    fn switch_to(&mut self, id: &str) {
        let Some(target) = self.store.get(id).filter(|_| self.store.is_live(id)) else {
            warn!("cannot switch to {}: not a live workspace", id);
            return;
        };
        if self.store.active_on(&target.display_id).map(|w| w.id.as_str()) == Some(id) {
            debug!("{} is already shown", id);
            return;
        }
        let plan = SwitchPlan::new(
            target.clone(),
            self.store
                .live_on(&target.display_id)
                .into_iter()
                .cloned()
                .collect::<Vec<Workspace>>(),
        );
        self.switcher.switch_to(plan);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Next,
    Previous,
}

/// Id of the live workspace one step away from the one shown on `display`.
fn relative_target(store: &StateStore, display: &str, step: Step, wrap: bool) -> Option<String> {
    let live = store.live_on(display);
    let current = store.active_on(display)?;
    let idx = live.iter().position(|w| w.id == current.id)?;
    let len = live.len();
    let next = match step {
        Step::Next if idx + 1 < len => idx + 1,
        Step::Next if wrap => 0,
        Step::Previous if idx > 0 => idx - 1,
        Step::Previous if wrap => len - 1,
        _ => return None,
    };
    if next == idx {
        return None;
    }
    live.get(next).map(|w| w.id.clone())
}
