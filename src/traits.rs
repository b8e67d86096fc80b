//! Core traits that decouple spacemark from any specific compositor,
//! transport or output mechanism.
//!
//! Every concrete backend (Hyprland, a Unix-socket listener, a state file
//! writer, a test harness, …) implements one of these traits.  The
//! [`Daemon`](crate::daemon::Daemon) only depends on these abstractions.

use crate::bridge::SharedState;
use crate::daemon::Message;
use crate::persist::PersistedState;
use crate::probe::ProbeError;
use crate::workspace::StateSnapshot;
use std::fmt;
use std::sync::mpsc;

/// Source of raw workspace topology.
///
/// Implementations are called from probe worker threads, never from the
/// owner thread, so they are free to block on IPC.
pub trait StateProbe: Send + Sync {
    /// Return a validated snapshot, or a [`ProbeError`] if the
    /// introspection interface is unavailable or returned garbage.
    fn query(&self) -> Result<StateSnapshot, ProbeError>;
}

/// A keyboard shortcut: modifier names plus a key name.
///
/// Modifiers are upper-case names (`"SUPER"`, `"CTRL"`, …) kept sorted so
/// two bindings can be compared with `==`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyBinding {
    pub modifiers: Vec<String>,
    pub key: String,
}

impl KeyBinding {
    pub fn new<I, S>(modifiers: I, key: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut modifiers: Vec<String> = modifiers
            .into_iter()
            .map(|m| m.as_ref().trim().to_ascii_uppercase())
            .filter(|m| !m.is_empty())
            .collect();
        modifiers.sort();
        modifiers.dedup();
        Self {
            modifiers,
            key: key.into(),
        }
    }
}

impl fmt::Display for KeyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for m in &self.modifiers {
            write!(f, "{}+", m)?;
        }
        write!(f, "{}", self.key)
    }
}

/// The compositor-side operations the switch strategies need.
///
/// An implementation might talk to Hyprland via IPC and drive `ydotool`,
/// or it might be a recording stub used in tests.
pub trait Desktop: Send + Sync {
    /// The error type produced by this desktop.
    type Error: std::error::Error + Send + 'static;

    /// The shortcut currently bound to "go to workspace `workspace_id`",
    /// if any.
    fn workspace_binding(&self, workspace_id: &str) -> Result<Option<KeyBinding>, Self::Error>;

    /// Synthesize a key-down/key-up pair for `binding` at the input-device
    /// level.
    fn send_key(&self, binding: &KeyBinding) -> Result<(), Self::Error>;

    /// Address of the marker window pinned to `workspace_id`, if one exists.
    fn marker_window(&self, workspace_id: &str) -> Result<Option<String>, Self::Error>;

    /// Force-activate a window.  Activating a window on another workspace
    /// makes the compositor follow it there.
    fn activate_window(&self, address: &str) -> Result<(), Self::Error>;

    /// Open the workspace overview on `display_id`.
    fn open_overview(&self, display_id: &str) -> Result<(), Self::Error>;

    /// Click the overview tile at the 0-based `visual_index` of
    /// `display_id`.
    fn click_overview_tile(&self, display_id: &str, visual_index: usize) -> Result<(), Self::Error>;

    /// Dismiss the overview (e.g. with an escape keystroke).
    fn dismiss_overview(&self) -> Result<(), Self::Error>;

    /// Id of the workspace currently shown on `display_id`.  Used to check
    /// whether a strategy had a visible effect.
    fn active_workspace(&self, display_id: &str) -> Result<Option<String>, Self::Error>;
}

/// Receiver of debounced state publications.
///
/// `publish` is called on the owner thread and must not block: writers are
/// expected to hand the work to a background thread.
pub trait Publisher {
    fn publish(&self, state: SharedState);
}

/// Best-effort durable storage for the store's contents.
///
/// Same contract as [`Publisher`]: never block, never fail loudly.
pub trait Persist {
    fn save(&self, state: PersistedState);
}

//  Message Source

/// A source of [`Message`]s for the daemon's queue.
///
/// Implementations listen on some transport (a Unix socket, Hyprland's
/// event socket, an in-memory list) and push messages into the bounded
/// queue.
///
/// # Contract
///
/// * [`run`](MessageSource::run) **blocks** until the source is exhausted or
///   an unrecoverable error occurs.
/// * Implementations must be [`Send`] so they can run on a dedicated thread.
pub trait MessageSource: Send {
    /// The error type produced by this source.
    type Error: std::error::Error + Send + 'static;

    /// Start listening and forward every incoming message into `sink`.
    fn run(&mut self, sink: mpsc::SyncSender<Message>) -> Result<(), Self::Error>;
}
