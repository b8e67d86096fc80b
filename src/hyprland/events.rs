//! Turns Hyprland's event stream into probe triggers.
//!
//! Hyprland writes one `EVENT>>DATA` line per event to its event socket
//! (`socket2`) at
//! `$XDG_RUNTIME_DIR/hypr/$HYPRLAND_INSTANCE_SIGNATURE/.socket2.sock`.
//! [`HyprlandEventSource`] reads that stream and posts a
//! [`Message::Trigger`] for every event that may have changed the
//! workspace topology:
//!
//! | Events                                                    | Trigger            |
//! |-----------------------------------------------------------|--------------------|
//! | `workspace`, `focusedmon`, `createworkspace`, `destroyworkspace`, `moveworkspace`, `fullscreen` (and their `v2` forms) | `WorkspaceChanged` |
//! | `monitoradded`, `monitorremoved` (and `v2`)               | `DisplaysChanged`  |
//! | `activewindow`, `openwindow`, `closewindow`, `movewindow` (and `v2`) | `InputActivity` |
//!
//! The payload is never inspected; the probe re-reads the whole topology.

use super::{instance_dir, HyprlandError};
use crate::daemon::Message;
use crate::probe::ProbeSource;
use crate::traits::MessageSource;
use log::{debug, error, info, warn};
use std::io::{BufRead, BufReader};
use std::os::unix::net::UnixStream;
use std::sync::mpsc::{self, TrySendError};
use std::time::{Duration, Instant};

/// Minimum spacing of `InputActivity` triggers.  Focus changes can arrive
/// in bursts of dozens per second.
const ACTIVITY_INTERVAL: Duration = Duration::from_millis(100);

/// A [`MessageSource`] that listens to Hyprland's event socket.
#[derive(Debug, Default)]
pub struct HyprlandEventSource {
    last_activity: Option<Instant>,
}

impl HyprlandEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward one event line.  Returns `false` once the daemon is gone.
    fn forward(&mut self, line: &str, sink: &mpsc::SyncSender<Message>) -> bool {
        let Some((raw_event, _data)) = parse_event_line(line) else {
            return true;
        };
        let Some(source) = classify_event(raw_event) else {
            return true;
        };
        if source == ProbeSource::InputActivity {
            let now = Instant::now();
            if self
                .last_activity
                .is_some_and(|last| now.duration_since(last) < ACTIVITY_INTERVAL)
            {
                return true;
            }
            self.last_activity = Some(now);
        }
        match sink.try_send(Message::Trigger(source)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("queue full, dropping {} trigger", source);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Parse a single event line from socket2.
///
/// Lines have the form `EVENT>>DATA`.
fn parse_event_line(line: &str) -> Option<(&str, &str)> {
    let sep = line.find(">>")?;
    Some((&line[..sep], &line[sep + 2..]))
}

/// Map an event name to the probe trigger it implies, if any.
pub fn classify_event(raw_event: &str) -> Option<ProbeSource> {
    // Strip any namespace prefix (e.g. "plugin:workspace" → "workspace").
    let event = raw_event
        .rsplit_once(':')
        .map(|(_, name)| name)
        .unwrap_or(raw_event);
    let event = event.strip_suffix("v2").unwrap_or(event);
    match event {
        "workspace" | "focusedmon" | "createworkspace" | "destroyworkspace" | "moveworkspace"
        | "renameworkspace" | "fullscreen" => Some(ProbeSource::WorkspaceChanged),
        "monitoradded" | "monitorremoved" => Some(ProbeSource::DisplaysChanged),
        "activewindow" | "openwindow" | "closewindow" | "movewindow" => Some(ProbeSource::InputActivity),
        _ => None,
    }
}

impl MessageSource for HyprlandEventSource {
    type Error = HyprlandError;

    /// Connect to Hyprland's event socket and forward triggers.
    ///
    /// This method **blocks** until the socket is closed or the daemon
    /// goes away.  Run it on a dedicated thread.
    fn run(&mut self, sink: mpsc::SyncSender<Message>) -> Result<(), Self::Error> {
        let path = instance_dir()?.join(".socket2.sock");
        let stream = UnixStream::connect(&path)
            .map_err(|e| HyprlandError(format!("connect to {}: {}", path.display(), e)))?;
        info!("event source connected to {}", path.display());
        self.read_events(BufReader::new(stream), &sink)
    }
}

impl HyprlandEventSource {
    fn read_events<R: BufRead>(
        &mut self,
        reader: R,
        sink: &mpsc::SyncSender<Message>,
    ) -> Result<(), HyprlandError> {
        for line in reader.lines() {
            match line {
                Ok(line) if line.is_empty() => continue,
                Ok(line) => {
                    if !self.forward(&line, sink) {
                        debug!("daemon gone, event source stopping");
                        return Ok(());
                    }
                }
                Err(e) => {
                    error!("socket2 read error: {}", e);
                    return Err(HyprlandError(format!("read error: {}", e)));
                }
            }
        }
        warn!("socket2 stream ended");
        Ok(())
    }
}
