//! Unix-socket [`MessageSource`] implementation.
//!
//! Binds a Unix stream socket and accepts one connection at a time.
//! Each line received is parsed as a JSON-encoded [`Command`] and posted to
//! the daemon.  Query commands are answered on the same connection with one
//! line of JSON, or not at all when the daemon has nothing to say (for
//! example because the bridge is disabled).
//!
//! # Wire format
//!
//! ```json
//! {"SwitchNext":{}}
//! {"SwitchTo":{"id":"4"}}
//! {"Rename":{"id":"4","name":"Mail"}}
//! "GetActiveWorkspace"
//! ```
//!
//! A `GetActiveWorkspace` answer looks like
//! `{"ActiveWorkspace":{"id":"4","name":"Mail","position_number":2}}`.

use crate::command::{Command, Response};
use crate::daemon::Message;
use crate::traits::MessageSource;
use log::{debug, error, info};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

/// How long a query waits for the daemon before giving up silently.
const QUERY_TIMEOUT: Duration = Duration::from_secs(1);

/// A [`MessageSource`] that listens on a Unix stream socket for
/// JSON-encoded commands.
///
/// Each accepted connection can send multiple newline-delimited JSON
/// commands.  When the connection closes, the listener waits for the
/// next one.
pub struct UnixSocketListener {
    path: PathBuf,
}

/// Errors produced by the Unix socket listener.
#[derive(Debug, thiserror::Error)]
pub enum UnixSocketError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// What became of one connection.
enum Session {
    Closed,
    DaemonGone,
}

impl UnixSocketListener {
    /// Create a new listener bound to `path`.
    ///
    /// The socket file is created when [`run`](MessageSource::run) is called.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// The filesystem path of the socket.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn serve(&self, stream: UnixStream, sink: &mpsc::SyncSender<Message>) -> Result<Session, UnixSocketError> {
        let mut writer = stream.try_clone()?;
        let reader = BufReader::new(stream);
        for line in reader.lines() {
            let text = line?;
            if text.trim().is_empty() {
                continue;
            }
            let command = match serde_json::from_str::<Command>(&text) {
                Ok(cmd) => cmd,
                Err(e) => {
                    error!("bad command: {} ({})", text, e);
                    continue;
                }
            };
            debug!("received {:?}", command);

            if !command.is_query() {
                if sink.send(Message::Command { command, reply: None }).is_err() {
                    return Ok(Session::DaemonGone);
                }
                continue;
            }

            let (reply_tx, reply_rx) = mpsc::channel::<Response>();
            if sink
                .send(Message::Command {
                    command,
                    reply: Some(reply_tx),
                })
                .is_err()
            {
                return Ok(Session::DaemonGone);
            }
            match reply_rx.recv_timeout(QUERY_TIMEOUT) {
                Ok(response) => {
                    let mut json = serde_json::to_string(&response)?;
                    json.push('\n');
                    writer.write_all(json.as_bytes())?;
                }
                Err(RecvTimeoutError::Timeout) => debug!("query timed out"),
                Err(RecvTimeoutError::Disconnected) => debug!("query not answered"),
            }
        }
        Ok(Session::Closed)
    }
}

impl MessageSource for UnixSocketListener {
    type Error = UnixSocketError;

    /// Bind the socket and start accepting connections.
    ///
    /// This method **blocks** until the daemon goes away.  Run it on a
    /// dedicated thread.
    fn run(&mut self, sink: mpsc::SyncSender<Message>) -> Result<(), Self::Error> {
        // Remove stale socket if present.
        let _ = std::fs::remove_file(&self.path);

        let listener = UnixListener::bind(&self.path)?;
        info!("listening on {}", self.path.display());

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    debug!("client connected");
                    match self.serve(stream, &sink) {
                        Ok(Session::Closed) => debug!("client disconnected"),
                        Ok(Session::DaemonGone) => {
                            info!("sink closed, shutting down");
                            break;
                        }
                        Err(e) => error!("client error: {}", e),
                    }
                }
                Err(e) => {
                    error!("accept error: {}", e);
                }
            }
        }
        let _ = std::fs::remove_file(&self.path);
        Ok(())
    }
}

//  Tests
