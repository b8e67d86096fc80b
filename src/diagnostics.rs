//! Diagnostic probe log.
//!
//! When diagnostics are enabled every probe outcome, accepted, superseded
//! or failed, is appended as one line with a timestamp and the trigger that
//! caused it.  The file rotates by size and keeps exactly two files:
//! `<name>` (active) and `<name>.old` (previous).
//!
//! Lines are formatted on the owner thread and written by a
//! [`BackgroundWriter`].

use crate::probe::{ProbeOutcome, ProbeTicket};
use crate::writer::BackgroundWriter;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

/// Size-rotating append-only file.
///
/// Re-creates the file if it was deleted externally; created files get
/// 0o600 permissions on Unix.
pub struct RotatingFile {
    path: PathBuf,
    backup_path: PathBuf,
    max_size_bytes: u64,
    file: Option<File>,
}

impl RotatingFile {
    pub fn new(path: impl Into<PathBuf>, max_size_bytes: u64) -> Self {
        let path = path.into();
        let mut backup = path.clone().into_os_string();
        backup.push(".old");
        Self {
            path,
            backup_path: PathBuf::from(backup),
            max_size_bytes,
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_secure(path: &Path, append: bool) -> io::Result<File> {
        let mut options = fs::OpenOptions::new();
        options.create(true).write(true);
        if append {
            options.append(true);
        } else {
            options.truncate(true);
        }
        #[cfg(unix)]
        {
            options.mode(0o600);
        }
        options.open(path)
    }

    /// Open the file if not open, or re-open it if it was deleted.
    fn ensure_open(&mut self) -> io::Result<&mut File> {
        if !self.path.exists() {
            self.file = None;
        }
        match self.file {
            Some(ref mut file) => Ok(file),
            None => {
                if let Some(parent) = self.path.parent() {
                    fs::create_dir_all(parent)?;
                }
                Ok(self.file.insert(Self::open_secure(&self.path, true)?))
            }
        }
    }

    /// current -> backup, then start a fresh current.
    fn rotate(&mut self) -> io::Result<()> {
        self.file = None;
        if self.path.exists() {
            fs::rename(&self.path, &self.backup_path)?;
        }
        self.file = Some(Self::open_secure(&self.path, false)?);
        Ok(())
    }

    /// Append one line, rotating first if the file is over the limit.
    pub fn append_line(&mut self, line: &str) -> io::Result<()> {
        let size = match self.ensure_open() {
            Ok(f) => f.metadata()?.len(),
            Err(_) => 0,
        };
        if size >= self.max_size_bytes {
            if let Err(e) = self.rotate() {
                log::warn!("failed to rotate {}: {}", self.path.display(), e);
            }
        }

        let file = self.ensure_open()?;
        writeln!(file, "{}", line)?;
        file.flush()
    }
}

/// How the daemon treated a probe outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Applied to the store; `changed` is whether anything differed.
    Applied { changed: bool },
    /// A newer probe had been issued meanwhile.
    Superseded,
    /// The probe failed; the previous state was kept.
    Kept,
}

/// The probe diagnostic log.  A disabled log ignores every record.
pub struct DiagnosticLog {
    writer: Option<BackgroundWriter<String>>,
}

impl DiagnosticLog {
    pub fn disabled() -> Self {
        Self { writer: None }
    }

    /// Start the writer thread for a log at `path`.
    pub fn to_file(path: impl Into<PathBuf>, max_size_bytes: u64) -> io::Result<Self> {
        let mut file = RotatingFile::new(path, max_size_bytes);
        let writer = BackgroundWriter::spawn("diagnostics", false, move |line: String| {
            if let Err(e) = file.append_line(&line) {
                log::debug!("diagnostic log write to {} failed: {}", file.path().display(), e);
            }
        })?;
        Ok(Self {
            writer: Some(writer),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }

    /// Record one probe outcome.  Write errors are reported through `log`
    /// and otherwise ignored.
    pub fn record(&self, outcome: &ProbeOutcome, disposition: Disposition) {
        let Some(writer) = &self.writer else {
            return;
        };
        let line = format_line(
            &chrono::Local::now().to_rfc3339(),
            &outcome.ticket,
            outcome,
            disposition,
        );
        writer.send(line);
    }
}

fn format_line(
    timestamp: &str,
    ticket: &ProbeTicket,
    outcome: &ProbeOutcome,
    disposition: Disposition,
) -> String {
    let result = match &outcome.result {
        Ok(snap) => format!(
            "ok current={} display={} slots={}",
            snap.current_workspace_id,
            snap.current_display_id,
            snap.slots().count()
        ),
        Err(e) => format!("error {}", e),
    };
    let disposition = match disposition {
        Disposition::Applied { changed: true } => "applied (changed)",
        Disposition::Applied { changed: false } => "applied (unchanged)",
        Disposition::Superseded => "superseded",
        Disposition::Kept => "kept previous state",
    };
    format!(
        "{} source={} generation={} {} -> {}",
        timestamp, ticket.source, ticket.generation, result, disposition
    )
}
