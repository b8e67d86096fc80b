//! Durable storage of the workspace list and the two name caches.
//!
//! Three JSON files live in the data directory:
//!
//! | file               | contents                      |
//! |--------------------|-------------------------------|
//! | `workspaces.json`  | every known [`Workspace`]     |
//! | `name_cache.json`  | [`NameCache`] (`id → name`)   |
//! | `index_cache.json` | [`IndexCache`] (slot → name)  |
//!
//! Loading is best effort: a missing or unreadable file yields an empty
//! value.  Writing happens on a background thread ([`Persister`]) and
//! failures are only logged; the in-memory store stays authoritative.

use crate::cache::{IndexCache, NameCache, NameCaches};
use crate::traits::Persist;
use crate::workspace::Workspace;
use crate::writer::BackgroundWriter;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const WORKSPACES_FILE: &str = "workspaces.json";
const NAME_CACHE_FILE: &str = "name_cache.json";
const INDEX_CACHE_FILE: &str = "index_cache.json";

/// Errors from reading or writing the state files.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything that survives a restart.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedState {
    pub workspaces: Vec<Workspace>,
    pub name_cache: NameCache,
    pub index_cache: IndexCache,
}

impl PersistedState {
    pub fn new(workspaces: &[Workspace], caches: &NameCaches) -> Self {
        Self {
            workspaces: workspaces.to_vec(),
            name_cache: caches.by_id.clone(),
            index_cache: caches.by_slot.clone(),
        }
    }
}

/// The state files in one directory.
#[derive(Debug, Clone)]
pub struct StateFiles {
    dir: PathBuf,
}

impl StateFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load all three files.  Anything missing or malformed is replaced by
    /// an empty value and logged.
    pub fn load(&self) -> PersistedState {
        PersistedState {
            workspaces: self.load_or_default(WORKSPACES_FILE),
            name_cache: self.load_or_default(NAME_CACHE_FILE),
            index_cache: self.load_or_default(INDEX_CACHE_FILE),
        }
    }

    fn load_or_default<T: DeserializeOwned + Default>(&self, name: &str) -> T {
        let path = self.dir.join(name);
        match read_json(&path) {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!("{} does not exist yet", path.display());
                T::default()
            }
            Err(e) => {
                warn!("ignoring stored state: {}", e);
                T::default()
            }
        }
    }

    /// Write all three files, each one atomically.
    pub fn write(&self, state: &PersistedState) -> Result<(), PersistError> {
        fs::create_dir_all(&self.dir).map_err(|source| PersistError::Io {
            path: self.dir.clone(),
            source,
        })?;
        write_json_atomic(&self.dir.join(WORKSPACES_FILE), &state.workspaces)?;
        write_json_atomic(&self.dir.join(NAME_CACHE_FILE), &state.name_cache)?;
        write_json_atomic(&self.dir.join(INDEX_CACHE_FILE), &state.index_cache)?;
        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistError> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PersistError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|source| PersistError::Json {
            path: path.to_path_buf(),
            source,
        })
}

/// Serialize `value` to `<path>.tmp` and rename it over `path`.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PersistError> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| PersistError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let mut tmp = path.to_path_buf().into_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let io_err = |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = fs::File::create(&tmp).map_err(io_err)?;
    file.write_all(&json).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)
}

/// Background writer.
///
/// [`save`](Persist::save) only enqueues; the writer thread collapses
/// queued saves to the newest one before touching the disk.
pub struct Persister {
    writer: BackgroundWriter<PersistedState>,
}

impl Persister {
    /// Spawn the writer thread for `files`.
    pub fn spawn(files: StateFiles) -> io::Result<Self> {
        let writer = BackgroundWriter::spawn("persist", true, move |state: PersistedState| {
            match files.write(&state) {
                Ok(()) => debug!(
                    "saved {} workspaces to {}",
                    state.workspaces.len(),
                    files.dir().display()
                ),
                Err(e) => warn!("skipping state save: {}", e),
            }
        })?;
        Ok(Self { writer })
    }

    /// Wait for queued saves to reach the disk.  Dropping the persister
    /// does the same.
    pub fn close(mut self) {
        self.writer.close();
    }
}

impl Persist for Persister {
    fn save(&self, state: PersistedState) {
        if !self.writer.send(state) {
            warn!("persist thread is gone; state not saved");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SlotKey;
    use crate::workspace::fixtures::slot;
    use std::time::{Duration, Instant};

    fn sample() -> PersistedState {
        let mut ws = Workspace::from_raw(&slot("4", "DP-1", 2));
        ws.custom_name = "Work".into();
        let mut name_cache = NameCache::default();
        name_cache.insert("4", "Work");
        let mut index_cache = IndexCache::default();
        index_cache.insert(SlotKey::new("DP-1", 2), "Work");
        PersistedState {
            workspaces: vec![ws],
            name_cache,
            index_cache,
        }
    }

    #[test]
    fn write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let files = StateFiles::new(dir.path().join("nested"));
        files.write(&sample()).unwrap();
        assert_eq!(files.load(), sample());
        assert!(!dir.path().join("nested/workspaces.json.tmp").exists());
    }

    #[test]
    fn missing_directory_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let files = StateFiles::new(dir.path().join("absent"));
        assert_eq!(files.load(), PersistedState::default());
    }

    #[test]
    fn corrupt_file_is_ignored_individually() {
        let dir = tempfile::tempdir().unwrap();
        let files = StateFiles::new(dir.path());
        files.write(&sample()).unwrap();
        fs::write(dir.path().join(NAME_CACHE_FILE), "{ not json").unwrap();

        let loaded = files.load();
        assert!(loaded.name_cache.is_empty());
        assert_eq!(loaded.workspaces, sample().workspaces);
        assert_eq!(loaded.index_cache.get("DP-1", 2), Some("Work"));
    }

    #[test]
    fn persister_writes_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let files = StateFiles::new(dir.path());
        let persister = Persister::spawn(files.clone()).unwrap();
        persister.save(sample());

        let deadline = Instant::now() + Duration::from_secs(2);
        while files.load() != sample() {
            assert!(Instant::now() < deadline, "state was not written");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn close_flushes_queued_save() {
        let dir = tempfile::tempdir().unwrap();
        let files = StateFiles::new(dir.path());
        let persister = Persister::spawn(files.clone()).unwrap();
        persister.save(PersistedState::default());
        persister.save(sample());
        persister.close();
        assert_eq!(files.load(), sample());
    }
}
