//! The two-tier name memory.
//!
//! * [`NameCache`] maps a workspace id to the name it was given.  It answers
//!   "is this still the workspace I named before?".
//! * [`IndexCache`] maps a `(display, position)` slot to the last name seen
//!   there.  It survives id churn and answers "the workspace that used to
//!   live here was probably called X".
//!
//! Neither cache ever stores an empty name.

use crate::workspace::Workspace;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// `id -> name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NameCache {
    names: HashMap<String, String>,
}

impl NameCache {
    /// Non-empty name remembered for `id`.
    pub fn get(&self, id: &str) -> Option<&str> {
        self.names
            .get(id)
            .map(String::as_str)
            .filter(|n| !n.is_empty())
    }

    /// Remember `name` for `id`.  An empty name removes the entry instead.
    pub fn insert(&mut self, id: &str, name: &str) {
        if name.is_empty() {
            self.names.remove(id);
        } else {
            self.names.insert(id.to_string(), name.to_string());
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<String> {
        self.names.remove(id)
    }

    /// Drop the entries of ids not in `live`.  An id is only trusted while
    /// the compositor keeps reporting it.
    pub fn retain_live(&mut self, live: &HashSet<&str>) {
        self.names.retain(|id, _| live.contains(id.as_str()));
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Key of an [`IndexCache`] entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub display_id: String,
    pub position_index: u32,
}

impl SlotKey {
    pub fn new(display_id: &str, position_index: u32) -> Self {
        Self {
            display_id: display_id.to_string(),
            position_index,
        }
    }

    pub fn of(ws: &Workspace) -> Self {
        Self::new(&ws.display_id, ws.position_index)
    }
}

/// On-disk form of one [`IndexCache`] entry (JSON object keys must be strings).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub display_id: String,
    pub position_index: u32,
    pub name: String,
}

/// `(display, position) -> name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<IndexEntry>", into = "Vec<IndexEntry>")]
pub struct IndexCache {
    names: HashMap<SlotKey, String>,
}

impl From<Vec<IndexEntry>> for IndexCache {
    fn from(entries: Vec<IndexEntry>) -> Self {
        let names = entries
            .into_iter()
            .filter(|e| !e.name.is_empty())
            .map(|e| (SlotKey::new(&e.display_id, e.position_index), e.name))
            .collect();
        Self { names }
    }
}

impl From<IndexCache> for Vec<IndexEntry> {
    fn from(cache: IndexCache) -> Self {
        let mut entries: Vec<IndexEntry> = cache
            .names
            .into_iter()
            .map(|(k, name)| IndexEntry {
                display_id: k.display_id,
                position_index: k.position_index,
                name,
            })
            .collect();
        // Sorted so the file contents are stable between writes.
        entries.sort_by(|a, b| {
            (a.display_id.as_str(), a.position_index).cmp(&(b.display_id.as_str(), b.position_index))
        });
        entries
    }
}

impl IndexCache {
    pub fn get(&self, display_id: &str, position_index: u32) -> Option<&str> {
        self.names
            .get(&SlotKey::new(display_id, position_index))
            .map(String::as_str)
            .filter(|n| !n.is_empty())
    }

    /// Remember `name` at a slot.  An empty name removes the entry instead.
    pub fn insert(&mut self, key: SlotKey, name: &str) {
        if name.is_empty() {
            self.names.remove(&key);
        } else {
            self.names.insert(key, name.to_string());
        }
    }

    pub fn remove(&mut self, key: &SlotKey) -> Option<String> {
        self.names.remove(key)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Both cache tiers, owned together by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameCaches {
    pub by_id: NameCache,
    pub by_slot: IndexCache,
}

impl NameCaches {
    pub fn new(by_id: NameCache, by_slot: IndexCache) -> Self {
        Self { by_id, by_slot }
    }

    /// Refill whichever tier is empty from the custom names in `workspaces`.
    ///
    /// Used at startup when the list survived but a cache file did not.
    /// Fullscreen entries are skipped: their names are derived, not chosen.
    /// Returns `true` if anything was rebuilt.
    pub fn rebuild_missing(&mut self, workspaces: &[Workspace]) -> bool {
        if workspaces.is_empty() {
            return false;
        }
        let rebuild_ids = self.by_id.is_empty();
        let rebuild_slots = self.by_slot.is_empty();
        if !rebuild_ids && !rebuild_slots {
            return false;
        }
        for ws in workspaces
            .iter()
            .filter(|w| !w.is_fullscreen && !w.custom_name.is_empty())
        {
            if rebuild_ids {
                self.by_id.insert(&ws.id, &ws.custom_name);
            }
            if rebuild_slots {
                self.by_slot.insert(SlotKey::of(ws), &ws.custom_name);
            }
        }
        true
    }

    /// Record a user-chosen name in both tiers, or clear both when empty.
    pub fn remember(&mut self, ws: &Workspace) {
        self.by_id.insert(&ws.id, &ws.custom_name);
        self.by_slot.insert(SlotKey::of(ws), &ws.custom_name);
    }

    /// Forget a deleted workspace.  The slot entry is only dropped if it
    /// still carries this workspace's name.
    pub fn forget(&mut self, ws: &Workspace) {
        self.by_id.remove(&ws.id);
        let key = SlotKey::of(ws);
        if self.by_slot.get(&key.display_id, key.position_index) == Some(ws.custom_name.as_str()) {
            self.by_slot.remove(&key);
        }
    }
}
