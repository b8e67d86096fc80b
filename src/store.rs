//! The canonical workspace list.
//!
//! [`StateStore`] owns every [`Workspace`] ever observed (live or dormant),
//! the current-position pointer, and the two name caches.  It is only ever
//! touched by the daemon's owner thread; see [`crate::daemon`].

use crate::cache::NameCaches;
use crate::resolver;
use crate::workspace::{StateSnapshot, Workspace};
use log::{debug, info};
use std::collections::HashSet;

/// Errors from user-driven store mutations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("unknown workspace id {0}")]
    UnknownWorkspace(String),
    #[error("workspace {0} is fullscreen; its name follows the owning application")]
    Fullscreen(String),
    #[error("position {position} is out of range for display {display_id} (1..={len})")]
    PositionOutOfRange {
        display_id: String,
        position: u32,
        len: usize,
    },
}

/// Workspace list, current pointer and name caches.
#[derive(Debug, Default)]
pub struct StateStore {
    /// Live workspaces first (snapshot order), then dormant ones.
    workspaces: Vec<Workspace>,
    live: HashSet<String>,
    current_workspace_id: Option<String>,
    current_display_id: Option<String>,
    /// Last applied snapshot; used for per-display active slots.
    snapshot: Option<StateSnapshot>,
    caches: NameCaches,
}

impl StateStore {
    /// Start from persisted state.
    ///
    /// If the list is non-empty but a cache tier is empty, that tier is
    /// rebuilt from the list's custom names.  Every loaded entry starts out
    /// dormant until the first probe reports it.
    pub fn restore(workspaces: Vec<Workspace>, mut caches: NameCaches) -> Self {
        if caches.rebuild_missing(&workspaces) {
            info!(
                "rebuilt name caches from {} stored workspaces ({} by id, {} by slot)",
                workspaces.len(),
                caches.by_id.len(),
                caches.by_slot.len()
            );
        }
        Self {
            workspaces,
            caches,
            ..Self::default()
        }
    }

    //  Accessors

    /// Every known workspace, live ones first.
    pub fn workspaces(&self) -> &[Workspace] {
        &self.workspaces
    }

    pub fn caches(&self) -> &NameCaches {
        &self.caches
    }

    pub fn current_workspace_id(&self) -> Option<&str> {
        self.current_workspace_id.as_deref()
    }

    pub fn current_display_id(&self) -> Option<&str> {
        self.current_display_id.as_deref()
    }

    pub fn is_live(&self, id: &str) -> bool {
        self.live.contains(id)
    }

    pub fn get(&self, id: &str) -> Option<&Workspace> {
        self.workspaces.iter().find(|w| w.id == id)
    }

    /// Live workspaces across all displays, in display order, then in each
    /// display's user order (see [`reorder`](Self::reorder)).
    pub fn live_workspaces(&self) -> Vec<&Workspace> {
        let mut live: Vec<&Workspace> = self
            .workspaces
            .iter()
            .filter(|w| self.live.contains(&w.id))
            .collect();
        let order = self.display_order();
        live.sort_by_key(|w| {
            (
                order.iter().position(|d| *d == w.display_id).unwrap_or(usize::MAX),
                w.order_key(),
            )
        });
        live
    }

    /// Live workspaces on one display, in user order.
    pub fn live_on(&self, display_id: &str) -> Vec<&Workspace> {
        self.live_workspaces()
            .into_iter()
            .filter(|w| w.display_id == display_id)
            .collect()
    }

    /// The workspace the user is looking at.
    pub fn active(&self) -> Option<&Workspace> {
        self.current_workspace_id.as_deref().and_then(|id| self.get(id))
    }

    /// The workspace shown on `display_id`.
    pub fn active_on(&self, display_id: &str) -> Option<&Workspace> {
        self.snapshot
            .as_ref()
            .and_then(|s| s.active_on(display_id))
            .and_then(|id| self.get(id))
    }

    fn display_order(&self) -> Vec<String> {
        match &self.snapshot {
            Some(s) => s.displays.iter().map(|d| d.display_id.clone()).collect(),
            None => Vec::new(),
        }
    }

    //  Probe results

    /// Resolve a fresh snapshot and apply it.  Returns `true` on change.
    pub fn refresh(&mut self, snapshot: StateSnapshot) -> bool {
        let resolved = resolver::resolve(&snapshot, &self.workspaces, &mut self.caches);
        self.apply_resolved(snapshot, resolved)
    }

    /// Merge resolver output into the list.
    ///
    /// Resolved entries replace the stored entry with the same id (or are
    /// appended); entries missing from the snapshot are kept as dormant.
    /// Returns `true` only if the list or the current pointer changed.
    pub fn apply_resolved(&mut self, snapshot: StateSnapshot, resolved: Vec<Workspace>) -> bool {
        let live: HashSet<String> = resolved.iter().map(|w| w.id.clone()).collect();

        let mut next = resolved;
        next.extend(
            self.workspaces
                .iter()
                .filter(|w| !live.contains(&w.id))
                .cloned(),
        );

        let current_id = Some(snapshot.current_workspace_id.clone());
        let current_display = Some(snapshot.current_display_id.clone());

        let changed = next != self.workspaces
            || live != self.live
            || current_id != self.current_workspace_id
            || current_display != self.current_display_id
            || self.snapshot.as_ref().map(active_slots) != Some(active_slots(&snapshot));

        if changed {
            debug!(
                "store changed: {} live, {} known, current {:?}",
                live.len(),
                next.len(),
                current_id
            );
        }

        self.workspaces = next;
        self.live = live;
        self.current_workspace_id = current_id;
        self.current_display_id = current_display;
        self.snapshot = Some(snapshot);
        changed
    }

    //  User mutations

    /// Give a workspace a custom name.  An empty name clears the caches so
    /// later recycled ids fall back to the default name.  Returns `true`
    /// if the name actually changed.
    pub fn rename(&mut self, id: &str, name: &str) -> Result<bool, StoreError> {
        let name = name.trim();
        let ws = self
            .workspaces
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or_else(|| StoreError::UnknownWorkspace(id.to_string()))?;
        if ws.is_fullscreen {
            return Err(StoreError::Fullscreen(id.to_string()));
        }
        let changed = ws.custom_name != name;
        ws.custom_name = name.to_string();
        let ws = ws.clone();
        self.caches.remember(&ws);
        info!("renamed workspace {} to {:?}", id, name);
        Ok(changed)
    }

    /// Remove a workspace and its cache entries.
    ///
    /// A live workspace reappears (unnamed unless its slot is cached) on
    /// the next probe.
    pub fn delete(&mut self, id: &str) -> Result<Workspace, StoreError> {
        let idx = self
            .workspaces
            .iter()
            .position(|w| w.id == id)
            .ok_or_else(|| StoreError::UnknownWorkspace(id.to_string()))?;
        let removed = self.workspaces.remove(idx);
        self.live.remove(id);
        if !removed.is_fullscreen {
            self.caches.forget(&removed);
        }
        info!("deleted workspace {} ({:?})", id, removed.custom_name);
        Ok(removed)
    }

    /// Move a workspace to `new_position` within its display's user order
    /// and renumber that order `1..=N`.
    ///
    /// The order is stored in [`Workspace::sort_order`], so it survives later
    /// probes.  `position_index` and the slot cache keep following the
    /// compositor, which is what switching and name recovery act on.
    ///
    /// Only live workspaces take part when the id is live; dormant entries
    /// are reordered among dormant entries of the same display.
    pub fn reorder(&mut self, id: &str, new_position: u32) -> Result<bool, StoreError> {
        let target = self
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::UnknownWorkspace(id.to_string()))?;
        let target_live = self.is_live(id);

        let mut group: Vec<(String, (u32, u32))> = self
            .workspaces
            .iter()
            .filter(|w| w.display_id == target.display_id && self.is_live(&w.id) == target_live)
            .map(|w| (w.id.clone(), w.order_key()))
            .collect();
        group.sort_by_key(|(_, key)| *key);

        let len = group.len();
        if new_position == 0 || new_position as usize > len {
            return Err(StoreError::PositionOutOfRange {
                display_id: target.display_id,
                position: new_position,
                len,
            });
        }

        let from = group.iter().position(|(gid, _)| gid == id).unwrap_or(0);
        let moved = group.remove(from);
        group.insert(new_position as usize - 1, moved);

        let changed = group
            .iter()
            .enumerate()
            .any(|(i, (_, key))| key.0 != i as u32 + 1);
        if !changed {
            return Ok(false);
        }

        for (i, (gid, _)) in group.iter().enumerate() {
            if let Some(ws) = self.workspaces.iter_mut().find(|w| w.id == *gid) {
                ws.sort_order = Some(i as u32 + 1);
            }
        }
        info!(
            "moved workspace {} to position {} on {}",
            id, new_position, target.display_id
        );
        Ok(true)
    }
}

/// `(display, active id)` pairs of a snapshot.
fn active_slots(snapshot: &StateSnapshot) -> Vec<(String, Option<String>)> {
    snapshot
        .displays
        .iter()
        .map(|d| (d.display_id.clone(), d.active_id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{IndexCache, NameCache};
    use crate::workspace::fixtures::{fullscreen, slot, snapshot};

    fn store_with(snap: StateSnapshot) -> StateStore {
        let mut store = StateStore::default();
        store.refresh(snap);
        store
    }

    #[test]
    fn first_refresh_reports_change_second_does_not() {
        let snap = snapshot("D", vec![slot("1", "D", 1), slot("2", "D", 2)]);
        let mut store = StateStore::default();
        assert!(store.refresh(snap.clone()));
        assert!(!store.refresh(snap));
    }

    #[test]
    fn current_pointer_change_is_a_change() {
        let mut snap = snapshot("D", vec![slot("1", "D", 1), slot("2", "D", 2)]);
        let mut store = store_with(snap.clone());
        snap.current_workspace_id = "2".into();
        snap.displays[0].active_id = Some("2".into());
        assert!(store.refresh(snap));
        assert_eq!(store.active().map(|w| w.id.as_str()), Some("2"));
    }

    #[test]
    fn missing_workspaces_become_dormant_not_deleted() {
        let mut store = store_with(snapshot("D", vec![slot("1", "D", 1), slot("2", "D", 2)]));
        store.rename("2", "Chat").unwrap();
        assert!(store.refresh(snapshot("D", vec![slot("1", "D", 1)])));
        assert!(!store.is_live("2"));
        assert_eq!(store.get("2").map(|w| w.custom_name.as_str()), Some("Chat"));
        assert_eq!(store.live_workspaces().len(), 1);
    }

    #[test]
    fn rename_writes_both_caches() {
        let mut store = store_with(snapshot("D", vec![slot("1", "D", 1)]));
        assert!(store.rename("1", "  Web ").unwrap());
        assert_eq!(store.caches().by_id.get("1"), Some("Web"));
        assert_eq!(store.caches().by_slot.get("D", 1), Some("Web"));
        assert!(!store.rename("1", "Web").unwrap());
    }

    #[test]
    fn rename_to_empty_clears_caches() {
        let mut store = store_with(snapshot("D", vec![slot("1", "D", 1)]));
        store.rename("1", "Web").unwrap();
        store.rename("1", "").unwrap();
        assert!(store.caches().by_id.is_empty());
        assert!(store.caches().by_slot.is_empty());

        // A recycled id at the same slot now gets the default name.
        store.refresh(snapshot("D", vec![slot("9", "D", 1)]));
        assert_eq!(store.get("9").unwrap().display_name(), "Space 1");
    }

    #[test]
    fn rename_rejects_unknown_and_fullscreen() {
        let mut store = store_with(snapshot("D", vec![fullscreen("1", "D", 1, "mpv")]));
        assert_eq!(
            store.rename("1", "x"),
            Err(StoreError::Fullscreen("1".into()))
        );
        assert_eq!(
            store.rename("nope", "x"),
            Err(StoreError::UnknownWorkspace("nope".into()))
        );
    }

    #[test]
    fn delete_removes_entry_and_cache() {
        let mut store = store_with(snapshot("D", vec![slot("1", "D", 1), slot("2", "D", 2)]));
        store.rename("2", "Chat").unwrap();
        let removed = store.delete("2").unwrap();
        assert_eq!(removed.custom_name, "Chat");
        assert!(store.get("2").is_none());
        assert!(store.caches().by_id.get("2").is_none());
        assert!(store.caches().by_slot.get("D", 2).is_none());
        assert!(store.delete("2").is_err());
    }

    fn user_order(store: &StateStore) -> Vec<(&str, u32)> {
        store
            .live_on("D")
            .iter()
            .map(|w| (w.id.as_str(), w.position_index))
            .collect()
    }

    #[test]
    fn reorder_changes_user_order_only() {
        let mut store = store_with(snapshot(
            "D",
            vec![slot("1", "D", 1), slot("2", "D", 2), slot("3", "D", 3)],
        ));
        store.rename("1", "A").unwrap();
        store.rename("3", "C").unwrap();

        assert!(store.reorder("3", 1).unwrap());
        assert_eq!(user_order(&store), vec![("3", 3), ("1", 1), ("2", 2)]);
        assert_eq!(store.get("3").unwrap().sort_order, Some(1));
        assert_eq!(store.caches().by_slot.get("D", 1), Some("A"));
        assert_eq!(store.caches().by_slot.get("D", 3), Some("C"));

        assert!(!store.reorder("3", 1).unwrap());
        assert!(matches!(
            store.reorder("3", 4),
            Err(StoreError::PositionOutOfRange { len: 3, .. })
        ));
    }

    #[test]
    fn reorder_survives_the_next_refresh() {
        let snap = snapshot(
            "D",
            vec![slot("1", "D", 1), slot("2", "D", 2), slot("3", "D", 3)],
        );
        let mut store = store_with(snap.clone());
        assert!(store.reorder("3", 1).unwrap());

        assert!(!store.refresh(snap));
        assert_eq!(user_order(&store), vec![("3", 3), ("1", 1), ("2", 2)]);

        // A new workspace joins at its compositor position.
        store.refresh(snapshot(
            "D",
            vec![slot("1", "D", 1), slot("2", "D", 2), slot("3", "D", 3), slot("4", "D", 4)],
        ));
        assert_eq!(
            user_order(&store),
            vec![("3", 3), ("1", 1), ("2", 2), ("4", 4)]
        );
        assert!(store.reorder("4", 2).unwrap());
        assert_eq!(
            user_order(&store),
            vec![("3", 3), ("4", 4), ("1", 1), ("2", 2)]
        );
    }

    #[test]
    fn restore_rebuilds_caches_and_survives_recycling() {
        let saved = vec![
            Workspace {
                custom_name: "Work".into(),
                ..Workspace::from_raw(&slot("A", "D", 2))
            },
            Workspace::from_raw(&slot("X", "D", 1)),
        ];
        let mut store = StateStore::restore(
            saved,
            NameCaches::new(NameCache::default(), IndexCache::default()),
        );
        assert_eq!(store.caches().by_id.get("A"), Some("Work"));
        assert_eq!(store.caches().by_slot.get("D", 2), Some("Work"));

        // After restart the compositor hands out fresh ids.
        store.refresh(snapshot("D", vec![slot("P", "D", 1), slot("Q", "D", 2)]));
        assert_eq!(store.get("Q").unwrap().custom_name, "Work");
        assert_eq!(store.get("P").unwrap().custom_name, "");
    }

    #[test]
    fn live_workspaces_follow_display_order() {
        let mut snap = snapshot("B", vec![slot("b2", "B", 2), slot("b1", "B", 1)]);
        snap.current_workspace_id = "b1".into();
        snap.displays.insert(
            0,
            crate::workspace::DisplaySlots {
                display_id: "A".into(),
                active_id: Some("a1".into()),
                slots: vec![slot("a1", "A", 1)],
            },
        );
        let store = store_with(snap);
        let ids: Vec<&str> = store.live_workspaces().iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "b1", "b2"]);
        assert_eq!(store.active_on("A").map(|w| w.id.as_str()), Some("a1"));
    }
}
