//! Workspace vocabulary shared by every component.
//!
//! [`RawWorkspace`] / [`StateSnapshot`] describe what the compositor reports
//! during one probe.  [`Workspace`] is the resolved, named entity kept by the
//! [`StateStore`](crate::store::StateStore).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A workspace as known to the store.
///
/// `id` is ephemeral: the compositor may hand the same id to a logically
/// different workspace later on.  An empty `custom_name` means "use the
/// position-derived default" (see [`Workspace::display_name`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    /// 1-based position within the display's ordered list, as the
    /// compositor reports it.
    pub position_index: u32,
    pub display_id: String,
    #[serde(default)]
    pub custom_name: String,
    #[serde(default)]
    pub is_fullscreen: bool,
    #[serde(default)]
    pub foreground_app_name: Option<String>,
    /// Rank chosen with a reorder.  `None` follows `position_index`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<u32>,
}

impl Workspace {
    /// Build an unnamed workspace from a raw slot.
    pub fn from_raw(raw: &RawWorkspace) -> Self {
        Self {
            id: raw.id.clone(),
            position_index: raw.position_index,
            display_id: raw.display_id.clone(),
            custom_name: String::new(),
            is_fullscreen: raw.is_fullscreen,
            foreground_app_name: raw.foreground_app_name.clone(),
            sort_order: None,
        }
    }

    /// Sort key of the user-facing order on a display.
    pub fn order_key(&self) -> (u32, u32) {
        (self.sort_order.unwrap_or(self.position_index), self.position_index)
    }

    /// The label a consumer should show: the custom name, or `"Space N"`.
    pub fn display_name(&self) -> String {
        if self.custom_name.is_empty() {
            default_name(self.position_index)
        } else {
            self.custom_name.clone()
        }
    }
}

/// Position-derived default label.
pub fn default_name(position_index: u32) -> String {
    format!("Space {}", position_index)
}

/// One slot exactly as the compositor reported it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawWorkspace {
    pub id: String,
    pub position_index: u32,
    pub display_id: String,
    pub is_fullscreen: bool,
    pub foreground_app_name: Option<String>,
}

/// The ordered slots of one display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySlots {
    pub display_id: String,
    /// Id of the slot currently shown on this display, if known.
    pub active_id: Option<String>,
    /// Sorted by `position_index`.
    pub slots: Vec<RawWorkspace>,
}

/// Atomic result of one probe cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    pub current_workspace_id: String,
    pub current_display_id: String,
    pub displays: Vec<DisplaySlots>,
}

impl StateSnapshot {
    /// Every slot, display by display, in position order.
    pub fn slots(&self) -> impl Iterator<Item = &RawWorkspace> {
        self.displays.iter().flat_map(|d| d.slots.iter())
    }

    /// Ids of every slot the compositor currently reports.
    pub fn live_ids(&self) -> HashSet<&str> {
        self.slots().map(|s| s.id.as_str()).collect()
    }

    /// The active slot id on `display_id`.
    pub fn active_on(&self, display_id: &str) -> Option<&str> {
        self.displays
            .iter()
            .find(|d| d.display_id == display_id)
            .and_then(|d| d.active_id.as_deref())
    }

    /// Check the structural invariants of a snapshot.
    ///
    /// Positions must be unique within a display, ids unique overall, and
    /// the current workspace must be one of the reported slots.
    pub fn validate(&self) -> Result<(), String> {
        let mut ids = HashSet::new();
        for display in &self.displays {
            let mut positions = HashSet::new();
            for slot in &display.slots {
                if slot.display_id != display.display_id {
                    return Err(format!(
                        "slot {} claims display {} but is listed under {}",
                        slot.id, slot.display_id, display.display_id
                    ));
                }
                if slot.position_index == 0 {
                    return Err(format!("slot {} has position 0", slot.id));
                }
                if !positions.insert(slot.position_index) {
                    return Err(format!(
                        "duplicate position {} on display {}",
                        slot.position_index, display.display_id
                    ));
                }
                if !ids.insert(slot.id.as_str()) {
                    return Err(format!("duplicate workspace id {}", slot.id));
                }
            }
        }
        if !ids.contains(self.current_workspace_id.as_str()) {
            return Err(format!(
                "current workspace {} is not among the reported slots",
                self.current_workspace_id
            ));
        }
        Ok(())
    }
}
