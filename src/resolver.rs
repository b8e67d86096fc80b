//! Identity resolution: turn a raw probe snapshot into named [`Workspace`]s.
//!
//! Compositor workspace ids are recycled, so a name cannot simply be keyed by
//! id.  For every regular (non-fullscreen) slot the name is picked by the
//! first rule that matches:
//!
//! 1. the [`NameCache`](crate::cache::NameCache) entry for this exact id;
//! 2. the [`IndexCache`](crate::cache::IndexCache) entry for the slot's
//!    `(display, position)`, unless another live id already claimed that
//!    name in this pass (the adopted name is bound to the new id);
//! 3. the name the store already holds for this id, under the same claim
//!    check;
//! 4. nothing, i.e. the `"Space N"` default.
//!
//! Rule 1 is evaluated for every slot before rule 2 is evaluated for any, so
//! a live workspace that owns a name by id always wins over a recycled slot
//! that would inherit it by position.  Name cache entries of ids missing from
//! the snapshot are dropped first: such an id may come back later as a
//! different workspace.  A live name is therefore held by at most one slot.
//!
//! Fullscreen slots are never looked up in or written to either cache.  They
//! are named after the application that owns them: `"Mail"` for a single
//! slot, `"Mail 1"`, `"Mail 2"`… (by position) when one app has several on
//! the same display.

use crate::cache::{NameCaches, SlotKey};
use crate::workspace::{RawWorkspace, StateSnapshot, Workspace};
use log::debug;
use std::collections::{BTreeMap, HashMap};

/// Label used for fullscreen slots whose owning application is unknown.
pub const UNKNOWN_FULLSCREEN_APP: &str = "Fullscreen";

/// Resolve `raw` against the workspaces the store already knows.
///
/// Returns one [`Workspace`] per live slot, in snapshot order (display by
/// display, position by position).  `caches` is updated in place: names
/// recovered by position are bound to their new id, carried-forward names
/// are written back, and the slot tier is refreshed with every named
/// regular workspace's current position.
pub fn resolve(raw: &StateSnapshot, known: &[Workspace], caches: &mut NameCaches) -> Vec<Workspace> {
    let slots: Vec<&RawWorkspace> = raw.slots().collect();
    let mut names: Vec<Option<String>> = vec![None; slots.len()];

    caches.by_id.retain_live(&raw.live_ids());

    // name -> id that holds it in this pass
    let mut claimed: HashMap<String, String> = HashMap::new();

    // Rule 1 for every regular slot.
    for (i, slot) in slots.iter().enumerate() {
        if slot.is_fullscreen {
            continue;
        }
        if let Some(name) = caches.by_id.get(&slot.id) {
            claimed
                .entry(name.to_string())
                .or_insert_with(|| slot.id.clone());
            names[i] = Some(name.to_string());
        }
    }

    // Rules 2-4 for the remaining regular slots.
    for (i, slot) in slots.iter().enumerate() {
        if slot.is_fullscreen || names[i].is_some() {
            continue;
        }

        let by_slot = caches
            .by_slot
            .get(&slot.display_id, slot.position_index)
            .filter(|name| is_free(&claimed, name, &slot.id))
            .map(str::to_string);

        if let Some(name) = by_slot {
            debug!(
                "recovered name {:?} for id {} at {}:{}",
                name, slot.id, slot.display_id, slot.position_index
            );
            caches.by_id.insert(&slot.id, &name);
            claimed.insert(name.clone(), slot.id.clone());
            names[i] = Some(name);
            continue;
        }

        let carried = known
            .iter()
            .find(|w| w.id == slot.id && !w.is_fullscreen)
            .map(|w| w.custom_name.clone())
            .filter(|n| !n.is_empty() && is_free(&claimed, n, &slot.id));
        if let Some(name) = carried {
            caches.by_id.insert(&slot.id, &name);
            claimed.insert(name.clone(), slot.id.clone());
            names[i] = Some(name);
        }
    }

    let fullscreen_names = fullscreen_names(&slots);

    let resolved: Vec<Workspace> = slots
        .iter()
        .zip(names)
        .enumerate()
        .map(|(i, (slot, name))| {
            let mut ws = Workspace::from_raw(slot);
            ws.sort_order = known
                .iter()
                .find(|w| w.id == slot.id && w.display_id == slot.display_id)
                .and_then(|w| w.sort_order);
            ws.custom_name = if slot.is_fullscreen {
                fullscreen_names.get(&i).cloned().unwrap_or_default()
            } else {
                name.unwrap_or_default()
            };
            ws
        })
        .collect();

    for ws in resolved
        .iter()
        .filter(|w| !w.is_fullscreen && !w.custom_name.is_empty())
    {
        caches.by_slot.insert(SlotKey::of(ws), &ws.custom_name);
    }

    resolved
}

/// Whether `name` is unclaimed in this pass or already held by `id`.
fn is_free(claimed: &HashMap<String, String>, name: &str, id: &str) -> bool {
    claimed.get(name).map_or(true, |owner| owner == id)
}

/// Compute names for fullscreen slots, keyed by index into `slots`.
fn fullscreen_names(slots: &[&RawWorkspace]) -> HashMap<usize, String> {
    // (display, app) -> [(position, slot index)]
    let mut groups: BTreeMap<(&str, &str), Vec<(u32, usize)>> = BTreeMap::new();
    for (i, slot) in slots.iter().enumerate().filter(|(_, s)| s.is_fullscreen) {
        let app = slot
            .foreground_app_name
            .as_deref()
            .filter(|a| !a.is_empty())
            .unwrap_or(UNKNOWN_FULLSCREEN_APP);
        groups
            .entry((slot.display_id.as_str(), app))
            .or_default()
            .push((slot.position_index, i));
    }

    let mut names = HashMap::new();
    for ((_, app), mut members) in groups {
        if let [(_, only)] = members.as_slice() {
            names.insert(*only, app.to_string());
            continue;
        }
        members.sort_unstable();
        for (n, (_, i)) in members.into_iter().enumerate() {
            names.insert(i, format!("{} {}", app, n + 1));
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{IndexCache, NameCache};
    use crate::workspace::fixtures::{fullscreen, slot, snapshot};

    fn name_of<'a>(list: &'a [Workspace], id: &str) -> &'a str {
        &list.iter().find(|w| w.id == id).unwrap().custom_name
    }

    #[test]
    fn unchanged_snapshot_resolves_identically() {
        let raw = snapshot(
            "DP-1",
            vec![slot("1", "DP-1", 1), slot("2", "DP-1", 2), fullscreen("3", "DP-1", 3, "mpv")],
        );
        let mut caches = NameCaches::default();
        caches.by_id.insert("1", "Web");

        let first = resolve(&raw, &[], &mut caches);
        let second = resolve(&raw, &first, &mut caches);
        assert_eq!(first, second);
        assert_eq!(name_of(&first, "1"), "Web");
        assert_eq!(name_of(&first, "2"), "");
        assert_eq!(name_of(&first, "3"), "mpv");
    }

    #[test]
    fn recycled_id_recovers_name_by_position() {
        let mut caches = NameCaches::default();
        let before = snapshot("D", vec![slot("1", "D", 1), slot("A", "D", 2)]);
        caches.by_id.insert("A", "Work");
        let known = resolve(&before, &[], &mut caches);
        assert_eq!(name_of(&known, "A"), "Work");

        // A disappears, B takes its slot.
        let after = snapshot("D", vec![slot("1", "D", 1), slot("B", "D", 2)]);
        let resolved = resolve(&after, &known, &mut caches);
        assert_eq!(name_of(&resolved, "B"), "Work");
        assert_eq!(name_of(&resolved, "1"), "");
        assert_eq!(caches.by_id.get("B"), Some("Work"), "recovered name is bound to the new id");
        assert_eq!(
            resolved.iter().filter(|w| w.custom_name == "Work").count(),
            1
        );
    }

    #[test]
    fn name_held_by_live_id_is_not_inherited_by_position() {
        // "Work" is cached for id A (now at position 3) and for slot 2.
        // A new id B at slot 2 must not take it.
        let mut caches = NameCaches::default();
        caches.by_id.insert("A", "Work");
        caches.by_slot.insert(SlotKey::new("D", 2), "Work");

        // B is enumerated first on purpose.
        let raw = snapshot("D", vec![slot("B", "D", 2), slot("A", "D", 3)]);
        let resolved = resolve(&raw, &[], &mut caches);
        assert_eq!(name_of(&resolved, "A"), "Work");
        assert_eq!(name_of(&resolved, "B"), "");
        assert!(caches.by_id.get("B").is_none());
    }

    #[test]
    fn collision_falls_through_to_store_name() {
        let mut caches = NameCaches::default();
        caches.by_id.insert("A", "Work");
        caches.by_slot.insert(SlotKey::new("D", 1), "Work");
        let known = vec![Workspace {
            custom_name: "Notes".into(),
            ..Workspace::from_raw(&slot("B", "D", 1))
        }];

        let raw = snapshot("D", vec![slot("B", "D", 1), slot("A", "D", 2)]);
        let resolved = resolve(&raw, &known, &mut caches);
        assert_eq!(name_of(&resolved, "A"), "Work");
        assert_eq!(name_of(&resolved, "B"), "Notes");
        assert_eq!(caches.by_id.get("B"), Some("Notes"));
    }

    #[test]
    fn returning_id_does_not_duplicate_inherited_name() {
        let mut caches = NameCaches::default();
        caches.by_id.insert("5", "Work");
        let known = resolve(&snapshot("D", vec![slot("1", "D", 1), slot("5", "D", 2)]), &[], &mut caches);

        // 5 is destroyed and 6 inherits its slot and name.
        let known = resolve(&snapshot("D", vec![slot("1", "D", 1), slot("6", "D", 2)]), &known, &mut caches);
        assert_eq!(name_of(&known, "6"), "Work");
        assert!(caches.by_id.get("5").is_none(), "unreported id is forgotten");

        // 5 comes back while 6 is still around.
        let raw = snapshot(
            "D",
            vec![slot("1", "D", 1), slot("5", "D", 2), slot("6", "D", 3), slot("7", "D", 4)],
        );
        let mut with_dormant = known.clone();
        with_dormant.push(Workspace {
            custom_name: "Work".into(),
            ..Workspace::from_raw(&slot("5", "D", 2))
        });
        let resolved = resolve(&raw, &with_dormant, &mut caches);
        let holders: Vec<&str> = resolved
            .iter()
            .filter(|w| w.custom_name == "Work")
            .map(|w| w.id.as_str())
            .collect();
        assert_eq!(holders, vec!["6"]);
    }

    #[test]
    fn carried_name_is_claimed_before_later_slots() {
        let mut caches = NameCaches::default();
        caches.by_slot.insert(SlotKey::new("D", 2), "Work");
        let known = vec![Workspace {
            custom_name: "Work".into(),
            ..Workspace::from_raw(&slot("A", "D", 1))
        }];

        let raw = snapshot("D", vec![slot("A", "D", 1), slot("B", "D", 2)]);
        let resolved = resolve(&raw, &known, &mut caches);
        assert_eq!(name_of(&resolved, "A"), "Work");
        assert_eq!(name_of(&resolved, "B"), "");
        assert!(caches.by_id.get("B").is_none());
    }

    #[test]
    fn sort_order_follows_the_id_on_its_display() {
        let known = vec![Workspace {
            sort_order: Some(1),
            ..Workspace::from_raw(&slot("2", "D", 2))
        }];
        let raw = snapshot("D", vec![slot("1", "D", 1), slot("2", "D", 2)]);
        let resolved = resolve(&raw, &known, &mut NameCaches::default());
        assert_eq!(resolved[1].sort_order, Some(1));
        assert_eq!(resolved[0].sort_order, None);
    }

    #[test]
    fn name_cache_beats_index_cache() {
        let mut caches = NameCaches::new(NameCache::default(), IndexCache::default());
        caches.by_id.insert("1", "Mine");
        caches.by_slot.insert(SlotKey::new("D", 1), "Slot");
        let resolved = resolve(&snapshot("D", vec![slot("1", "D", 1)]), &[], &mut caches);
        assert_eq!(name_of(&resolved, "1"), "Mine");
        assert_eq!(caches.by_slot.get("D", 1), Some("Mine"), "slot tier follows the live layout");
    }

    #[test]
    fn fullscreen_slots_grouped_by_app_in_position_order() {
        // Enumerated out of order on purpose.
        let raw = snapshot(
            "D",
            vec![
                slot("0", "D", 2),
                fullscreen("m5", "D", 5, "Mail"),
                fullscreen("m1", "D", 1, "Mail"),
                fullscreen("v", "D", 4, "mpv"),
                fullscreen("m3", "D", 3, "Mail"),
            ],
        );
        let mut caches = NameCaches::default();
        let resolved = resolve(&raw, &[], &mut caches);
        assert_eq!(name_of(&resolved, "m1"), "Mail 1");
        assert_eq!(name_of(&resolved, "m3"), "Mail 2");
        assert_eq!(name_of(&resolved, "m5"), "Mail 3");
        assert_eq!(name_of(&resolved, "v"), "mpv");
        assert!(caches.by_id.is_empty());
        assert!(caches.by_slot.is_empty());
    }

    #[test]
    fn fullscreen_ignores_cached_names() {
        let mut caches = NameCaches::default();
        caches.by_id.insert("f", "Custom");
        caches.by_slot.insert(SlotKey::new("D", 1), "Slot");
        let raw = snapshot("D", vec![fullscreen("f", "D", 1, "Game")]);
        let resolved = resolve(&raw, &[], &mut caches);
        assert_eq!(name_of(&resolved, "f"), "Game");
    }

    #[test]
    fn fullscreen_groups_are_per_display() {
        let mut raw = snapshot("A", vec![fullscreen("a1", "A", 1, "Mail")]);
        raw.displays.push(crate::workspace::DisplaySlots {
            display_id: "B".into(),
            active_id: None,
            slots: vec![fullscreen("b1", "B", 1, "Mail")],
        });
        let resolved = resolve(&raw, &[], &mut NameCaches::default());
        assert_eq!(name_of(&resolved, "a1"), "Mail");
        assert_eq!(name_of(&resolved, "b1"), "Mail");
    }

    #[test]
    fn fullscreen_without_app_uses_placeholder() {
        let mut s = fullscreen("f", "D", 1, "");
        s.foreground_app_name = None;
        let resolved = resolve(&snapshot("D", vec![s]), &[], &mut NameCaches::default());
        assert_eq!(name_of(&resolved, "f"), UNKNOWN_FULLSCREEN_APP);
    }
}
