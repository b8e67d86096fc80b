//! [`StateProbe`] and [`Desktop`] implementation backed by Hyprland IPC.
//!
//! Queries go directly to Hyprland's command socket at
//! `$XDG_RUNTIME_DIR/hypr/$HYPRLAND_INSTANCE_SIGNATURE/.socket.sock`.
//! Input synthesis (keys, pointer) goes through `ydotool`, which injects
//! events at the uinput level, below the compositor.

use super::{instance_dir, HyprlandError};
use crate::config::SwitchConfig;
use crate::probe::ProbeError;
use crate::traits::{Desktop, KeyBinding, StateProbe};
use crate::workspace::{DisplaySlots, RawWorkspace, StateSnapshot};
use log::debug;
use serde::Deserialize;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::process;

/// Hyprland-backed probe and desktop.
///
/// No connection is opened eagerly; each method call opens a short-lived
/// IPC request.
#[derive(Debug, Clone)]
pub struct HyprlandDesktop {
    marker_class: String,
    overview_columns: u32,
    overview_dispatch: String,
}

impl HyprlandDesktop {
    pub fn new(config: &SwitchConfig) -> Self {
        Self {
            marker_class: config.marker_class.clone(),
            overview_columns: config.overview.columns.max(1),
            overview_dispatch: config.overview.toggle_dispatch.clone(),
        }
    }
}

//  Direct Hyprland IPC helpers

/// Send a raw command to the Hyprland command socket and return the
/// response as a string.
fn ipc_request(command: &str) -> Result<String, HyprlandError> {
    let path = instance_dir()?.join(".socket.sock");
    let mut stream = UnixStream::connect(&path)
        .map_err(|e| HyprlandError(format!("connect to {}: {}", path.display(), e)))?;

    stream
        .write_all(command.as_bytes())
        .map_err(|e| HyprlandError(format!("write: {}", e)))?;

    let mut response = Vec::new();
    stream
        .read_to_end(&mut response)
        .map_err(|e| HyprlandError(format!("read: {}", e)))?;

    String::from_utf8(response).map_err(|e| HyprlandError(format!("utf-8: {}", e)))
}

/// Send a JSON data query (`j/<command>`) and return the raw JSON string.
fn ipc_json(data_command: &str) -> Result<String, HyprlandError> {
    ipc_request(&format!("j/{}", data_command))
}

/// Send a dispatch command and check for `"ok"`.
fn ipc_dispatch(args: &str) -> Result<(), HyprlandError> {
    let response = ipc_request(&format!("/dispatch {}", args))?;
    if response.trim() == "ok" {
        Ok(())
    } else {
        Err(HyprlandError(format!("dispatch {:?}: {}", args, response.trim())))
    }
}

fn parse<'a, T: Deserialize<'a>>(what: &str, json: &'a str) -> Result<T, HyprlandError> {
    serde_json::from_str(json).map_err(|e| HyprlandError(format!("parse {}: {}", what, e)))
}

/// Run `ydotool` with `args` and check its exit status.
fn ydotool(args: &[String]) -> Result<(), HyprlandError> {
    debug!("ydotool {}", args.join(" "));
    let output = process::Command::new("ydotool")
        .args(args)
        .output()
        .map_err(|e| HyprlandError(format!("failed to run ydotool: {}", e)))?;
    if output.status.success() {
        Ok(())
    } else {
        Err(HyprlandError(format!(
            "ydotool {} exited with {}: {}",
            args.first().map(String::as_str).unwrap_or_default(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

//  Minimal serde structs for the JSON we care about

#[derive(Debug, Deserialize)]
struct WorkspaceRefJson {
    id: i64,
}

/// Subset of the JSON object returned by `j/monitors`.
#[derive(Debug, Deserialize)]
struct MonitorJson {
    id: i64,
    name: String,
    width: u32,
    height: u32,
    x: i32,
    y: i32,
    #[serde(default = "unit_scale")]
    scale: f64,
    #[serde(default)]
    focused: bool,
    #[serde(rename = "activeWorkspace")]
    active_workspace: Option<WorkspaceRefJson>,
}

fn unit_scale() -> f64 {
    1.0
}

/// Subset of the JSON object returned by `j/workspaces`.
#[derive(Debug, Deserialize)]
struct WorkspaceJson {
    id: i64,
    monitor: String,
    #[serde(default)]
    hasfullscreen: bool,
}

/// `fullscreen` is a bool in older Hyprland releases and a mode number
/// (0 = none) in newer ones.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FullscreenJson {
    Flag(bool),
    Mode(i64),
}

impl FullscreenJson {
    fn is_set(&self) -> bool {
        match self {
            FullscreenJson::Flag(b) => *b,
            FullscreenJson::Mode(m) => *m != 0,
        }
    }
}

/// Subset of the JSON object returned by `j/clients`.
#[derive(Debug, Deserialize)]
struct ClientJson {
    address: String,
    #[serde(default)]
    class: String,
    workspace: WorkspaceRefJson,
    fullscreen: Option<FullscreenJson>,
}

/// Subset of the JSON object returned by `j/binds`.
#[derive(Debug, Deserialize)]
struct BindJson {
    modmask: u32,
    #[serde(default)]
    submap: String,
    key: String,
    #[serde(default)]
    mouse: bool,
    #[serde(default)]
    release: bool,
    dispatcher: String,
    arg: String,
}

//  Topology

/// Build a validated [`StateSnapshot`] from the raw `j/monitors`,
/// `j/workspaces` and `j/clients` replies.
///
/// Special workspaces (negative ids) are ignored.  The position of a
/// workspace is its 1-based rank by id on its monitor.  A workspace is
/// fullscreen when Hyprland says so; its foreground application is the
/// class of its fullscreen client.
pub fn parse_topology(
    monitors_json: &str,
    workspaces_json: &str,
    clients_json: &str,
) -> Result<StateSnapshot, ProbeError> {
    let malformed = |e: HyprlandError| ProbeError::Malformed(e.to_string());
    let monitors: Vec<MonitorJson> = parse("monitors", monitors_json).map_err(malformed)?;
    let workspaces: Vec<WorkspaceJson> = parse("workspaces", workspaces_json).map_err(malformed)?;
    let clients: Vec<ClientJson> = parse("clients", clients_json).map_err(malformed)?;

    let focused = monitors.iter().find(|m| m.focused).ok_or(ProbeError::NoCurrentSlot)?;
    let current_workspace_id = focused
        .active_workspace
        .as_ref()
        .filter(|w| w.id > 0)
        .map(|w| w.id.to_string())
        .ok_or(ProbeError::NoCurrentSlot)?;

    let mut ordered: Vec<&MonitorJson> = monitors.iter().collect();
    ordered.sort_by_key(|m| m.id);

    let displays = ordered
        .into_iter()
        .map(|monitor| {
            let mut on_monitor: Vec<&WorkspaceJson> = workspaces
                .iter()
                .filter(|w| w.id > 0 && w.monitor == monitor.name)
                .collect();
            on_monitor.sort_by_key(|w| w.id);

            let slots: Vec<RawWorkspace> = on_monitor
                .iter()
                .enumerate()
                .map(|(rank, ws)| RawWorkspace {
                    id: ws.id.to_string(),
                    position_index: rank as u32 + 1,
                    display_id: monitor.name.clone(),
                    is_fullscreen: ws.hasfullscreen,
                    foreground_app_name: ws
                        .hasfullscreen
                        .then(|| fullscreen_class(&clients, ws.id))
                        .flatten(),
                })
                .collect();
            let active_id = monitor
                .active_workspace
                .as_ref()
                .map(|w| w.id.to_string())
                .filter(|id| slots.iter().any(|s| &s.id == id));

            DisplaySlots {
                display_id: monitor.name.clone(),
                active_id,
                slots,
            }
        })
        .collect();

    let snapshot = StateSnapshot {
        current_workspace_id,
        current_display_id: focused.name.clone(),
        displays,
    };
    if !snapshot.slots().any(|s| s.id == snapshot.current_workspace_id) {
        return Err(ProbeError::NoCurrentSlot);
    }
    snapshot.validate().map_err(ProbeError::Malformed)?;
    Ok(snapshot)
}

fn fullscreen_class(clients: &[ClientJson], workspace_id: i64) -> Option<String> {
    clients
        .iter()
        .find(|c| {
            c.workspace.id == workspace_id
                && c.fullscreen.as_ref().is_some_and(FullscreenJson::is_set)
                && !c.class.is_empty()
        })
        .map(|c| c.class.clone())
}

//  Shortcuts

/// Hyprland modifier mask bits, in display order.
const MODMASK_NAMES: [(u32, &str); 8] = [
    (1, "SHIFT"),
    (2, "CAPS"),
    (4, "CTRL"),
    (8, "ALT"),
    (16, "MOD2"),
    (32, "MOD3"),
    (64, "SUPER"),
    (128, "MOD5"),
];

fn modmask_names(mask: u32) -> Vec<&'static str> {
    MODMASK_NAMES
        .iter()
        .filter(|(bit, _)| mask & bit != 0)
        .map(|(_, name)| *name)
        .collect()
}

/// `code:10` … `code:19` are the XKB codes of the digit row.
fn normalise_key(key: &str) -> String {
    if let Some(code) = key.strip_prefix("code:").and_then(|c| c.parse::<u32>().ok()) {
        match code {
            10..=18 => return (code - 9).to_string(),
            19 => return "0".into(),
            _ => {}
        }
    }
    key.to_ascii_uppercase()
}

/// The active top-level binding that dispatches `workspace <id>`.
///
/// Hyprland's `workspace N` selects workspace id `N`, not the `N`th slot of
/// a monitor, so the lookup is by id.
fn find_workspace_binding(binds_json: &str, workspace_id: &str) -> Result<Option<KeyBinding>, HyprlandError> {
    let binds: Vec<BindJson> = parse("binds", binds_json)?;
    let wanted = workspace_id.trim();
    Ok(binds
        .iter()
        .find(|b| {
            b.dispatcher == "workspace"
                && b.arg.trim() == wanted
                && b.submap.is_empty()
                && !b.mouse
                && !b.release
        })
        .map(|b| KeyBinding::new(modmask_names(b.modmask), normalise_key(&b.key))))
}

/// Linux input event codes used with `ydotool key`.
fn keycode(name: &str) -> Option<u32> {
    Some(match name {
        "SUPER" => 125,
        "CTRL" => 29,
        "ALT" => 56,
        "SHIFT" => 42,
        "ESCAPE" => 1,
        "0" => 11,
        digit if digit.len() == 1 => match digit.as_bytes()[0] {
            b @ b'1'..=b'9' => u32::from(b - b'0') + 1,
            _ => return None,
        },
        _ => return None,
    })
}

/// `ydotool key` arguments: press modifiers, tap the key, release
/// modifiers in reverse order.
fn key_sequence(binding: &KeyBinding) -> Result<Vec<String>, HyprlandError> {
    let code = |name: &str| keycode(name).ok_or_else(|| HyprlandError(format!("no keycode for {}", name)));
    let modifiers = binding
        .modifiers
        .iter()
        .map(|m| code(m))
        .collect::<Result<Vec<u32>, _>>()?;
    let key = code(&binding.key)?;

    let mut args = vec!["key".to_string()];
    args.extend(modifiers.iter().map(|m| format!("{}:1", m)));
    args.push(format!("{}:1", key));
    args.push(format!("{}:0", key));
    args.extend(modifiers.iter().rev().map(|m| format!("{}:0", m)));
    Ok(args)
}

/// Centre of tile `index` in an overview laid out as a `columns`×`columns`
/// grid over the monitor, in logical coordinates.
fn tile_centre(monitor: &MonitorJson, columns: u32, index: usize) -> Option<(i32, i32)> {
    let columns = columns.max(1) as usize;
    if index >= columns * columns {
        return None;
    }
    let scale = if monitor.scale > 0.0 { monitor.scale } else { 1.0 };
    let tile_w = f64::from(monitor.width) / scale / columns as f64;
    let tile_h = f64::from(monitor.height) / scale / columns as f64;
    let col = (index % columns) as f64;
    let row = (index / columns) as f64;
    Some((
        monitor.x + ((col + 0.5) * tile_w).round() as i32,
        monitor.y + ((row + 0.5) * tile_h).round() as i32,
    ))
}

fn monitors() -> Result<Vec<MonitorJson>, HyprlandError> {
    let json = ipc_json("monitors")?;
    parse("monitors", &json)
}

fn monitor_named(name: &str) -> Result<MonitorJson, HyprlandError> {
    monitors()?
        .into_iter()
        .find(|m| m.name == name)
        .ok_or_else(|| HyprlandError(format!("unknown monitor: {}", name)))
}

//  StateProbe implementation

impl StateProbe for HyprlandDesktop {
    fn query(&self) -> Result<StateSnapshot, ProbeError> {
        let unavailable = |e: HyprlandError| ProbeError::Unavailable(e.to_string());
        let monitors = ipc_json("monitors").map_err(unavailable)?;
        let workspaces = ipc_json("workspaces").map_err(unavailable)?;
        let clients = ipc_json("clients").map_err(unavailable)?;
        parse_topology(&monitors, &workspaces, &clients)
    }
}

//  Desktop implementation

impl Desktop for HyprlandDesktop {
    type Error = HyprlandError;

    fn workspace_binding(&self, workspace_id: &str) -> Result<Option<KeyBinding>, Self::Error> {
        find_workspace_binding(&ipc_json("binds")?, workspace_id)
    }

    fn send_key(&self, binding: &KeyBinding) -> Result<(), Self::Error> {
        ydotool(&key_sequence(binding)?)
    }

    fn marker_window(&self, workspace_id: &str) -> Result<Option<String>, Self::Error> {
        let clients: Vec<ClientJson> = parse("clients", &ipc_json("clients")?)?;
        Ok(clients
            .into_iter()
            .find(|c| c.class == self.marker_class && c.workspace.id.to_string() == workspace_id)
            .map(|c| c.address))
    }

    fn activate_window(&self, address: &str) -> Result<(), Self::Error> {
        ipc_dispatch(&format!("focuswindow address:{}", address))
    }

    fn open_overview(&self, display_id: &str) -> Result<(), Self::Error> {
        ipc_dispatch(&format!("focusmonitor {}", display_id))?;
        ipc_dispatch(&self.overview_dispatch)
    }

    fn click_overview_tile(&self, display_id: &str, visual_index: usize) -> Result<(), Self::Error> {
        let monitor = monitor_named(display_id)?;
        let (x, y) = tile_centre(&monitor, self.overview_columns, visual_index).ok_or_else(|| {
            HyprlandError(format!("tile {} is outside the overview grid", visual_index))
        })?;
        ydotool(&[
            "mousemove".into(),
            "--absolute".into(),
            "-x".into(),
            x.to_string(),
            "-y".into(),
            y.to_string(),
        ])?;
        // 0xC0: left button down + up.
        ydotool(&["click".into(), "0xC0".into()])
    }

    fn dismiss_overview(&self) -> Result<(), Self::Error> {
        ydotool(&["key".into(), "1:1".into(), "1:0".into()])
    }

    fn active_workspace(&self, display_id: &str) -> Result<Option<String>, Self::Error> {
        Ok(monitor_named(display_id)?
            .active_workspace
            .map(|w| w.id.to_string()))
    }
}
