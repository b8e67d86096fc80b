//! Application configuration.
//!
//! The configuration is loaded from `$XDG_CONFIG_HOME/spacemark/config.json`.
//! Every section is optional: a minimal `{}` file is valid and all sections
//! fall back to their compiled-in defaults.
//!
//! # Example
//!
//! ```json
//! {
//!   "probe": { "settle_ms": 40 },
//!   "switching": {
//!     "wrap_around": true,
//!     "accelerator": { "modifiers": ["SUPER"] },
//!     "overview": { "columns": 3 }
//!   },
//!   "bridge": {
//!     "debounce_ms": 500,
//!     "reload_command": ["pkill", "-RTMIN+8", "waybar"]
//!   },
//!   "diagnostics": { "enabled": true }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub switching: SwitchConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Probe timing.  Durations are in **milliseconds**.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Delay between a trigger and the query, so the compositor can finish
    /// its own bookkeeping first.
    pub settle_ms: u64,
    /// Queries attempted while no current workspace is reported.
    pub detect_attempts: u32,
    /// Pause between those attempts.
    pub retry_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            settle_ms: 40,
            detect_attempts: 3,
            retry_ms: 25,
        }
    }
}

/// Workspace switching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchConfig {
    /// Time the switch guard stays held after a strategy ran (ms).
    pub settle_ms: u64,
    /// Wait before checking whether a strategy had a visible effect (ms).
    pub verify_ms: u64,
    /// `SwitchNext` on the last workspace goes to the first, and vice versa.
    pub wrap_around: bool,
    pub accelerator: AcceleratorConfig,
    /// Window class of the marker windows pinned to workspaces.
    pub marker_class: String,
    pub overview: OverviewConfig,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            settle_ms: 400,
            verify_ms: 150,
            wrap_around: false,
            accelerator: AcceleratorConfig::default(),
            marker_class: "spacemark-marker".into(),
            overview: OverviewConfig::default(),
        }
    }
}

/// The shortcut the accelerator strategy expects for "go to workspace N".
///
/// The key is always the position digit (`1`…`9`, `0` for 10).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcceleratorConfig {
    pub enabled: bool,
    pub modifiers: Vec<String>,
}

impl Default for AcceleratorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            modifiers: vec!["SUPER".into()],
        }
    }
}

/// Workspace overview automation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverviewConfig {
    pub enabled: bool,
    /// Tiles per row in the overview grid.
    pub columns: u32,
    /// Hyprland dispatch that opens the overview.
    pub toggle_dispatch: String,
    /// Delay between opening the overview and clicking (ms).
    pub open_delay_ms: u64,
}

impl Default for OverviewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            columns: 3,
            toggle_dispatch: "hyprexpo:expo toggle".into(),
            open_delay_ms: 250,
        }
    }
}

/// Notification bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Answer `GetActiveWorkspace` / `GetWorkspaceList`.
    pub enabled: bool,
    /// Bursts of changes closer together than this collapse into one
    /// publish (ms).
    pub debounce_ms: u64,
    /// Where the shared state blob is written.  Defaults to
    /// `$XDG_RUNTIME_DIR/spacemark/state.json`.
    pub state_path: Option<PathBuf>,
    /// Command run after each publish to tell the renderer to reload.
    pub reload_command: Option<Vec<String>>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 500,
            state_path: None,
            reload_command: None,
        }
    }
}

/// Diagnostic probe log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub enabled: bool,
    /// Defaults to `<data dir>/diagnostics.log`.
    pub path: Option<PathBuf>,
    /// Size at which the log rotates to `<file>.old`.
    pub max_bytes: u64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: None,
            max_bytes: 1_000_000,
        }
    }
}

/// Persistent storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Defaults to `$XDG_DATA_HOME/spacemark`.
    pub data_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| ConfigError(format!("failed to parse {}: {}", path.display(), e)))?;
        Ok(config)
    }
}

/// Error from loading or parsing a configuration file.
#[derive(Debug, thiserror::Error)]
#[error("config error: {0}")]
pub struct ConfigError(String);

//  Paths

fn xdg_dir(var: &str, fallback: &str) -> PathBuf {
    std::env::var(var).map(PathBuf::from).unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(fallback)
    })
}

/// `$XDG_CONFIG_HOME/spacemark`.
pub fn config_dir() -> PathBuf {
    xdg_dir("XDG_CONFIG_HOME", ".config").join("spacemark")
}

/// `$XDG_DATA_HOME/spacemark`.
pub fn default_data_dir() -> PathBuf {
    xdg_dir("XDG_DATA_HOME", ".local/share").join("spacemark")
}

/// `$XDG_RUNTIME_DIR`, or `/tmp`.
pub fn runtime_dir() -> PathBuf {
    std::env::var("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_full_config() {
        let json = r#"{
            "probe": { "settle_ms": 60, "detect_attempts": 5, "retry_ms": 10 },
            "switching": {
                "settle_ms": 300,
                "verify_ms": 100,
                "wrap_around": true,
                "accelerator": { "enabled": false, "modifiers": ["CTRL", "ALT"] },
                "marker_class": "pin",
                "overview": { "columns": 4 }
            },
            "bridge": {
                "enabled": false,
                "debounce_ms": 250,
                "state_path": "/tmp/s.json",
                "reload_command": ["pkill", "-USR1", "bar"]
            },
            "diagnostics": { "enabled": true, "max_bytes": 10 },
            "storage": { "data_dir": "/tmp/spacemark" }
        }"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.probe.settle_ms, 60);
        assert_eq!(cfg.probe.detect_attempts, 5);
        assert!(cfg.switching.wrap_around);
        assert!(!cfg.switching.accelerator.enabled);
        assert_eq!(cfg.switching.accelerator.modifiers, vec!["CTRL", "ALT"]);
        assert_eq!(cfg.switching.marker_class, "pin");
        assert_eq!(cfg.switching.overview.columns, 4);
        assert_eq!(
            cfg.switching.overview.toggle_dispatch,
            OverviewConfig::default().toggle_dispatch
        );
        assert!(!cfg.bridge.enabled);
        assert_eq!(cfg.bridge.debounce_ms, 250);
        assert_eq!(cfg.bridge.reload_command.as_deref().map(<[String]>::len), Some(3));
        assert!(cfg.diagnostics.enabled);
        assert_eq!(cfg.storage.data_dir, Some(PathBuf::from("/tmp/spacemark")));
    }

    #[test]
    fn deserialize_empty_uses_defaults() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.probe.settle_ms, ProbeConfig::default().settle_ms);
        assert_eq!(cfg.switching.settle_ms, SwitchConfig::default().settle_ms);
        assert_eq!(cfg.switching.accelerator.modifiers, vec!["SUPER"]);
        assert!(cfg.bridge.enabled);
        assert_eq!(cfg.bridge.debounce_ms, 500);
        assert!(!cfg.diagnostics.enabled);
        assert!(cfg.storage.data_dir.is_none());
    }

    #[test]
    fn unknown_top_level_keys_ignored() {
        let json = r#"{ "bridge": {}, "future_section": { "key": 42 } }"#;
        let _cfg: Config = serde_json::from_str(json).unwrap();
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load(Path::new("/nonexistent/spacemark.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
