//! Hyprland-specific implementations.
//!
//! This module provides concrete backends for the
//! [`StateProbe`](crate::traits::StateProbe),
//! [`Desktop`](crate::traits::Desktop) and
//! [`MessageSource`](crate::traits::MessageSource) traits, powered by
//! Hyprland's IPC sockets and `ydotool`.
//!
//! Nothing outside this module should reference Hyprland directly.

pub mod events;
pub mod wm;

use std::path::PathBuf;

/// Errors that can occur when talking to Hyprland or `ydotool`.
#[derive(Debug, thiserror::Error)]
#[error("hyprland error: {0}")]
pub struct HyprlandError(String);

/// `$XDG_RUNTIME_DIR/hypr/$HYPRLAND_INSTANCE_SIGNATURE`, where Hyprland
/// (≥ 0.40) keeps its sockets.
fn instance_dir() -> Result<PathBuf, HyprlandError> {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .map_err(|_| HyprlandError("XDG_RUNTIME_DIR not set".into()))?;
    let his = std::env::var("HYPRLAND_INSTANCE_SIGNATURE")
        .map_err(|_| HyprlandError("HYPRLAND_INSTANCE_SIGNATURE not set".into()))?;
    Ok(PathBuf::from(runtime_dir).join("hypr").join(his))
}
