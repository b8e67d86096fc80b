//! IPC listener that accepts commands and queries over a Unix socket.
//!
//! External tools (hotkey helpers, a settings UI, status bars) can connect
//! to the socket and send newline-delimited JSON commands.

pub mod listener;
