//! **spacemark** keeps track of Hyprland workspaces under stable, human
//! chosen names, even though the compositor recycles workspace ids.
//!
//! # Architecture
//!
//! ```text
//!  socket2 events ─┐                         ┌─► SwitchCoordinator ─► compositor
//!  command socket ─┼─► Message queue ─► Daemon ─► StateStore ◄─ resolver
//!  probe results  ─┘                         └─► NotificationBridge ─► state file
//! ```
//!
//! * [`probe`] schedules topology queries and discards superseded results.
//! * [`resolver`] maps raw, possibly recycled ids onto remembered names using
//!   the two caches in [`cache`].
//! * [`store`] owns the canonical workspace list.
//! * [`switcher`] drives an ordered chain of switching strategies.
//! * [`bridge`] debounces state publication and answers queries.
//! * [`daemon`] is the single owner that ties them together.
//! * [`writer`] runs the disk and publish work off the owner thread.
//!
//! The compositor is reached only through the traits in [`traits`];
//! concrete implementations live in [`hyprland`] (Hyprland IPC) and
//! [`ipc`] (Unix-socket command listener).

pub mod bridge;
pub mod cache;
pub mod command;
pub mod config;
pub mod daemon;
pub mod diagnostics;
pub mod hyprland;
pub mod ipc;
pub mod persist;
pub mod probe;
pub mod resolver;
pub mod store;
pub mod switcher;
pub mod traits;
pub mod workspace;
pub mod writer;
