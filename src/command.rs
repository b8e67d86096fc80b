//! Wire vocabulary of the command/query socket.
//!
//! [`Command`] describes everything an external caller can ask for: the
//! navigation and editing operations driven by hotkey front ends and a
//! settings UI, plus the two read-only queries of the notification bridge.
//! [`Response`] is what the daemon sends back for queries.
//!
//! Every message is one line of JSON:
//!
//! ```json
//! {"SwitchNext":{"display":"DP-1"}}
//! {"SwitchTo":{"id":"5"}}
//! {"Rename":{"id":"5","name":"Mail"}}
//! "GetWorkspaceList"
//! ```

use serde::{Deserialize, Serialize};

/// Every action or query the daemon understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Switch to the next workspace on `display` (the current display when
    /// omitted).
    SwitchNext {
        #[serde(default)]
        display: Option<String>,
    },

    /// Switch to the previous workspace on `display` (the current display
    /// when omitted).
    SwitchPrevious {
        #[serde(default)]
        display: Option<String>,
    },

    /// Switch to the live workspace with the given id.
    SwitchTo { id: String },

    /// Set a workspace's custom name.  An empty name restores the default.
    Rename { id: String, name: String },

    /// Move a workspace within its display's stored order (1-based).
    Reorder { id: String, position: u32 },

    /// Forget a workspace and its remembered names.
    Delete { id: String },

    /// Enable or disable answering [`GetActiveWorkspace`](Command::GetActiveWorkspace)
    /// and [`GetWorkspaceList`](Command::GetWorkspaceList).
    SetBridgeEnabled(bool),

    /// Ask for an immediate probe.
    Refresh,

    /// Query the active workspace.  Answered with
    /// [`Response::ActiveWorkspace`].
    GetActiveWorkspace,

    /// Query all live workspaces.  Answered with
    /// [`Response::WorkspaceList`].
    GetWorkspaceList,
}

impl Command {
    /// Whether this command expects a [`Response`].
    pub fn is_query(&self) -> bool {
        matches!(self, Command::GetActiveWorkspace | Command::GetWorkspaceList)
    }
}

/// Answer to a query command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    ActiveWorkspace(WorkspaceRef),
    WorkspaceList(Vec<WorkspaceListEntry>),
}

/// The active workspace as seen by external consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceRef {
    pub id: String,
    pub name: String,
    pub position_number: u32,
}

/// One entry of [`Response::WorkspaceList`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceListEntry {
    pub id: String,
    pub name: String,
    pub position_number: u32,
    pub display_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_wire_commands() {
        let cases = [
            (r#"{"SwitchNext":{"display":"DP-1"}}"#, Command::SwitchNext { display: Some("DP-1".into()) }),
            (r#"{"SwitchPrevious":{}}"#, Command::SwitchPrevious { display: None }),
            (r#"{"SwitchTo":{"id":"5"}}"#, Command::SwitchTo { id: "5".into() }),
            (
                r#"{"Rename":{"id":"5","name":"Mail"}}"#,
                Command::Rename { id: "5".into(), name: "Mail".into() },
            ),
            (r#"{"Reorder":{"id":"5","position":2}}"#, Command::Reorder { id: "5".into(), position: 2 }),
            (r#"{"Delete":{"id":"5"}}"#, Command::Delete { id: "5".into() }),
            (r#"{"SetBridgeEnabled":false}"#, Command::SetBridgeEnabled(false)),
            (r#""Refresh""#, Command::Refresh),
            (r#""GetActiveWorkspace""#, Command::GetActiveWorkspace),
            (r#""GetWorkspaceList""#, Command::GetWorkspaceList),
        ];
        for (json, expected) in cases {
            let parsed: Command = serde_json::from_str(json).unwrap();
            assert_eq!(parsed, expected, "parsing {}", json);
        }
    }

    #[test]
    fn only_queries_expect_responses() {
        assert!(Command::GetActiveWorkspace.is_query());
        assert!(Command::GetWorkspaceList.is_query());
        assert!(!Command::Refresh.is_query());
        assert!(!Command::SwitchTo { id: "1".into() }.is_query());
    }

    #[test]
    fn response_wire_format() {
        let r = Response::ActiveWorkspace(WorkspaceRef {
            id: "3".into(),
            name: "Web".into(),
            position_number: 2,
        });
        assert_eq!(
            serde_json::to_string(&r).unwrap(),
            r#"{"ActiveWorkspace":{"id":"3","name":"Web","position_number":2}}"#
        );
    }
}
