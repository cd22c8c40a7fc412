//! WebSocket message protocol definitions (§6): the four RPCs
//! (`getDoc`, `getChangesSince`, `commitChanges`, `deleteDoc`),
//! `subscribe`/`unsubscribe`, and the two `notify` push messages
//! (`changesCommitted`, `docDeleted`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use syncpatch_core::Change;

/// Messages sent from client to server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum ClientMessage {
    GetDoc {
        doc_id: String,
        #[serde(default)]
        at_rev: Option<u64>,
        #[serde(default)]
        request_id: Option<String>,
    },
    GetChangesSince {
        doc_id: String,
        rev: u64,
        #[serde(default)]
        request_id: Option<String>,
    },
    CommitChanges {
        doc_id: String,
        changes: Vec<Change>,
        /// Algorithm to register the doc under if it does not exist yet.
        #[serde(default)]
        algorithm: Option<String>,
        #[serde(default)]
        request_id: Option<String>,
    },
    DeleteDoc {
        doc_id: String,
        #[serde(default)]
        request_id: Option<String>,
    },
    Subscribe {
        ids: Vec<String>,
        #[serde(default)]
        request_id: Option<String>,
    },
    Unsubscribe {
        ids: Vec<String>,
        #[serde(default)]
        request_id: Option<String>,
    },
    Ping,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum ServerMessage {
    GetDocResult {
        state: Value,
        rev: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    GetChangesSinceResult {
        changes: Vec<Change>,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    CommitChangesResult {
        changes: Vec<Change>,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    DeleteDocResult {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    SubscribeResult {
        accepted: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    UnsubscribeResult {
        accepted: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    /// notify `changesCommitted`: pushed to every subscriber of `docId`
    /// except the originator of the commit.
    ChangesCommitted {
        doc_id: String,
        changes: Vec<Change>,
    },
    /// notify `docDeleted`.
    DocDeleted {
        doc_id: String,
    },
    Pong,
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>, request_id: Option<String>) -> Self {
        ServerMessage::Error { message: message.into(), request_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_commit_changes_request() {
        let json = r#"{"method":"commitChanges","docId":"d1","changes":[],"requestId":"r1"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::CommitChanges { doc_id, changes, request_id, .. } => {
                assert_eq!(doc_id, "d1");
                assert!(changes.is_empty());
                assert_eq!(request_id, Some("r1".to_string()));
            }
            _ => panic!("expected CommitChanges"),
        }
    }

    #[test]
    fn deserializes_ping() {
        let msg: ClientMessage = serde_json::from_str(r#"{"method":"ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn serializes_pong() {
        let json = serde_json::to_string(&ServerMessage::Pong).unwrap();
        assert_eq!(json, r#"{"method":"pong"}"#);
    }

    #[test]
    fn serializes_error_with_request_id() {
        let json = serde_json::to_string(&ServerMessage::error("bad thing", Some("r1".into()))).unwrap();
        assert!(json.contains(r#""method":"error""#));
        assert!(json.contains(r#""message":"bad thing""#));
        assert!(json.contains(r#""requestId":"r1""#));
    }
}
