//! `VersionMetadata` / `Version`: durable snapshots used for history
//! navigation and branch points, and the boundary that divides a long
//! OT history into sessions.

use serde::{Deserialize, Serialize};

use crate::change::Change;
use crate::{DocId, Rev, Timestamp};

/// Where a version's changes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionOrigin {
    Main,
    Branch,
    Offline,
}

/// Metadata describing one session-worth of committed history: a run of
/// changes by one client (or one offline period) without a gap exceeding
/// `sessionTimeoutMinutes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionMetadata {
    pub id: String,
    pub origin: VersionOrigin,
    pub started_at: Timestamp,
    pub ended_at: Timestamp,
    pub start_rev: Rev,
    pub end_rev: Rev,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub branch_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
}

/// A full version record: the metadata plus the materialized state at
/// `endRev` and the original changes that produced it, used for history
/// navigation and as fork points for branching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub doc_id: DocId,
    pub metadata: VersionMetadata,
    pub state: serde_json::Value,
    pub changes: Vec<Change>,
}

impl VersionMetadata {
    pub fn covers(&self, rev: Rev) -> bool {
        rev >= self.start_rev && rev <= self.end_rev
    }
}
