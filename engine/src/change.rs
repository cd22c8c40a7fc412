//! The `Change` record: one logical client edit, a bundle of ops with
//! revision metadata.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::patch::JsonPatchOp;
use crate::{ChangeId, Rev, Timestamp};

/// One logical edit: a non-empty bundle of ops plus the revision
/// bookkeeping the OT and LWW algorithms both rely on. `rev` is `0` and
/// `committedAt` is `0` until the server assigns them; at that point the
/// record is immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub id: ChangeId,
    pub ops: Vec<JsonPatchOp>,
    pub rev: Rev,
    pub base_rev: Rev,
    pub created_at: Timestamp,
    pub committed_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
    /// Groups changes submitted as one initial multi-batch upload, or
    /// produced by offline-session collapsing; see the coordinator's
    /// `commitChanges` preconditions.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub batch_id: Option<String>,
}

impl Change {
    /// Build a not-yet-committed change (`rev`/`committedAt` are `0`).
    pub fn pending(id: ChangeId, ops: Vec<JsonPatchOp>, base_rev: Rev, created_at: Timestamp) -> Self {
        Change {
            id,
            ops,
            rev: 0,
            base_rev,
            created_at,
            committed_at: 0,
            metadata: None,
            batch_id: None,
        }
    }

    pub fn with_batch_id(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }

    /// True once the server has assigned a revision and commit time.
    pub fn is_committed(&self) -> bool {
        self.committed_at > 0 && self.rev > 0
    }

    /// Return a copy committed at `rev`/`committed_at`, consuming no
    /// ownership of `self` (the server never mutates a submitted change
    /// in place; it derives the canonical record).
    pub fn committed(&self, rev: Rev, committed_at: Timestamp) -> Self {
        let mut out = self.clone();
        out.rev = rev;
        out.committed_at = committed_at;
        out
    }

    /// Estimate the serialized byte size of this change, used to decide
    /// whether it must be split to respect `maxPayloadBytes`.
    pub fn estimated_size(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pending_change_is_not_committed() {
        let change = Change::pending("abc12345".into(), vec![JsonPatchOp::replace("/a", json!(1))], 0, 100);
        assert!(!change.is_committed());
    }

    #[test]
    fn committed_sets_rev_and_committed_at() {
        let change = Change::pending("abc12345".into(), vec![JsonPatchOp::replace("/a", json!(1))], 0, 100);
        let committed = change.committed(1, 150);
        assert!(committed.is_committed());
        assert_eq!(committed.rev, 1);
        assert_eq!(committed.base_rev, 0);
    }

    #[test]
    fn serializes_with_camel_case_field_names() {
        let change = Change::pending("abc12345".into(), vec![JsonPatchOp::replace("/a", json!(1))], 0, 100);
        let json = serde_json::to_string(&change).unwrap();
        assert!(json.contains("\"baseRev\""));
        assert!(json.contains("\"createdAt\""));
    }
}
