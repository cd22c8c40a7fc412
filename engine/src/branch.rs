//! The `Branch` record type. Lifecycle only: the branch *manager* logic
//! (fork capture, fast-forward/flatten merge) lives in
//! [`crate::branch_manager`], which drives it against an
//! [`crate::ot::OtServerStore`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::{DocId, Rev, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchStatus {
    Open,
    Merged,
    Closed,
    Archived,
}

/// `{id, docId, branchedAtRev, createdAt, status, name?, metadata?}`.
/// Created open, may be updated, terminally closed exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: String,
    pub doc_id: DocId,
    pub branched_at_rev: Rev,
    pub created_at: Timestamp,
    pub status: BranchStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl Branch {
    pub fn open(id: String, doc_id: DocId, branched_at_rev: Rev, created_at: Timestamp) -> Self {
        Branch {
            id,
            doc_id,
            branched_at_rev,
            created_at,
            status: BranchStatus::Open,
            name: None,
            metadata: None,
        }
    }

    /// Apply a metadata-only update. Refuses to touch the identity and
    /// lifecycle fields, which `updateBranch` must never mutate.
    pub fn with_update(&self, name: Option<String>, metadata: Option<HashMap<String, serde_json::Value>>) -> Self {
        let mut out = self.clone();
        if let Some(name) = name {
            out.name = Some(name);
        }
        if let Some(metadata) = metadata {
            out.metadata = Some(metadata);
        }
        out
    }

    pub fn close(&self, status: BranchStatus) -> Result<Self> {
        if self.status != BranchStatus::Open {
            return Err(Error::BranchNotOpen { branch_id: self.id.clone() });
        }
        let mut out = self.clone();
        out.status = status;
        Ok(out)
    }

    pub fn require_open(&self) -> Result<()> {
        if self.status != BranchStatus::Open {
            return Err(Error::BranchNotOpen { branch_id: self.id.clone() });
        }
        Ok(())
    }
}
