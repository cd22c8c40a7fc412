//! `Snapshot`: materialized client state at a revision, plus a trailing
//! queue of locally-pending `Change`s not yet folded into that state.
//! The fundamental client-side invariant is `live_state() == apply(state,
//! changes)`, recomputed from `state` and `changes` rather than cached,
//! so it can never drift out of sync with the two fields it is defined
//! over.

use serde::{Deserialize, Serialize};

use crate::change::Change;
use crate::error::Result;
use crate::patch::{apply, ApplyOptions};
use crate::Rev;

/// Format tag for the serialized snapshot, bumped if the on-disk shape
/// ever changes incompatibly.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// `{state, rev, changes[]}` per the data model: `state` is the
/// materialized value as of `rev`, and `changes` are locally-authored
/// edits made since, not yet acknowledged by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub state: serde_json::Value,
    pub rev: Rev,
    pub changes: Vec<Change>,
}

impl Snapshot {
    pub fn new(state: serde_json::Value, rev: Rev) -> Self {
        Snapshot { state, rev, changes: Vec::new() }
    }

    /// The live document state: `apply(state, changes)`, re-derived on
    /// every call so it can never disagree with `state`/`changes`.
    pub fn live_state(&self) -> Result<serde_json::Value> {
        let mut out = self.state.clone();
        for change in &self.changes {
            out = apply(&out, &change.ops, ApplyOptions::default())?;
        }
        Ok(out)
    }

    /// Append a newly authored pending change without touching `state`.
    pub fn push_pending(&mut self, change: Change) {
        self.changes.push(change);
    }

    /// Replace `state`/`rev`/`changes` wholesale, used once the algorithm
    /// has folded committed changes into a new base state and rebased
    /// the surviving pending changes against them.
    pub fn set_pending(&mut self, new_state: serde_json::Value, rev: Rev, changes: Vec<Change>) {
        self.state = new_state;
        self.rev = rev;
        self.changes = changes;
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl From<serde_json::Error> for crate::Error {
    fn from(e: serde_json::Error) -> Self {
        crate::Error::InvalidPatch(format!("serialization error: {e}"))
    }
}
