//! `Doc`: the in-memory materialized OT document. Accepts a mutator that
//! reads the live state and returns ops; emits the new live state on an
//! event signal after every mutation.

use tokio::sync::broadcast;

use crate::change::Change;
use crate::error::Result;
use crate::patch::{apply, ApplyOptions, JsonPatchOp};
use crate::snapshot::Snapshot;
use crate::{DocId, Rev};

const SIGNAL_CAPACITY: usize = 32;

/// One open document. Owned by exactly one tab/process; its queues are
/// exclusively owned by the [`crate::ot::client::OtClientAlgorithm`]
/// driving it.
pub struct Doc {
    pub doc_id: DocId,
    pub snapshot: Snapshot,
    changed_tx: broadcast::Sender<serde_json::Value>,
}

impl Doc {
    pub fn new(doc_id: DocId, state: serde_json::Value, rev: Rev) -> Self {
        let (changed_tx, _) = broadcast::channel(SIGNAL_CAPACITY);
        Doc { doc_id, snapshot: Snapshot::new(state, rev), changed_tx }
    }

    pub fn committed_rev(&self) -> Rev {
        self.snapshot.rev
    }

    pub fn live_state(&self) -> Result<serde_json::Value> {
        self.snapshot.live_state()
    }

    /// Subscribe to live-state changes. Notifications are delivered to
    /// each subscriber in emission order; a lagged receiver observes a
    /// `RecvError::Lagged` rather than silently missing updates.
    pub fn subscribe(&self) -> broadcast::Receiver<serde_json::Value> {
        self.changed_tx.subscribe()
    }

    /// Run `mutate` against the current live state to produce ops, then
    /// emit the resulting state. Does not itself record the ops as a
    /// pending `Change` — that bookkeeping belongs to the client
    /// algorithm, which calls [`Doc::record_pending`] next.
    pub fn mutate(&mut self, mutate: impl FnOnce(&serde_json::Value) -> Vec<JsonPatchOp>) -> Result<Vec<JsonPatchOp>> {
        let live = self.live_state()?;
        let ops = mutate(&live);
        Ok(ops)
    }

    /// Fold a newly authored change into the pending queue and emit the
    /// resulting live state.
    pub fn record_pending(&mut self, change: Change) -> Result<()> {
        self.snapshot.push_pending(change);
        self.emit()
    }

    /// Apply server-committed changes to the base state and replace the
    /// pending queue with its rebased form, per §4.2 step 5.
    pub fn apply_committed_changes(&mut self, committed: &[Change], rebased_pending: Vec<Change>) -> Result<()> {
        let mut base = self.snapshot.state.clone();
        for change in committed {
            base = apply(&base, &change.ops, ApplyOptions::default())?;
        }
        let new_rev = committed.iter().map(|c| c.rev).max().unwrap_or(self.snapshot.rev).max(self.snapshot.rev);
        self.snapshot.set_pending(base, new_rev, rebased_pending);
        self.emit()
    }

    fn emit(&self) -> Result<()> {
        // A send with no subscribers is not an error; it just means
        // nothing is currently listening.
        let _ = self.changed_tx.send(self.live_state()?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::JsonPatchOp;
    use serde_json::json;

    #[test]
    fn mutate_produces_ops_against_live_state() {
        let mut doc = Doc::new("d1".into(), json!({"title": "Hello"}), 0);
        let ops = doc.mutate(|state| {
            assert_eq!(state["title"], "Hello");
            vec![JsonPatchOp::replace("/title", json!("World"))]
        }).unwrap();
        assert_eq!(ops.len(), 1);
    }

    #[test]
    fn apply_committed_changes_advances_base_and_rev() {
        let mut doc = Doc::new("d1".into(), json!({"title": "Hello"}), 0);
        let committed = vec![Change::pending("c1".into(), vec![JsonPatchOp::replace("/title", json!("World"))], 0, 1000).committed(1, 1001)];
        doc.apply_committed_changes(&committed, Vec::new()).unwrap();
        assert_eq!(doc.committed_rev(), 1);
        assert_eq!(doc.live_state().unwrap(), json!({"title": "World"}));
    }

    #[tokio::test]
    async fn subscribers_receive_emitted_state_in_order() {
        let mut doc = Doc::new("d1".into(), json!({"count": 0}), 0);
        let mut rx = doc.subscribe();
        let change = Change::pending("c1".into(), vec![JsonPatchOp::inc("/count", 1.0)], 0, 1000);
        doc.record_pending(change).unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received, json!({"count": 1.0}));
    }
}
