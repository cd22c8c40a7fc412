//! Client Algorithm — LWW variant (§4.3). Never performs OT
//! transformation: each path is merged independently by timestamp.

use super::consolidate::consolidate_client;
use super::store::LwwClientStore;
use crate::change::Change;
use crate::error::Result;
use crate::ids::new_change_id;
use crate::patch::JsonPatchOp;
use crate::{DocId, Rev, Timestamp};

pub struct LwwClientAlgorithm<S: LwwClientStore> {
    store: S,
}

impl<S: LwwClientStore> LwwClientAlgorithm<S> {
    pub fn new(store: S) -> Self {
        LwwClientAlgorithm { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Consolidate each newly authored op into the pending-ops map (§4.3).
    pub fn handle_doc_change(&mut self, doc_id: &DocId, ops: Vec<JsonPatchOp>, now: Timestamp) -> Result<()> {
        let mut pending = self.store.pending_ops(doc_id)?;
        for op in ops {
            consolidate_client(&mut pending, op, now);
        }
        self.store.set_pending_ops(doc_id, pending)?;
        Ok(())
    }

    /// Return the in-flight sending change if a send is already underway
    /// (retry path); otherwise form one from the current pending ops,
    /// persist it as the sending change, clear pending, and return it.
    /// `None` when there is nothing to send.
    pub fn get_pending_to_send(&mut self, doc_id: &DocId, now: Timestamp) -> Result<Option<Change>> {
        if let Some(sending) = self.store.sending_change(doc_id)? {
            return Ok(Some(sending));
        }
        let pending = self.store.pending_ops(doc_id)?;
        if pending.is_empty() {
            return Ok(None);
        }
        let base_rev = self.store.committed_rev(doc_id)?;
        let mut ops: Vec<JsonPatchOp> = pending.into_values().collect();
        ops.sort_by(|a, b| a.path.cmp(&b.path));
        let change = Change::pending(new_change_id(), ops, base_rev, now);
        self.store.set_sending_change(doc_id, Some(change.clone()))?;
        self.store.set_pending_ops(doc_id, std::collections::HashMap::new())?;
        Ok(Some(change))
    }

    /// Write broadcast ops from other clients into `committedFields`.
    /// Never touches `sendingChange` — broadcasts are not self-acks.
    pub fn apply_server_changes(&mut self, doc_id: &DocId, server_change: &Change) -> Result<()> {
        for op in &server_change.ops {
            self.store.set_committed_field(doc_id, op.path.clone(), op.clone())?;
        }
        let rev = self.store.committed_rev(doc_id)?;
        self.store.set_committed_rev(doc_id, rev.max(server_change.rev))?;
        Ok(())
    }

    /// Move the ops of `sendingChange` into `committedFields`, bump the
    /// committed rev, and clear `sendingChange`.
    pub fn confirm_sent(&mut self, doc_id: &DocId, confirmed: &Change) -> Result<()> {
        for op in &confirmed.ops {
            self.store.set_committed_field(doc_id, op.path.clone(), op.clone())?;
        }
        let rev = self.store.committed_rev(doc_id)?;
        self.store.set_committed_rev(doc_id, rev.max(confirmed.rev))?;
        self.store.set_sending_change(doc_id, None)?;
        Ok(())
    }

    /// Clear `sendingChange` without merging any ops into `committedFields`.
    /// Used when the server's commit response carries no change sharing
    /// the sent change's id — every op in it was rejected (self-heal) or
    /// resolved to a no-op (stale timestamp loss). The send still
    /// succeeded: there is nothing left to retry, and any correction the
    /// server issued arrives as a separate change applied through
    /// [`Self::apply_server_changes`].
    pub fn clear_sending(&mut self, doc_id: &DocId) -> Result<()> {
        self.store.set_sending_change(doc_id, None)
    }

    pub fn committed_rev(&self, doc_id: &DocId) -> Result<Rev> {
        self.store.committed_rev(doc_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lww::store::InMemoryLwwClientStore;
    use serde_json::json;

    fn algo() -> LwwClientAlgorithm<InMemoryLwwClientStore> {
        LwwClientAlgorithm::new(InMemoryLwwClientStore::new())
    }

    #[test]
    fn get_pending_to_send_forms_change_and_clears_pending() {
        let mut algo = algo();
        let doc_id: DocId = "d1".into();
        algo.handle_doc_change(&doc_id, vec![JsonPatchOp::replace("/name", json!("Alice"))], 1000).unwrap();
        let change = algo.get_pending_to_send(&doc_id, 1000).unwrap().unwrap();
        assert_eq!(change.ops.len(), 1);
        assert_eq!(algo.store().pending_ops(&doc_id).unwrap().len(), 0);
    }

    #[test]
    fn get_pending_to_send_retries_in_flight_change() {
        let mut algo = algo();
        let doc_id: DocId = "d1".into();
        algo.handle_doc_change(&doc_id, vec![JsonPatchOp::replace("/name", json!("Alice"))], 1000).unwrap();
        let first = algo.get_pending_to_send(&doc_id, 1000).unwrap().unwrap();
        let second = algo.get_pending_to_send(&doc_id, 2000).unwrap().unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn confirm_sent_moves_ops_to_committed_and_clears_sending() {
        let mut algo = algo();
        let doc_id: DocId = "d1".into();
        algo.handle_doc_change(&doc_id, vec![JsonPatchOp::replace("/name", json!("Alice"))], 1000).unwrap();
        let change = algo.get_pending_to_send(&doc_id, 1000).unwrap().unwrap();
        let confirmed = change.committed(1, 1001);
        algo.confirm_sent(&doc_id, &confirmed).unwrap();
        assert_eq!(algo.store().sending_change(&doc_id).unwrap(), None);
        assert_eq!(algo.committed_rev(&doc_id).unwrap(), 1);
        assert_eq!(algo.store().committed_fields(&doc_id).unwrap()["/name"].value, Some(json!("Alice")));
    }

    #[test]
    fn broadcast_never_clears_sending_change() {
        let mut algo = algo();
        let doc_id: DocId = "d1".into();
        algo.handle_doc_change(&doc_id, vec![JsonPatchOp::replace("/name", json!("Alice"))], 1000).unwrap();
        let sending = algo.get_pending_to_send(&doc_id, 1000).unwrap().unwrap();
        let broadcast = Change::pending("other".into(), vec![JsonPatchOp::replace("/count", json!(1))], 0, 999).committed(1, 1000);
        algo.apply_server_changes(&doc_id, &broadcast).unwrap();
        assert_eq!(algo.store().sending_change(&doc_id).unwrap(), Some(sending));
    }
}
