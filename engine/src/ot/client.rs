//! Client Algorithm — OT variant (§4.2): packages ops emitted by a `Doc`
//! into `Change` records, persists them, reconciles server
//! acknowledgments, and rebases pending changes against externally
//! broadcast changes.

use std::collections::HashSet;

use super::doc::Doc;
use super::store::OtClientStore;
use crate::change::Change;
use crate::error::Result;
use crate::ids::new_change_id;
use crate::patch::{transform_patch, JsonPatchOp};
use crate::{DocId, Rev, Timestamp};

/// The OT client algorithm. Generic over the store so tests can run
/// against [`super::store::InMemoryOtClientStore`] while
/// `syncpatch-server` (and any future client) supplies its own.
pub struct OtClientAlgorithm<S: OtClientStore> {
    store: S,
    max_payload_bytes: Option<usize>,
}

impl<S: OtClientStore> OtClientAlgorithm<S> {
    pub fn new(store: S) -> Self {
        OtClientAlgorithm { store, max_payload_bytes: None }
    }

    pub fn with_max_payload_bytes(mut self, max: usize) -> Self {
        self.max_payload_bytes = Some(max);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Package `ops` into one or more `Change`s, splitting across
    /// multiple changes if a max payload size is configured so each
    /// serialized change stays within it. Persists to the pending queue
    /// and, if `doc` is open, folds the changes into its live state.
    pub fn handle_doc_change(
        &mut self,
        doc_id: &DocId,
        ops: Vec<JsonPatchOp>,
        doc: Option<&mut Doc>,
        now: Timestamp,
    ) -> Result<Vec<Change>> {
        let base_rev = self.store.committed_rev(doc_id)?;
        let batches = self.split_ops(ops);
        let mut changes = Vec::with_capacity(batches.len());
        for (i, batch) in batches.into_iter().enumerate() {
            let mut change = Change::pending(new_change_id(), batch, base_rev, now);
            // Tentative rev, informational only until the server assigns
            // the canonical one; lets UIs show optimistic ordering
            // before a round trip completes.
            change.rev = base_rev + i as Rev + 1;
            changes.push(change);
        }

        self.store.save_pending(doc_id, &changes)?;
        if let Some(doc) = doc {
            for change in &changes {
                doc.record_pending(change.clone())?;
            }
        }
        Ok(changes)
    }

    fn split_ops(&self, ops: Vec<JsonPatchOp>) -> Vec<Vec<JsonPatchOp>> {
        let Some(limit) = self.max_payload_bytes else {
            return vec![ops];
        };
        let mut batches = Vec::new();
        let mut current = Vec::new();
        let mut current_size = 0usize;
        for op in ops {
            let op_size = serde_json::to_vec(&op).map(|v| v.len()).unwrap_or(0);
            if !current.is_empty() && current_size + op_size > limit {
                batches.push(std::mem::take(&mut current));
                current_size = 0;
            }
            current_size += op_size;
            current.push(op);
        }
        if !current.is_empty() {
            batches.push(current);
        }
        if batches.is_empty() {
            batches.push(Vec::new());
        }
        batches
    }

    /// Return the current pending queue, optionally batched by a byte
    /// ceiling. `None` when empty.
    pub fn get_pending_to_send(&self, doc_id: &DocId) -> Result<Option<Vec<Change>>> {
        let pending = self.store.pending_changes(doc_id)?;
        if pending.is_empty() {
            Ok(None)
        } else {
            Ok(Some(pending))
        }
    }

    /// Reconcile a batch of server changes (§4.2 steps 1-5).
    pub fn apply_server_changes(&mut self, doc_id: &DocId, server_changes: &[Change], doc: Option<&mut Doc>) -> Result<()> {
        let server_ids: HashSet<&str> = server_changes.iter().map(|c| c.id.as_str()).collect();
        let pending = self.store.pending_changes(doc_id)?;

        // Step 1: drop pending that the server just acknowledged.
        let surviving: Vec<Change> = pending.into_iter().filter(|p| !server_ids.contains(p.id.as_str())).collect();

        // Step 2-3: rebase each surviving pending change's ops against
        // every server-authoritative op, in order; drop empties.
        let server_ops: Vec<JsonPatchOp> = server_changes.iter().flat_map(|c| c.ops.iter().cloned()).collect();
        let last_server_rev = server_changes.iter().map(|c| c.rev).max().unwrap_or(0);
        let mut rebased = Vec::with_capacity(surviving.len());
        for change in surviving {
            let rebased_ops = transform_patch(&server_ops, &change.ops)?;
            if rebased_ops.is_empty() {
                continue;
            }
            let mut next = change.clone();
            next.ops = rebased_ops;
            next.base_rev = last_server_rev;
            rebased.push(next);
        }
        // Renumber tentative revs against the new base.
        for (i, change) in rebased.iter_mut().enumerate() {
            change.rev = last_server_rev + i as Rev + 1;
        }

        // Step 4: persist.
        self.store.save_committed(doc_id, server_changes)?;
        self.store.replace_pending(doc_id, rebased.clone())?;
        self.store.set_committed_rev(doc_id, last_server_rev.max(self.store.committed_rev(doc_id)?))?;

        // Step 5: update the open doc, if any.
        if let Some(doc) = doc {
            doc.apply_committed_changes(server_changes, rebased)?;
        }
        Ok(())
    }

    /// Called when a send succeeds with no server-side divergence:
    /// simply remove the acknowledged pending changes.
    pub fn confirm_sent(&mut self, doc_id: &DocId, changes: &[Change]) -> Result<()> {
        let acked: HashSet<&str> = changes.iter().map(|c| c.id.as_str()).collect();
        let remaining: Vec<Change> = self
            .store
            .pending_changes(doc_id)?
            .into_iter()
            .filter(|p| !acked.contains(p.id.as_str()))
            .collect();
        self.store.replace_pending(doc_id, remaining)?;
        self.store.save_committed(doc_id, changes)?;
        if let Some(max_rev) = changes.iter().map(|c| c.rev).max() {
            let current = self.store.committed_rev(doc_id)?;
            self.store.set_committed_rev(doc_id, current.max(max_rev))?;
        }
        Ok(())
    }
}
