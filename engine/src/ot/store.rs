//! `OtClientStore`: the durable local queues an OT client needs —
//! snapshot, committed history, and pending changes — kept behind a
//! trait so `syncpatch-core` stays IO-free. `syncpatch-server` and tests
//! each supply a concrete implementation (Postgres-backed on the server
//! side, in-memory here for unit tests).

use crate::change::Change;
use crate::error::Result;
use crate::{DocId, Rev};

/// Durable local state for one client's OT documents. Implementations
/// must make every method here atomic with respect to concurrent callers
/// on the same `DocId`; the [`crate::lock::DocLock`] is what the client
/// algorithm uses to guarantee that.
pub trait OtClientStore: Send + Sync {
    fn committed_rev(&self, doc_id: &DocId) -> Result<Rev>;
    fn set_committed_rev(&mut self, doc_id: &DocId, rev: Rev) -> Result<()>;

    fn pending_changes(&self, doc_id: &DocId) -> Result<Vec<Change>>;
    fn save_pending(&mut self, doc_id: &DocId, changes: &[Change]) -> Result<()>;
    fn replace_pending(&mut self, doc_id: &DocId, changes: Vec<Change>) -> Result<()>;

    fn save_committed(&mut self, doc_id: &DocId, changes: &[Change]) -> Result<()>;
    fn committed_changes(&self, doc_id: &DocId) -> Result<Vec<Change>>;
}

/// In-memory [`OtClientStore`], used by unit tests and as a reference
/// implementation; mirrors the shape (not the multi-collection scope) of
/// the teacher engine's in-memory store.
#[derive(Debug, Default)]
pub struct InMemoryOtClientStore {
    committed_rev: std::collections::HashMap<DocId, Rev>,
    pending: std::collections::HashMap<DocId, Vec<Change>>,
    committed: std::collections::HashMap<DocId, Vec<Change>>,
}

impl InMemoryOtClientStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OtClientStore for InMemoryOtClientStore {
    fn committed_rev(&self, doc_id: &DocId) -> Result<Rev> {
        Ok(*self.committed_rev.get(doc_id).unwrap_or(&0))
    }

    fn set_committed_rev(&mut self, doc_id: &DocId, rev: Rev) -> Result<()> {
        self.committed_rev.insert(doc_id.clone(), rev);
        Ok(())
    }

    fn pending_changes(&self, doc_id: &DocId) -> Result<Vec<Change>> {
        Ok(self.pending.get(doc_id).cloned().unwrap_or_default())
    }

    fn save_pending(&mut self, doc_id: &DocId, changes: &[Change]) -> Result<()> {
        self.pending.entry(doc_id.clone()).or_default().extend(changes.iter().cloned());
        Ok(())
    }

    fn replace_pending(&mut self, doc_id: &DocId, changes: Vec<Change>) -> Result<()> {
        self.pending.insert(doc_id.clone(), changes);
        Ok(())
    }

    fn save_committed(&mut self, doc_id: &DocId, changes: &[Change]) -> Result<()> {
        self.committed.entry(doc_id.clone()).or_default().extend(changes.iter().cloned());
        if let Some(max_rev) = changes.iter().map(|c| c.rev).max() {
            let entry = self.committed_rev.entry(doc_id.clone()).or_insert(0);
            *entry = (*entry).max(max_rev);
        }
        Ok(())
    }

    fn committed_changes(&self, doc_id: &DocId) -> Result<Vec<Change>> {
        Ok(self.committed.get(doc_id).cloned().unwrap_or_default())
    }
}
