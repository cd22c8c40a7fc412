//! `LwwClientStore`: the durable local state an LWW client needs —
//! committed fields, the consolidated pending-ops map, and the single
//! in-flight sending change.

use std::collections::HashMap;

use crate::change::Change;
use crate::error::Result;
use crate::patch::JsonPatchOp;
use crate::{DocId, Path, Rev};

pub trait LwwClientStore: Send + Sync {
    fn committed_rev(&self, doc_id: &DocId) -> Result<Rev>;
    fn set_committed_rev(&mut self, doc_id: &DocId, rev: Rev) -> Result<()>;

    fn committed_fields(&self, doc_id: &DocId) -> Result<HashMap<Path, JsonPatchOp>>;
    fn set_committed_field(&mut self, doc_id: &DocId, path: Path, op: JsonPatchOp) -> Result<()>;

    fn pending_ops(&self, doc_id: &DocId) -> Result<HashMap<Path, JsonPatchOp>>;
    fn set_pending_ops(&mut self, doc_id: &DocId, ops: HashMap<Path, JsonPatchOp>) -> Result<()>;

    fn sending_change(&self, doc_id: &DocId) -> Result<Option<Change>>;
    fn set_sending_change(&mut self, doc_id: &DocId, change: Option<Change>) -> Result<()>;
}

/// In-memory [`LwwClientStore`] used by unit tests and as a reference
/// implementation.
#[derive(Debug, Default)]
pub struct InMemoryLwwClientStore {
    committed_rev: HashMap<DocId, Rev>,
    committed_fields: HashMap<DocId, HashMap<Path, JsonPatchOp>>,
    pending_ops: HashMap<DocId, HashMap<Path, JsonPatchOp>>,
    sending: HashMap<DocId, Change>,
}

impl InMemoryLwwClientStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LwwClientStore for InMemoryLwwClientStore {
    fn committed_rev(&self, doc_id: &DocId) -> Result<Rev> {
        Ok(*self.committed_rev.get(doc_id).unwrap_or(&0))
    }

    fn set_committed_rev(&mut self, doc_id: &DocId, rev: Rev) -> Result<()> {
        self.committed_rev.insert(doc_id.clone(), rev);
        Ok(())
    }

    fn committed_fields(&self, doc_id: &DocId) -> Result<HashMap<Path, JsonPatchOp>> {
        Ok(self.committed_fields.get(doc_id).cloned().unwrap_or_default())
    }

    fn set_committed_field(&mut self, doc_id: &DocId, path: Path, op: JsonPatchOp) -> Result<()> {
        self.committed_fields.entry(doc_id.clone()).or_default().insert(path, op);
        Ok(())
    }

    fn pending_ops(&self, doc_id: &DocId) -> Result<HashMap<Path, JsonPatchOp>> {
        Ok(self.pending_ops.get(doc_id).cloned().unwrap_or_default())
    }

    fn set_pending_ops(&mut self, doc_id: &DocId, ops: HashMap<Path, JsonPatchOp>) -> Result<()> {
        self.pending_ops.insert(doc_id.clone(), ops);
        Ok(())
    }

    fn sending_change(&self, doc_id: &DocId) -> Result<Option<Change>> {
        Ok(self.sending.get(doc_id).cloned())
    }

    fn set_sending_change(&mut self, doc_id: &DocId, change: Option<Change>) -> Result<()> {
        match change {
            Some(c) => {
                self.sending.insert(doc_id.clone(), c);
            }
            None => {
                self.sending.remove(doc_id);
            }
        }
        Ok(())
    }
}
