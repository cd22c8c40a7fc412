//! Coordinator Server — LWW variant (§4.5): per-path merge-by-timestamp
//! against an [`LwwServerStore`], with self-heal for the ancestor/scalar
//! collisions the client-side consolidation rules in
//! [`crate::lww::consolidate`] explicitly leave to the server.

use std::collections::HashMap;

use crate::change::Change;
use crate::error::Result;
use crate::lww::consolidate::merge_same_path;
use crate::patch::pointer;
use crate::patch::{apply, ApplyOptions, JsonPatchOp, OpType};
use crate::{DocId, Path, Rev, Timestamp};

/// Durable server-side state for one LWW document: the authoritative
/// per-path value map (used for same-path/ancestor conflict resolution),
/// the append-only commit history (used to serve `getChangesSince` and
/// as catch-up material returned alongside a commit), and a periodic
/// full-state snapshot used to bound how much history `getDoc` replays.
pub trait LwwServerStore: Send + Sync {
    fn committed_rev(&self, doc_id: &DocId) -> impl std::future::Future<Output = Result<Rev>> + Send;
    fn is_deleted(&self, doc_id: &DocId) -> impl std::future::Future<Output = Result<bool>> + Send;
    fn set_deleted(&self, doc_id: &DocId, deleted: bool) -> impl std::future::Future<Output = Result<()>> + Send;

    fn committed_fields(&self, doc_id: &DocId) -> impl std::future::Future<Output = Result<HashMap<Path, JsonPatchOp>>> + Send;
    fn set_committed_field(&self, doc_id: &DocId, path: Path, op: JsonPatchOp) -> impl std::future::Future<Output = Result<()>> + Send;
    fn remove_committed_field(&self, doc_id: &DocId, path: &Path) -> impl std::future::Future<Output = Result<()>> + Send;

    fn append_history(&self, doc_id: &DocId, change: Change) -> impl std::future::Future<Output = Result<()>> + Send;
    fn history_since(&self, doc_id: &DocId, rev: Rev) -> impl std::future::Future<Output = Result<Vec<Change>>> + Send;

    fn snapshot(&self, doc_id: &DocId) -> impl std::future::Future<Output = Result<Option<(serde_json::Value, Rev)>>> + Send;
    fn save_snapshot(&self, doc_id: &DocId, state: serde_json::Value, rev: Rev) -> impl std::future::Future<Output = Result<()>> + Send;
}

#[derive(Debug, Clone, Copy)]
pub struct LwwCoordinatorConfig {
    /// Materialize and persist a new full-state snapshot every this many
    /// commits, so `getDoc` never has to replay an unbounded history.
    pub snapshot_interval: u64,
}

impl Default for LwwCoordinatorConfig {
    fn default() -> Self {
        LwwCoordinatorConfig { snapshot_interval: 200 }
    }
}

pub struct LwwCoordinator<S: LwwServerStore> {
    store: S,
    config: LwwCoordinatorConfig,
}

impl<S: LwwServerStore> LwwCoordinator<S> {
    pub fn new(store: S, config: LwwCoordinatorConfig) -> Self {
        LwwCoordinator { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reconstruct `(state, rev)` by replaying committed history on top of
    /// the most recent snapshot at or before `at_rev`.
    pub async fn get_doc(&self, doc_id: &DocId, at_rev: Option<Rev>) -> Result<(serde_json::Value, Rev)> {
        let snapshot = self.store.snapshot(doc_id).await?;
        let (state, floor_rev) = match &snapshot {
            Some((state, rev)) if at_rev.map(|cap| *rev <= cap).unwrap_or(true) => (state.clone(), *rev),
            _ => (serde_json::Value::Object(Default::default()), 0),
        };
        let history = self.store.history_since(doc_id, floor_rev).await?;
        let mut state = state;
        let mut rev = floor_rev;
        for change in history {
            if let Some(cap) = at_rev {
                if change.rev > cap {
                    break;
                }
            }
            state = apply(&state, &change.ops, ApplyOptions::default())?;
            rev = change.rev;
        }
        Ok((state, rev))
    }

    pub async fn get_changes_since(&self, doc_id: &DocId, rev: Rev) -> Result<Vec<Change>> {
        self.store.history_since(doc_id, rev).await
    }

    pub async fn delete_doc(&self, doc_id: &DocId) -> Result<()> {
        self.store.set_deleted(doc_id, true).await
    }

    /// `commitChanges` (§4.5). The LWW client only ever has one change in
    /// flight at a time, so this takes a single [`Change`] rather than a
    /// batch. Returns the catch-up changes committed by others since
    /// `change.baseRev`, followed by this commit's own change (empty if
    /// every op in it was superseded by a newer committed write).
    /// Assumes the caller holds the per-doc lock for the duration of this
    /// call.
    pub async fn commit_changes(&self, doc_id: &DocId, change: Change, now: Timestamp) -> Result<Vec<Change>> {
        let catch_up = self.store.history_since(doc_id, change.base_rev).await?;
        let submitted_paths: Vec<Path> = change.ops.iter().map(|op| op.path.clone()).collect();

        let mut committed_fields = self.store.committed_fields(doc_id).await?;
        let mut to_store: Vec<JsonPatchOp> = Vec::new();
        // Self-heal corrections (§4.5 step 2): ops rejected because an
        // ancestor is a stored primitive. These ship back to the client
        // instead of being applied, so it can repair its own state.
        let mut corrections: Vec<JsonPatchOp> = Vec::new();

        for mut op in change.ops {
            if op.ts.is_none() {
                op.ts = Some(now);
            }

            // Ancestor write: drop descendant entries it supersedes.
            let descendants: Vec<Path> =
                committed_fields.keys().filter(|p| pointer::is_ancestor(&op.path, p)).cloned().collect();
            for path in &descendants {
                committed_fields.remove(path);
                self.store.remove_committed_field(doc_id, path).await?;
            }

            let primitive_ancestor = committed_fields
                .iter()
                .find(|(p, existing)| pointer::is_ancestor(p, &op.path) && !is_container_value(&existing.value))
                .map(|(_, existing)| existing.clone());

            if let Some(ancestor_op) = primitive_ancestor {
                // The incoming write is rejected outright: its target has
                // no container to live in. Send the ancestor's current
                // value back as a correction; stored state is untouched.
                tracing::debug!(doc_id = %doc_id, path = %op.path, ancestor = %ancestor_op.path, "rejecting write under a primitive ancestor");
                corrections.push(ancestor_op);
                continue;
            }

            let existing_before = committed_fields.remove(&op.path);
            let resolved = match &existing_before {
                Some(existing) => merge_same_path(existing, &op),
                None => op.clone(),
            };

            // A stale write that lost the timestamp race resolves to the
            // unchanged existing value: nothing actually changed, so it
            // contributes no new committed state.
            if existing_before.as_ref() == Some(&resolved) {
                committed_fields.insert(resolved.path.clone(), resolved);
                continue;
            }

            let concrete = to_concrete(resolved);
            committed_fields.insert(concrete.path.clone(), concrete.clone());
            self.store.set_committed_field(doc_id, concrete.path.clone(), concrete.clone()).await?;
            to_store.push(concrete);
        }

        let current_rev = self.store.committed_rev(doc_id).await?;

        // Corrections carry no new revision of their own: they restate
        // already-committed state, so they're stamped with the doc's
        // current rev rather than advancing it.
        let correction_change = (!corrections.is_empty()).then(|| Change {
            id: crate::ids::new_change_id(),
            ops: corrections,
            rev: current_rev,
            base_rev: current_rev,
            created_at: now,
            committed_at: now,
            metadata: None,
            batch_id: None,
        });

        if to_store.is_empty() {
            let catch_up_change = synthesize_catch_up(catch_up, &submitted_paths, change.base_rev, current_rev, now);
            let mut response: Vec<Change> = correction_change.into_iter().collect();
            response.extend(catch_up_change);
            return Ok(response);
        }

        let next_rev = current_rev + 1;
        let committed = Change {
            id: change.id,
            ops: to_store,
            rev: next_rev,
            base_rev: change.base_rev,
            created_at: change.created_at,
            committed_at: now,
            metadata: change.metadata,
            batch_id: change.batch_id,
        };
        self.store.append_history(doc_id, committed.clone()).await?;

        if next_rev % self.config.snapshot_interval == 0 {
            let (state, rev) = self.get_doc(doc_id, Some(next_rev)).await?;
            self.store.save_snapshot(doc_id, state, rev).await?;
        }

        let catch_up_change = synthesize_catch_up(catch_up, &submitted_paths, change.base_rev, current_rev, now);
        let mut response: Vec<Change> = correction_change.into_iter().collect();
        response.extend(catch_up_change);
        response.push(committed);
        Ok(response)
    }
}

/// Build the catch-up portion of a commit response (§4.5 step 6): every op
/// committed by someone else since `base_rev`, minus any path equal to or
/// descending from a path the client just submitted (its own write already
/// supersedes those), sorted ascending by `ts`. Returns `None` when nothing
/// survives the filter.
fn synthesize_catch_up(catch_up: Vec<Change>, submitted_paths: &[Path], base_rev: Rev, rev: Rev, now: Timestamp) -> Option<Change> {
    let mut ops: Vec<JsonPatchOp> = catch_up
        .into_iter()
        .flat_map(|c| c.ops)
        .filter(|op| !submitted_paths.iter().any(|p| *p == op.path || pointer::is_ancestor(p, &op.path)))
        .collect();
    if ops.is_empty() {
        return None;
    }
    ops.sort_by_key(|op| op.ts.unwrap_or(0));
    Some(Change {
        id: crate::ids::new_change_id(),
        ops,
        rev,
        base_rev,
        created_at: now,
        committed_at: now,
        metadata: None,
        batch_id: None,
    })
}

fn is_container_value(value: &Option<serde_json::Value>) -> bool {
    matches!(value, Some(serde_json::Value::Object(_)) | Some(serde_json::Value::Array(_)))
}

/// Convert a resolved op to its concrete, storage-ready form: the
/// extended numeric/bit operators fold to a `replace` carrying the
/// already-resolved absolute value (there is nothing left to fold once a
/// write is committed), while `@txt` keeps its delta shape since
/// downstream clients still need to transform their own pending deltas
/// against it.
fn to_concrete(op: JsonPatchOp) -> JsonPatchOp {
    match op.op {
        OpType::Inc | OpType::Bit | OpType::Max | OpType::Min => {
            let mut out = op.clone();
            out.op = OpType::Replace;
            out
        }
        _ => op,
    }
}

/// In-memory [`LwwServerStore`] reference implementation.
#[derive(Default)]
pub struct InMemoryLwwServerStore {
    inner: std::sync::Mutex<InMemoryLwwServerStoreInner>,
}

#[derive(Default)]
struct InMemoryLwwServerStoreInner {
    fields: HashMap<DocId, HashMap<Path, JsonPatchOp>>,
    history: HashMap<DocId, Vec<Change>>,
    snapshots: HashMap<DocId, (serde_json::Value, Rev)>,
    deleted: HashMap<DocId, bool>,
}

impl InMemoryLwwServerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LwwServerStore for InMemoryLwwServerStore {
    async fn committed_rev(&self, doc_id: &DocId) -> Result<Rev> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.history.get(doc_id).and_then(|h| h.last()).map(|c| c.rev).unwrap_or(0))
    }

    async fn is_deleted(&self, doc_id: &DocId) -> Result<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(*inner.deleted.get(doc_id).unwrap_or(&false))
    }

    async fn set_deleted(&self, doc_id: &DocId, deleted: bool) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.deleted.insert(doc_id.clone(), deleted);
        Ok(())
    }

    async fn committed_fields(&self, doc_id: &DocId) -> Result<HashMap<Path, JsonPatchOp>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.fields.get(doc_id).cloned().unwrap_or_default())
    }

    async fn set_committed_field(&self, doc_id: &DocId, path: Path, op: JsonPatchOp) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.fields.entry(doc_id.clone()).or_default().insert(path, op);
        Ok(())
    }

    async fn remove_committed_field(&self, doc_id: &DocId, path: &Path) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(fields) = inner.fields.get_mut(doc_id) {
            fields.remove(path);
        }
        Ok(())
    }

    async fn append_history(&self, doc_id: &DocId, change: Change) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.history.entry(doc_id.clone()).or_default().push(change);
        Ok(())
    }

    async fn history_since(&self, doc_id: &DocId, rev: Rev) -> Result<Vec<Change>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .history
            .get(doc_id)
            .map(|h| h.iter().filter(|c| c.rev > rev).cloned().collect())
            .unwrap_or_default())
    }

    async fn snapshot(&self, doc_id: &DocId) -> Result<Option<(serde_json::Value, Rev)>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.snapshots.get(doc_id).cloned())
    }

    async fn save_snapshot(&self, doc_id: &DocId, state: serde_json::Value, rev: Rev) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.snapshots.insert(doc_id.clone(), (state, rev));
        Ok(())
    }
}
