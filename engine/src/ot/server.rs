//! Coordinator Server — OT variant (§4.4): the deterministic half of
//! `commitChanges`/`getDoc`/`getChangesSince`/`deleteDoc` against an
//! [`OtServerStore`]. `syncpatch-server` supplies the Postgres-backed
//! store and the per-doc locking/broadcast plumbing around this;
//! everything here is pure given its store.

use std::collections::{HashMap, HashSet};

use crate::branch::Branch;
use crate::change::Change;
use crate::error::{Error, Result};
use crate::patch::{apply, transform_patch, ApplyOptions};
use crate::version::{Version, VersionMetadata, VersionOrigin};
use crate::{DocId, Rev, Timestamp};

/// Durable server-side state for one OT document: the append-only change
/// log, the session versions that checkpoint it, and the tombstone/branch
/// records that gate recreation and forking. Implementations must
/// serialize writes to the same `DocId` (`syncpatch-server` does this
/// with a per-doc lock held by the caller, the same way
/// [`crate::sync::SyncController`] serializes the client side), so every
/// method here can assume exclusive access to its `doc_id` for the
/// duration of the call.
pub trait OtServerStore: Send + Sync {
    fn committed_rev(&self, doc_id: &DocId) -> impl std::future::Future<Output = Result<Rev>> + Send;
    fn is_deleted(&self, doc_id: &DocId) -> impl std::future::Future<Output = Result<bool>> + Send;
    fn set_deleted(&self, doc_id: &DocId, deleted: bool) -> impl std::future::Future<Output = Result<()>> + Send;

    /// The most recently committed change, if any, used to detect the
    /// inactivity gap that starts a new session.
    fn last_change(&self, doc_id: &DocId) -> impl std::future::Future<Output = Result<Option<Change>>> + Send;

    /// Changes with `rev` in `(after_rev, up_to_rev]` (or unbounded above
    /// when `up_to_rev` is `None`), ascending by `rev`.
    fn changes_in_range(
        &self,
        doc_id: &DocId,
        after_rev: Rev,
        up_to_rev: Option<Rev>,
    ) -> impl std::future::Future<Output = Result<Vec<Change>>> + Send;

    /// Append already rev-assigned, contiguous changes.
    fn append_changes(&self, doc_id: &DocId, changes: &[Change]) -> impl std::future::Future<Output = Result<()>> + Send;

    /// The most recent version with `endRev <= at_rev` (or the most
    /// recent version overall when `at_rev` is `None`).
    fn latest_version(
        &self,
        doc_id: &DocId,
        at_rev: Option<Rev>,
    ) -> impl std::future::Future<Output = Result<Option<Version>>> + Send;

    fn save_version(&self, doc_id: &DocId, version: Version) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Every version recorded for `doc_id`, ascending by `endRev`. Used
    /// by the Branch Manager (§4.7) to copy a branch's `origin: main`
    /// versions onto the source document at merge time.
    fn versions(&self, doc_id: &DocId) -> impl std::future::Future<Output = Result<Vec<Version>>> + Send;

    fn branch(&self, branch_id: &str) -> impl std::future::Future<Output = Result<Option<Branch>>> + Send;
    fn save_branch(&self, branch: &Branch) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Policy knobs for the OT coordinator: how long a gap between committed
/// changes starts a new session, and roughly how large a version's
/// change list is allowed to grow before it is cut regardless of gaps.
#[derive(Debug, Clone, Copy)]
pub struct OtCoordinatorConfig {
    pub session_timeout_millis: u64,
}

impl Default for OtCoordinatorConfig {
    fn default() -> Self {
        OtCoordinatorConfig { session_timeout_millis: 30 * 60 * 1000 }
    }
}

pub struct OtCoordinator<S: OtServerStore> {
    store: S,
    config: OtCoordinatorConfig,
}

impl<S: OtServerStore> OtCoordinator<S> {
    pub fn new(store: S, config: OtCoordinatorConfig) -> Self {
        OtCoordinator { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reconstruct `(state, rev)` at `at_rev` (or the current tip when
    /// `None`) by starting from the most recent version's materialized
    /// state and replaying the committed changes after it.
    pub async fn get_doc(&self, doc_id: &DocId, at_rev: Option<Rev>) -> Result<(serde_json::Value, Rev)> {
        let version = self.store.latest_version(doc_id, at_rev).await?;
        let (state, floor_rev) = match &version {
            Some(v) => (v.state.clone(), v.metadata.end_rev),
            None => (serde_json::Value::Object(Default::default()), 0),
        };
        let changes = self.store.changes_in_range(doc_id, floor_rev, at_rev).await?;
        let mut state = state;
        for change in &changes {
            state = apply(&state, &change.ops, ApplyOptions::default())?;
        }
        let rev = changes.last().map(|c| c.rev).unwrap_or(floor_rev);
        Ok((state, rev))
    }

    /// Changes committed strictly after `rev`, in order.
    pub async fn get_changes_since(&self, doc_id: &DocId, rev: Rev) -> Result<Vec<Change>> {
        self.store.changes_in_range(doc_id, rev, None).await
    }

    pub async fn delete_doc(&self, doc_id: &DocId) -> Result<()> {
        self.store.set_deleted(doc_id, true).await
    }

    /// `commitChanges` (§4.4 steps 1-5). Returns the changes the caller
    /// must broadcast (empty when the whole batch was a no-op retry).
    /// Assumes the caller holds the per-doc lock for the duration of this
    /// call.
    pub async fn commit_changes(&self, doc_id: &DocId, incoming: Vec<Change>, now: Timestamp) -> Result<Vec<Change>> {
        if incoming.is_empty() {
            return Ok(Vec::new());
        }

        let base_rev = incoming[0].base_rev;
        if incoming.iter().any(|c| c.base_rev != base_rev) {
            return Err(Error::BaseRevMismatchInBatch);
        }

        let current_rev = self.store.committed_rev(doc_id).await?;
        if base_rev > current_rev {
            return Err(Error::ClientAheadOfServer { base_rev, current_rev });
        }

        let batch_id = incoming[0].batch_id.clone();

        // Step 1: idempotency filter against changes already committed
        // from `baseRev` onward (covers both a plain retry and a batch
        // partially committed by a previous, interrupted attempt). This
        // runs before the already-exists check below so that retrying an
        // initial change that already landed is a silent no-op, not an
        // error.
        let already_committed = self.store.changes_in_range(doc_id, base_rev, None).await?;
        let already_committed_ids: HashSet<&str> = already_committed.iter().map(|c| c.id.as_str()).collect();
        let incoming: Vec<Change> = incoming.into_iter().filter(|c| !already_committed_ids.contains(c.id.as_str())).collect();
        if incoming.is_empty() {
            return Ok(Vec::new());
        }

        if base_rev == 0 && current_rev > 0 && batch_id.is_none() {
            return Err(Error::DocAlreadyExists { doc_id: doc_id.clone() });
        }

        // Step 2: collapse an offline session into one change per session
        // before transforming, so the committed log reads as a handful of
        // coherent edits rather than a flood of micro-ops. Only triggered
        // when the batch actually looks offline: some change's `createdAt`
        // already lags `now` by more than the timeout, or the whole batch
        // shares a `batchId` (an initial multi-batch upload). An ordinary
        // online batch (e.g. one split across changes by `maxPayloadBytes`)
        // must pass through untouched, or the server response can no
        // longer be matched id-for-id against the client's pending queue.
        let collapse_trigger = incoming.iter().any(|c| now.saturating_sub(c.created_at) >= self.config.session_timeout_millis)
            || (batch_id.is_some() && incoming.iter().all(|c| c.batch_id == batch_id));
        let collapsed: Vec<(Change, Option<String>)> = if collapse_trigger {
            let sessions = split_into_sessions(&incoming, self.config.session_timeout_millis);
            sessions
                .into_iter()
                .map(|session| {
                    let group_id = batch_id.clone().unwrap_or_else(crate::ids::new_change_id);
                    (collapse_session(session, batch_id.clone()), Some(group_id))
                })
                .collect()
        } else {
            incoming.into_iter().map(|change| (change, None)).collect()
        };

        // Step 3: transform each collapsed change against every change
        // committed since `baseRev` that did not originate from this same
        // batch (a multi-batch initial upload must not transform against
        // its own earlier batches, which share `baseRev == 0`).
        let committed_ops: Vec<_> = already_committed
            .iter()
            .filter(|c| batch_id.is_none() || c.batch_id != batch_id)
            .flat_map(|c| c.ops.iter().cloned())
            .collect();
        // `state` must start at the current tip (base + every concurrent
        // committed op), not merely at `baseRev`, so that the ops applied
        // below land on the same document the rebased ops are transformed
        // against.
        let (state_at_base, _) = self.get_doc(doc_id, Some(base_rev)).await?;
        let mut state = apply(&state_at_base, &committed_ops, ApplyOptions::default())?;

        let mut next_rev = current_rev;
        let mut to_commit = Vec::with_capacity(collapsed.len());
        // Parallel to `to_commit`: the offline session's groupId and the
        // materialized state right after that change, used to save one
        // `VersionMetadata{origin: offline}` per session below.
        let mut offline_versions: Vec<(String, serde_json::Value)> = Vec::new();
        for (change, group_id) in collapsed {
            let rebased_ops = match transform_patch(&committed_ops, &change.ops) {
                Ok(ops) => ops,
                Err(e) => {
                    tracing::warn!(doc_id = %doc_id, change_id = %change.id, error = %e, "dropping change that failed to transform");
                    continue;
                }
            };
            if rebased_ops.is_empty() {
                continue;
            }
            state = match apply(&state, &rebased_ops, ApplyOptions::default()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(doc_id = %doc_id, change_id = %change.id, error = %e, "dropping change that failed to apply");
                    continue;
                }
            };
            next_rev += 1;
            let mut committed = change;
            committed.ops = rebased_ops;
            committed.base_rev = current_rev;
            committed.rev = next_rev;
            committed.committed_at = now;
            if let Some(group_id) = group_id {
                offline_versions.push((group_id, state.clone()));
            }
            to_commit.push(committed);
        }

        if to_commit.is_empty() {
            return Ok(Vec::new());
        }

        // Step 4: cut a session boundary if the gap since the previous
        // committed change exceeds the timeout, before appending.
        if let Some(prev) = self.store.last_change(doc_id).await? {
            if now.saturating_sub(prev.created_at) >= self.config.session_timeout_millis {
                self.cut_version(doc_id, VersionOrigin::Main, now).await?;
            }
        }

        self.store.append_changes(doc_id, &to_commit).await?;

        // Step 2 (cont'd): one `VersionMetadata{origin: offline}` per
        // collapsed session, spanning exactly the single rev that session's
        // folded change was assigned.
        for ((group_id, state_after), committed) in offline_versions.into_iter().zip(to_commit.iter()) {
            let metadata = VersionMetadata {
                id: crate::ids::new_change_id(),
                origin: VersionOrigin::Offline,
                started_at: committed.created_at,
                ended_at: committed.committed_at,
                start_rev: committed.rev - 1,
                end_rev: committed.rev,
                group_id: Some(group_id),
                parent_id: None,
                branch_name: None,
                name: None,
            };
            self.store
                .save_version(doc_id, Version { doc_id: doc_id.clone(), metadata, state: state_after, changes: vec![committed.clone()] })
                .await?;
        }

        Ok(to_commit)
    }

    /// Materialize a [`Version`] covering everything committed since the
    /// last version (or since the beginning), and persist it.
    async fn cut_version(&self, doc_id: &DocId, origin: VersionOrigin, now: Timestamp) -> Result<()> {
        let previous = self.store.latest_version(doc_id, None).await?;
        let start_rev = previous.as_ref().map(|v| v.metadata.end_rev).unwrap_or(0);
        let (state, end_rev) = self.get_doc(doc_id, None).await?;
        if end_rev <= start_rev {
            return Ok(());
        }
        let changes = self.store.changes_in_range(doc_id, start_rev, Some(end_rev)).await?;
        let started_at = changes.first().map(|c| c.created_at).unwrap_or(now);
        let metadata = VersionMetadata {
            id: crate::ids::new_change_id(),
            origin,
            started_at,
            ended_at: now,
            start_rev,
            end_rev,
            group_id: None,
            parent_id: previous.map(|v| v.metadata.id),
            branch_name: None,
            name: None,
        };
        self.store.save_version(doc_id, Version { doc_id: doc_id.clone(), metadata, state, changes }).await
    }
}

/// Partition a batch into contiguous runs where the gap between one
/// change's `createdAt` and the next exceeds `timeout_millis`. A single
/// run (the common case: an online client submitting promptly) is
/// returned as one group.
fn split_into_sessions(changes: &[Change], timeout_millis: u64) -> Vec<Vec<Change>> {
    let mut sessions: Vec<Vec<Change>> = Vec::new();
    for change in changes {
        match sessions.last_mut() {
            Some(current) => {
                let prev_created_at = current.last().expect("session is never empty").created_at;
                if change.created_at.saturating_sub(prev_created_at) >= timeout_millis {
                    sessions.push(vec![change.clone()]);
                } else {
                    current.push(change.clone());
                }
            }
            None => sessions.push(vec![change.clone()]),
        }
    }
    sessions
}

/// Fold one session's changes into a single change (compose their ops in
/// order), keeping the first change's id/createdAt/baseRev as the
/// representative record.
fn collapse_session(session: Vec<Change>, batch_id: Option<String>) -> Change {
    let mut iter = session.into_iter();
    let mut head = iter.next().expect("session is never empty");
    let mut composed = head.ops.clone();
    for change in iter {
        composed = crate::patch::compose(&composed, &change.ops);
    }
    head.ops = composed;
    head.batch_id = batch_id;
    head
}

/// In-memory [`OtServerStore`] reference implementation, used by unit
/// and integration tests in place of the Postgres-backed store.
#[derive(Default)]
pub struct InMemoryOtServerStore {
    inner: std::sync::Mutex<InMemoryOtServerStoreInner>,
}

#[derive(Default)]
struct InMemoryOtServerStoreInner {
    changes: HashMap<DocId, Vec<Change>>,
    versions: HashMap<DocId, Vec<Version>>,
    deleted: HashMap<DocId, bool>,
    branches: HashMap<String, Branch>,
}

impl InMemoryOtServerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OtServerStore for InMemoryOtServerStore {
    async fn committed_rev(&self, doc_id: &DocId) -> Result<Rev> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.changes.get(doc_id).and_then(|c| c.last()).map(|c| c.rev).unwrap_or(0))
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

    async fn last_change(&self, doc_id: &DocId) -> Result<Option<Change>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.changes.get(doc_id).and_then(|c| c.last()).cloned())
    }

    async fn changes_in_range(&self, doc_id: &DocId, after_rev: Rev, up_to_rev: Option<Rev>) -> Result<Vec<Change>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .changes
            .get(doc_id)
            .map(|changes| {
                changes
                    .iter()
                    .filter(|c| c.rev > after_rev && up_to_rev.map(|cap| c.rev <= cap).unwrap_or(true))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn append_changes(&self, doc_id: &DocId, changes: &[Change]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.changes.entry(doc_id.clone()).or_default().extend(changes.iter().cloned());
        Ok(())
    }

    async fn latest_version(&self, doc_id: &DocId, at_rev: Option<Rev>) -> Result<Option<Version>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .versions
            .get(doc_id)
            .and_then(|versions| {
                versions
                    .iter()
                    .filter(|v| at_rev.map(|cap| v.metadata.end_rev <= cap).unwrap_or(true))
                    .max_by_key(|v| v.metadata.end_rev)
            })
            .cloned())
    }

    async fn save_version(&self, doc_id: &DocId, version: Version) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.versions.entry(doc_id.clone()).or_default().push(version);
        Ok(())
    }

    async fn versions(&self, doc_id: &DocId) -> Result<Vec<Version>> {
        let inner = self.inner.lock().unwrap();
        let mut versions = inner.versions.get(doc_id).cloned().unwrap_or_default();
        versions.sort_by_key(|v| v.metadata.end_rev);
        Ok(versions)
    }

    async fn branch(&self, branch_id: &str) -> Result<Option<Branch>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.branches.get(branch_id).cloned())
    }

    async fn save_branch(&self, branch: &Branch) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.branches.insert(branch.id.clone(), branch.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::JsonPatchOp;
    use serde_json::json;

    fn coordinator() -> OtCoordinator<InMemoryOtServerStore> {
        OtCoordinator::new(InMemoryOtServerStore::new(), OtCoordinatorConfig::default())
    }

    #[tokio::test]
    async fn first_commit_on_empty_doc_is_assigned_rev_one() {
        let coord = coordinator();
        let doc_id: DocId = "d1".into();
        let change = Change::pending("c1".into(), vec![JsonPatchOp::add("/title", json!("Hello"))], 0, 1000);
        let committed = coord.commit_changes(&doc_id, vec![change], 1000).await.unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].rev, 1);
        let (state, rev) = coord.get_doc(&doc_id, None).await.unwrap();
        assert_eq!(state, json!({"title": "Hello"}));
        assert_eq!(rev, 1);
    }

    #[tokio::test]
    async fn client_ahead_of_server_is_rejected() {
        let coord = coordinator();
        let doc_id: DocId = "d1".into();
        let change = Change::pending("c1".into(), vec![JsonPatchOp::add("/title", json!("Hello"))], 5, 1000);
        let err = coord.commit_changes(&doc_id, vec![change], 1000).await.unwrap_err();
        assert!(matches!(err, Error::ClientAheadOfServer { base_rev: 5, current_rev: 0 }));
    }

    #[tokio::test]
    async fn concurrent_edits_on_different_fields_both_survive() {
        let coord = coordinator();
        let doc_id: DocId = "d1".into();
        let init = Change::pending("c0".into(), vec![JsonPatchOp::add("", json!({"title": "A", "count": 0}))], 0, 1000);
        coord.commit_changes(&doc_id, vec![init], 1000).await.unwrap();

        let a = Change::pending("ca".into(), vec![JsonPatchOp::replace("/title", json!("B"))], 1, 2000);
        let b = Change::pending("cb".into(), vec![JsonPatchOp::inc("/count", 1.0)], 1, 2000);
        coord.commit_changes(&doc_id, vec![a], 2000).await.unwrap();
        let committed_b = coord.commit_changes(&doc_id, vec![b], 2000).await.unwrap();
        assert_eq!(committed_b[0].rev, 3);

        let (state, _) = coord.get_doc(&doc_id, None).await.unwrap();
        assert_eq!(state["title"], json!("B"));
        assert_eq!(state["count"], json!(1.0));
    }

    #[tokio::test]
    async fn retrying_an_already_committed_change_is_a_no_op() {
        let coord = coordinator();
        let doc_id: DocId = "d1".into();
        let change = Change::pending("c1".into(), vec![JsonPatchOp::add("/title", json!("Hello"))], 0, 1000);
        coord.commit_changes(&doc_id, vec![change.clone()], 1000).await.unwrap();
        let retried = coord.commit_changes(&doc_id, vec![change], 1000).await.unwrap();
        assert!(retried.is_empty());
    }

    #[tokio::test]
    async fn get_doc_at_rev_reconstructs_historical_state() {
        let coord = coordinator();
        let doc_id: DocId = "d1".into();
        let c1 = Change::pending("c1".into(), vec![JsonPatchOp::add("/title", json!("A"))], 0, 1000);
        coord.commit_changes(&doc_id, vec![c1], 1000).await.unwrap();
        let c2 = Change::pending("c2".into(), vec![JsonPatchOp::replace("/title", json!("B"))], 1, 2000);
        coord.commit_changes(&doc_id, vec![c2], 2000).await.unwrap();

        let (state_at_1, rev) = coord.get_doc(&doc_id, Some(1)).await.unwrap();
        assert_eq!(state_at_1["title"], json!("A"));
        assert_eq!(rev, 1);
    }

    #[tokio::test]
    async fn offline_batch_past_timeout_collapses_into_one_change_with_offline_version() {
        let coord = coordinator();
        let doc_id: DocId = "d1".into();
        let init = Change::pending("c0".into(), vec![JsonPatchOp::add("", json!({"title": "A"}))], 0, 1000);
        coord.commit_changes(&doc_id, vec![init], 1000).await.unwrap();

        let timeout = OtCoordinatorConfig::default().session_timeout_millis;
        let offline_base = 2_000u64;
        let c1 = Change::pending("c1".into(), vec![JsonPatchOp::replace("/title", json!("B"))], 1, offline_base);
        let c2 = Change::pending("c2".into(), vec![JsonPatchOp::replace("/title", json!("C"))], 1, offline_base + 1_000);
        // Both changes are older than `session_timeout_millis` relative to
        // `now` (the reconnect time), so the whole batch is an offline
        // session even though the two changes themselves are 1s apart.
        let now = offline_base + timeout + 5_000;

        let committed = coord.commit_changes(&doc_id, vec![c1, c2], now).await.unwrap();
        assert_eq!(committed.len(), 1, "the two-change offline session collapses into a single committed change");
        assert_eq!(committed[0].rev, 2);

        let versions = coord.store().versions(&doc_id).await.unwrap();
        let offline: Vec<_> = versions.iter().filter(|v| v.metadata.origin == VersionOrigin::Offline).collect();
        assert_eq!(offline.len(), 1, "exactly one offline VersionMetadata is created for the collapsed session");
        assert_eq!(offline[0].metadata.start_rev, 1);
        assert_eq!(offline[0].metadata.end_rev, 2);
        assert!(offline[0].metadata.group_id.is_some());
    }

    #[tokio::test]
    async fn online_split_batch_is_not_collapsed() {
        let coord = coordinator();
        let doc_id: DocId = "d1".into();
        let init = Change::pending("c0".into(), vec![JsonPatchOp::add("", json!({"title": "A", "count": 0}))], 0, 1000);
        coord.commit_changes(&doc_id, vec![init], 1000).await.unwrap();

        // A batch produced by splitting one oversized change across
        // `maxPayloadBytes` (§4.2): both halves share `baseRev`, arrive
        // promptly, and carry no `batchId`, so this must pass through
        // untouched rather than fold into one change.
        let c1 = Change::pending("c1".into(), vec![JsonPatchOp::replace("/title", json!("B"))], 1, 2000);
        let c2 = Change::pending("c2".into(), vec![JsonPatchOp::inc("/count", 1.0)], 1, 2000);

        let committed = coord.commit_changes(&doc_id, vec![c1, c2], 2000).await.unwrap();
        assert_eq!(committed.len(), 2, "an online split batch keeps one committed change per input change");
        assert_eq!(committed[0].id, "c1");
        assert_eq!(committed[1].id, "c2");
        assert_eq!(committed[0].rev, 2);
        assert_eq!(committed[1].rev, 3);

        let versions = coord.store().versions(&doc_id).await.unwrap();
        assert!(versions.iter().all(|v| v.metadata.origin != VersionOrigin::Offline));
    }

    #[tokio::test]
    async fn batch_id_without_timeout_gap_still_collapses() {
        let coord = coordinator();
        let doc_id: DocId = "d1".into();
        let init = Change::pending("c0".into(), vec![JsonPatchOp::add("", json!({"title": "A"}))], 0, 1000);
        coord.commit_changes(&doc_id, vec![init], 1000).await.unwrap();

        let c1 = Change::pending("c1".into(), vec![JsonPatchOp::replace("/title", json!("B"))], 1, 2000).with_batch_id("upload-1");
        let c2 = Change::pending("c2".into(), vec![JsonPatchOp::replace("/title", json!("C"))], 1, 2100).with_batch_id("upload-1");

        let committed = coord.commit_changes(&doc_id, vec![c1, c2], 2200).await.unwrap();
        assert_eq!(committed.len(), 1, "changes that all share a batchId collapse even with no timeout gap");

        let versions = coord.store().versions(&doc_id).await.unwrap();
        let offline: Vec<_> = versions.iter().filter(|v| v.metadata.origin == VersionOrigin::Offline).collect();
        assert_eq!(offline.len(), 1);
        assert_eq!(offline[0].metadata.group_id.as_deref(), Some("upload-1"));
    }
}
