//! Branch Manager (§4.7): fork a document at a revision into an
//! independent branch document, then later merge its history back —
//! fast-forward when the source hasn't moved since the fork point,
//! flatten-and-transform when it has. Driven against an
//! [`OtServerStore`] the same way [`OtCoordinator`] is; the two share a
//! store because merging is, underneath, just another `commitChanges`
//! call onto the source document.

use std::collections::HashMap;

use crate::branch::{Branch, BranchStatus};
use crate::change::Change;
use crate::error::{Error, Result};
use crate::ids::{new_change_id, new_doc_id};
use crate::ot::{OtCoordinator, OtServerStore};
use crate::patch::{compose, JsonPatchOp};
use crate::version::{Version, VersionOrigin};
use crate::{DocId, Rev, Timestamp};

pub struct BranchManager<S: OtServerStore> {
    coordinator: OtCoordinator<S>,
}

impl<S: OtServerStore> BranchManager<S> {
    pub fn new(coordinator: OtCoordinator<S>) -> Self {
        BranchManager { coordinator }
    }

    pub fn coordinator(&self) -> &OtCoordinator<S> {
        &self.coordinator
    }

    /// Fork `source_doc_id` at `branched_at_rev` into a new, independent
    /// document that starts life as a copy of the source's state there.
    /// Rejects forking a document that is itself already a branch.
    pub async fn create_branch(
        &self,
        source_doc_id: &DocId,
        branched_at_rev: Rev,
        name: Option<String>,
        now: Timestamp,
    ) -> Result<Branch> {
        if self.coordinator.store().branch(source_doc_id).await?.is_some() {
            return Err(Error::BranchOfBranch { doc_id: source_doc_id.clone() });
        }

        let (state, actual_rev) = self.coordinator.get_doc(source_doc_id, Some(branched_at_rev)).await?;
        let branch_doc_id = new_doc_id();
        let seed = Change {
            id: new_change_id(),
            ops: vec![JsonPatchOp::add("", state)],
            rev: 1,
            base_rev: 0,
            created_at: now,
            committed_at: now,
            metadata: None,
            batch_id: None,
        };
        self.coordinator.store().append_changes(&branch_doc_id, &[seed]).await?;

        let mut branch = Branch::open(branch_doc_id, source_doc_id.clone(), actual_rev, now);
        if let Some(name) = name {
            branch = branch.with_update(Some(name), None);
        }
        self.coordinator.store().save_branch(&branch).await?;
        Ok(branch)
    }

    pub async fn update_branch(
        &self,
        branch_id: &str,
        name: Option<String>,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> Result<Branch> {
        let branch = self.require_branch(branch_id).await?;
        let updated = branch.with_update(name, metadata);
        self.coordinator.store().save_branch(&updated).await?;
        Ok(updated)
    }

    /// Terminally close a branch without merging (e.g. the edits were
    /// abandoned).
    pub async fn close_branch(&self, branch_id: &str, status: BranchStatus) -> Result<Branch> {
        let branch = self.require_branch(branch_id).await?;
        let closed = branch.close(status)?;
        self.coordinator.store().save_branch(&closed).await?;
        Ok(closed)
    }

    /// Merge an open branch's edits back onto its source document and
    /// close it as `Merged`. Returns the changes committed onto the
    /// source (empty if the branch had no edits beyond its fork point).
    pub async fn merge_branch(&self, branch_id: &str, now: Timestamp) -> Result<Vec<Change>> {
        let branch = self.require_branch(branch_id).await?;
        branch.require_open()?;

        // Skip the synthetic seed change (rev 1): it only restates the
        // state the source already had at the fork point.
        let edits: Vec<Change> = self.coordinator.get_changes_since(&branch.id, 0).await?.into_iter().skip(1).collect();

        let merged = if edits.is_empty() {
            Vec::new()
        } else {
            let source_rev = self.coordinator.store().committed_rev(&branch.doc_id).await?;
            if source_rev == branch.branched_at_rev {
                let out = self.fast_forward_merge(&branch, edits, now).await?;
                self.copy_branch_versions(&branch, VersionOrigin::Main).await?;
                out
            } else {
                let out = self.flatten_merge(&branch, edits, now).await?;
                self.copy_branch_versions(&branch, VersionOrigin::Branch).await?;
                out
            }
        };

        let closed = branch.close(BranchStatus::Merged)?;
        self.coordinator.store().save_branch(&closed).await?;
        Ok(merged)
    }

    /// Copy every `origin: main` version recorded on the branch document
    /// onto the source, tagged with `origin` (the merge kind decides
    /// whether that's `Main` for a fast-forward or `Branch` for a
    /// divergent merge), `groupId = branch.id`, and `parentId` chained
    /// across the copies so the source's version history still reads as
    /// a single lineage through the merge.
    async fn copy_branch_versions(&self, branch: &Branch, origin: VersionOrigin) -> Result<()> {
        let branch_versions: Vec<Version> =
            self.coordinator.store().versions(&branch.id).await?.into_iter().filter(|v| v.metadata.origin == VersionOrigin::Main).collect();

        let mut parent_id = self.coordinator.store().latest_version(&branch.doc_id, None).await?.map(|v| v.metadata.id);
        for version in branch_versions {
            let mut metadata = version.metadata;
            metadata.id = new_change_id();
            metadata.origin = origin;
            metadata.group_id = Some(branch.id.clone());
            metadata.parent_id = parent_id.take();
            parent_id = Some(metadata.id.clone());
            self.coordinator
                .store()
                .save_version(&branch.doc_id, Version { doc_id: branch.doc_id.clone(), metadata, state: version.state, changes: version.changes })
                .await?;
        }
        Ok(())
    }

    /// The source hasn't moved since the fork: replay the branch's own
    /// changes onto it one at a time, preserving their individual
    /// boundaries in the source's history. Each one transforms against
    /// nothing (no source-side commits happened in between), so this is
    /// a pure append.
    async fn fast_forward_merge(&self, branch: &Branch, edits: Vec<Change>, now: Timestamp) -> Result<Vec<Change>> {
        let mut committed = Vec::with_capacity(edits.len());
        for edit in edits {
            let base_rev = self.coordinator.store().committed_rev(&branch.doc_id).await?;
            let pending = Change::pending(new_change_id(), edit.ops, base_rev, edit.created_at).with_batch_id(branch.id.clone());
            committed.extend(self.coordinator.commit_changes(&branch.doc_id, vec![pending], now).await?);
        }
        Ok(committed)
    }

    /// The source diverged: compose the branch's whole edit history into
    /// one change and commit it at the fork's `baseRev`, letting the
    /// coordinator's ordinary transform step rebase it against whatever
    /// the source committed since then.
    async fn flatten_merge(&self, branch: &Branch, edits: Vec<Change>, now: Timestamp) -> Result<Vec<Change>> {
        let mut composed: Vec<JsonPatchOp> = Vec::new();
        for edit in &edits {
            composed = compose(&composed, &edit.ops);
        }
        let created_at = edits.first().map(|c| c.created_at).unwrap_or(now);
        let flattened = Change::pending(new_change_id(), composed, branch.branched_at_rev, created_at).with_batch_id(branch.id.clone());
        self.coordinator.commit_changes(&branch.doc_id, vec![flattened], now).await
    }

    async fn require_branch(&self, branch_id: &str) -> Result<Branch> {
        self.coordinator
            .store()
            .branch(branch_id)
            .await?
            .ok_or_else(|| Error::BranchNotFound { branch_id: branch_id.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ot::{InMemoryOtServerStore, OtCoordinatorConfig};
    use serde_json::json;

    fn manager() -> BranchManager<InMemoryOtServerStore> {
        BranchManager::new(OtCoordinator::new(InMemoryOtServerStore::new(), OtCoordinatorConfig::default()))
    }

    fn manager_with_timeout(session_timeout_millis: u64) -> BranchManager<InMemoryOtServerStore> {
        BranchManager::new(OtCoordinator::new(InMemoryOtServerStore::new(), OtCoordinatorConfig { session_timeout_millis }))
    }

    async fn seed_doc(manager: &BranchManager<InMemoryOtServerStore>, doc_id: &DocId) {
        let init = Change::pending("c0".into(), vec![JsonPatchOp::add("", json!({"title": "A", "count": 0}))], 0, 1000);
        manager.coordinator().commit_changes(doc_id, vec![init], 1000).await.unwrap();
    }

    #[tokio::test]
    async fn create_branch_copies_state_at_fork_point() {
        let manager = manager();
        let doc_id: DocId = "src1".into();
        seed_doc(&manager, &doc_id).await;

        let branch = manager.create_branch(&doc_id, 1, Some("feature".into()), 2000).await.unwrap();
        assert_eq!(branch.status, BranchStatus::Open);
        assert_eq!(branch.branched_at_rev, 1);

        let (state, _) = manager.coordinator().get_doc(&branch.id, None).await.unwrap();
        assert_eq!(state["title"], json!("A"));
    }

    #[tokio::test]
    async fn branching_a_branch_is_rejected() {
        let manager = manager();
        let doc_id: DocId = "src1".into();
        seed_doc(&manager, &doc_id).await;
        let branch = manager.create_branch(&doc_id, 1, None, 2000).await.unwrap();
        let err = manager.create_branch(&branch.id, 1, None, 3000).await.unwrap_err();
        assert!(matches!(err, Error::BranchOfBranch { .. }));
    }

    #[tokio::test]
    async fn fast_forward_merge_applies_branch_edits_onto_untouched_source() {
        let manager = manager();
        let doc_id: DocId = "src1".into();
        seed_doc(&manager, &doc_id).await;
        let branch = manager.create_branch(&doc_id, 1, None, 2000).await.unwrap();

        let edit = Change::pending("e1".into(), vec![JsonPatchOp::replace("/title", json!("B"))], 1, 2500);
        manager.coordinator().commit_changes(&branch.id, vec![edit], 2500).await.unwrap();

        let merged = manager.merge_branch(&branch.id, 3000).await.unwrap();
        assert_eq!(merged.len(), 1);

        let (state, _) = manager.coordinator().get_doc(&doc_id, None).await.unwrap();
        assert_eq!(state["title"], json!("B"));

        let closed = manager.coordinator().store().branch(&branch.id).await.unwrap().unwrap();
        assert_eq!(closed.status, BranchStatus::Merged);
    }

    #[tokio::test]
    async fn flatten_merge_transforms_branch_edits_against_diverged_source() {
        let manager = manager();
        let doc_id: DocId = "src1".into();
        seed_doc(&manager, &doc_id).await;
        let branch = manager.create_branch(&doc_id, 1, None, 2000).await.unwrap();

        // Source moves on after the fork.
        let source_edit = Change::pending("s1".into(), vec![JsonPatchOp::inc("/count", 1.0)], 1, 2100);
        manager.coordinator().commit_changes(&doc_id, vec![source_edit], 2100).await.unwrap();

        // Branch edits a disjoint field.
        let branch_edit = Change::pending("b1".into(), vec![JsonPatchOp::replace("/title", json!("B"))], 1, 2200);
        manager.coordinator().commit_changes(&branch.id, vec![branch_edit], 2200).await.unwrap();

        manager.merge_branch(&branch.id, 3000).await.unwrap();

        let (state, _) = manager.coordinator().get_doc(&doc_id, None).await.unwrap();
        assert_eq!(state["title"], json!("B"));
        assert_eq!(state["count"], json!(1.0));
    }

    #[tokio::test]
    async fn fast_forward_merge_copies_branch_main_versions_onto_source() {
        // A short session timeout so the gap before `e2` cuts a single
        // `Main`-origin version covering the branch's seed and `e1`.
        // `now` values throughout are kept within the 100ms timeout of
        // whatever they follow except where a cut is deliberately forced,
        // so the only extra version on the source comes from the copy.
        let manager = manager_with_timeout(100);
        let doc_id: DocId = "src1".into();
        seed_doc(&manager, &doc_id).await;
        let branch = manager.create_branch(&doc_id, 1, None, 2000).await.unwrap();

        let e1 = Change::pending("e1".into(), vec![JsonPatchOp::replace("/title", json!("B"))], 1, 2050);
        manager.coordinator().commit_changes(&branch.id, vec![e1], 2050).await.unwrap();
        let e2 = Change::pending("e2".into(), vec![JsonPatchOp::replace("/title", json!("C"))], 2, 10_000);
        manager.coordinator().commit_changes(&branch.id, vec![e2], 10_000).await.unwrap();

        assert_eq!(manager.coordinator().store().versions(&branch.id).await.unwrap().len(), 1, "branch doc should have exactly one cut version to copy");

        manager.merge_branch(&branch.id, 1060).await.unwrap();

        let source_versions = manager.coordinator().store().versions(&doc_id).await.unwrap();
        assert_eq!(source_versions.len(), 1, "the branch's main version must be copied onto the source");
        assert_eq!(source_versions[0].metadata.origin, VersionOrigin::Main);
        assert_eq!(source_versions[0].metadata.group_id.as_deref(), Some(branch.id.as_str()));
    }

    #[tokio::test]
    async fn flatten_merge_copies_branch_main_versions_tagged_as_branch_origin() {
        let manager = manager_with_timeout(100);
        let doc_id: DocId = "src1".into();
        seed_doc(&manager, &doc_id).await;
        let branch = manager.create_branch(&doc_id, 1, None, 2000).await.unwrap();

        let e1 = Change::pending("e1".into(), vec![JsonPatchOp::replace("/title", json!("B"))], 1, 2050);
        manager.coordinator().commit_changes(&branch.id, vec![e1], 2050).await.unwrap();
        let e2 = Change::pending("e2".into(), vec![JsonPatchOp::replace("/title", json!("C"))], 2, 10_000);
        manager.coordinator().commit_changes(&branch.id, vec![e2], 10_000).await.unwrap();

        // Source diverges (within the timeout window so it doesn't cut
        // its own version) so the merge takes the flatten path.
        let source_edit = Change::pending("s1".into(), vec![JsonPatchOp::inc("/count", 1.0)], 1, 1050);
        manager.coordinator().commit_changes(&doc_id, vec![source_edit], 1050).await.unwrap();

        manager.merge_branch(&branch.id, 1060).await.unwrap();

        let source_versions = manager.coordinator().store().versions(&doc_id).await.unwrap();
        assert_eq!(source_versions.len(), 1);
        assert_eq!(source_versions[0].metadata.origin, VersionOrigin::Branch);
    }

    #[tokio::test]
    async fn merging_a_closed_branch_is_rejected() {
        let manager = manager();
        let doc_id: DocId = "src1".into();
        seed_doc(&manager, &doc_id).await;
        let branch = manager.create_branch(&doc_id, 1, None, 2000).await.unwrap();
        manager.close_branch(&branch.id, BranchStatus::Closed).await.unwrap();
        let err = manager.merge_branch(&branch.id, 3000).await.unwrap_err();
        assert!(matches!(err, Error::BranchNotOpen { .. }));
    }
}
