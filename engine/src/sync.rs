//! Sync Controller (§4.6): connects a transport to the client algorithms.
//! Transport-agnostic — it is driven by whatever implements [`Transport`],
//! whether that is a WebSocket client, an HTTP polling loop, or (in
//! tests) an in-memory stub.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::change::Change;
use crate::error::Result;
use crate::lww::{LwwClientAlgorithm, LwwClientStore};
use crate::ot::{Doc, OtClientAlgorithm, OtClientStore};
use crate::{DocId, Timestamp};

/// Transport-level connection state. Independent of per-doc `syncing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Per-doc sync progress, surfaced to callers so UIs can show spinners
/// and errors without polling the store directly.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncState {
    Idle,
    Initial,
    Updating,
    Error(String),
}

/// The four RPCs of §6 plus subscribe/unsubscribe. `notify` is not a
/// method here: it arrives from the server asynchronously and is handed
/// to [`SyncController::handle_changes_committed`] /
/// [`SyncController::handle_doc_deleted`] by whatever drives the
/// transport's receive loop.
pub trait Transport: Send + Sync {
    fn get_doc(&self, doc_id: &DocId, at_rev: Option<crate::Rev>) -> impl std::future::Future<Output = Result<(serde_json::Value, crate::Rev)>> + Send;
    fn get_changes_since(&self, doc_id: &DocId, rev: crate::Rev) -> impl std::future::Future<Output = Result<Vec<Change>>> + Send;
    fn commit_changes(&self, doc_id: &DocId, changes: Vec<Change>) -> impl std::future::Future<Output = Result<Vec<Change>>> + Send;
    fn delete_doc(&self, doc_id: &DocId) -> impl std::future::Future<Output = Result<()>> + Send;
    fn subscribe(&self, ids: &[DocId]) -> impl std::future::Future<Output = Result<Vec<DocId>>> + Send;
    fn unsubscribe(&self, ids: &[DocId]) -> impl std::future::Future<Output = Result<Vec<DocId>>> + Send;
}

/// Which algorithm variant a tracked doc uses (§9's sum-type dispatch).
enum TrackedAlgorithm<OS: OtClientStore, LS: LwwClientStore> {
    Ot { algo: OtClientAlgorithm<OS>, doc: Option<Doc> },
    Lww { algo: LwwClientAlgorithm<LS> },
}

struct TrackedDoc<OS: OtClientStore, LS: LwwClientStore> {
    algorithm: TrackedAlgorithm<OS, LS>,
    syncing: SyncState,
    /// Set when this doc was deleted locally (possibly offline) and is
    /// waiting for `deleteDoc` to reach the server.
    tombstoned: bool,
}

/// Drives transport interactions for a set of locally tracked documents.
/// Generic over the transport and over the two client store types so one
/// controller instance can track a mix of OT and LWW documents.
pub struct SyncController<T: Transport, OS: OtClientStore, LS: LwwClientStore> {
    transport: T,
    docs: DashMap<DocId, Arc<Mutex<TrackedDoc<OS, LS>>>>,
    connection: std::sync::Mutex<ConnectionState>,
    online: AtomicBool,
}

impl<T: Transport, OS: OtClientStore, LS: LwwClientStore> SyncController<T, OS, LS> {
    pub fn new(transport: T) -> Self {
        SyncController {
            transport,
            docs: DashMap::new(),
            connection: std::sync::Mutex::new(ConnectionState::Disconnected),
            online: AtomicBool::new(false),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.connection.lock().expect("connection mutex poisoned")
    }

    fn set_connection_state(&self, state: ConnectionState) {
        *self.connection.lock().expect("connection mutex poisoned") = state;
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }

    pub fn track_ot(&self, doc_id: DocId, algo: OtClientAlgorithm<OS>, doc: Option<Doc>) {
        self.docs.insert(
            doc_id,
            Arc::new(Mutex::new(TrackedDoc { algorithm: TrackedAlgorithm::Ot { algo, doc }, syncing: SyncState::Idle, tombstoned: false })),
        );
    }

    pub fn track_lww(&self, doc_id: DocId, algo: LwwClientAlgorithm<LS>) {
        self.docs.insert(
            doc_id,
            Arc::new(Mutex::new(TrackedDoc { algorithm: TrackedAlgorithm::Lww { algo }, syncing: SyncState::Idle, tombstoned: false })),
        );
    }

    pub fn untrack(&self, doc_id: &DocId) {
        self.docs.remove(doc_id);
    }

    pub fn syncing(&self, doc_id: &DocId) -> Option<SyncState> {
        let entry = self.docs.get(doc_id)?;
        let entry = entry.clone();
        entry.try_lock().ok().map(|g| g.syncing.clone())
    }

    fn doc_handle(&self, doc_id: &DocId) -> Option<Arc<Mutex<TrackedDoc<OS, LS>>>> {
        self.docs.get(doc_id).map(|e| e.clone())
    }

    fn tracked_ids(&self) -> Vec<DocId> {
        self.docs.iter().map(|e| e.key().clone()).collect()
    }

    /// Transition to `connecting`, subscribe to every tracked doc, resync
    /// each one, then transition to `connected`. On any failure the
    /// controller drops back to `disconnected`; local queues are
    /// untouched so the next `connect` resumes cleanly.
    pub async fn connect(&self) -> Result<()> {
        self.set_connection_state(ConnectionState::Connecting);
        if let Err(err) = self.resync_all().await {
            self.set_connection_state(ConnectionState::Disconnected);
            return Err(err);
        }
        self.set_connection_state(ConnectionState::Connected);
        Ok(())
    }

    pub fn disconnect(&self) {
        self.set_connection_state(ConnectionState::Disconnected);
    }

    async fn resync_all(&self) -> Result<()> {
        let ids = self.tracked_ids();
        if ids.is_empty() {
            return Ok(());
        }
        self.transport.subscribe(&ids).await?;
        for doc_id in ids {
            self.resync_doc(&doc_id).await?;
        }
        Ok(())
    }

    /// Per-doc resync policy from §4.6: flush if pending exists, else
    /// catch up from the last known rev, else fetch the full doc.
    async fn resync_doc(&self, doc_id: &DocId) -> Result<()> {
        let Some(handle) = self.doc_handle(doc_id) else { return Ok(()) };

        let (has_pending, committed_rev, was_tombstoned) = {
            let guard = handle.lock().await;
            let has_pending = match &guard.algorithm {
                TrackedAlgorithm::Ot { algo, .. } => algo.get_pending_to_send(doc_id)?.is_some(),
                TrackedAlgorithm::Lww { algo } => !algo.store().pending_ops(doc_id)?.is_empty() || algo.store().sending_change(doc_id)?.is_some(),
            };
            let rev = match &guard.algorithm {
                TrackedAlgorithm::Ot { algo, .. } => algo.committed_rev(doc_id)?,
                TrackedAlgorithm::Lww { algo } => algo.committed_rev(doc_id)?,
            };
            (has_pending, rev, guard.tombstoned)
        };

        if was_tombstoned {
            if self.is_online() {
                self.transport.delete_doc(doc_id).await?;
                handle.lock().await.tombstoned = false;
            }
            return Ok(());
        }

        if has_pending {
            self.flush(doc_id).await?;
            return Ok(());
        }

        {
            let mut guard = handle.lock().await;
            guard.syncing = SyncState::Updating;
        }

        if committed_rev > 0 {
            let changes = self.transport.get_changes_since(doc_id, committed_rev).await?;
            self.apply_incoming(doc_id, &handle, &changes).await?;
        } else {
            let (state, rev) = self.transport.get_doc(doc_id, None).await?;
            let mut guard = handle.lock().await;
            if let TrackedAlgorithm::Ot { doc: Some(doc), .. } = &mut guard.algorithm {
                *doc = Doc::new(doc_id.clone(), state, rev);
            }
        }

        handle.lock().await.syncing = SyncState::Idle;
        Ok(())
    }

    /// Batch pending ops and send them. On success, rebase/confirm via
    /// the doc's algorithm. On failure, pending is left intact for the
    /// next connect to retry (we never clear it before the transport
    /// call succeeds).
    pub async fn flush(&self, doc_id: &DocId) -> Result<()> {
        let Some(handle) = self.doc_handle(doc_id) else { return Ok(()) };
        let mut guard = handle.lock().await;
        guard.syncing = SyncState::Updating;

        let to_send: Option<Vec<Change>> = match &guard.algorithm {
            TrackedAlgorithm::Ot { algo, .. } => algo.get_pending_to_send(doc_id)?,
            TrackedAlgorithm::Lww { algo } => {
                let now = now_placeholder();
                algo.get_pending_to_send(doc_id, now)?.map(|c| vec![c])
            }
        };

        let Some(batch) = to_send else {
            guard.syncing = SyncState::Idle;
            return Ok(());
        };

        let result = self.transport.commit_changes(doc_id, batch.clone()).await;
        match result {
            Ok(server_changes) => {
                match &mut guard.algorithm {
                    TrackedAlgorithm::Ot { algo, doc } => {
                        algo.apply_server_changes(doc_id, &server_changes, doc.as_mut())?;
                    }
                    TrackedAlgorithm::Lww { algo } => {
                        // Our own sent change is always exactly one; the
                        // rest of the response (if any) is catch-up from
                        // other clients and is applied, not confirmed. If
                        // none of the response changes carry its id, every
                        // op in it was rejected or resolved to a no-op —
                        // the send still succeeded, so `sendingChange`
                        // must still be cleared rather than retried.
                        if let Some(sent) = batch.first() {
                            match server_changes.iter().find(|c| c.id == sent.id) {
                                Some(confirmed) => algo.confirm_sent(doc_id, confirmed)?,
                                None => algo.clear_sending(doc_id)?,
                            }
                        }
                        for other in server_changes.iter().filter(|c| batch.iter().all(|b| b.id != c.id)) {
                            algo.apply_server_changes(doc_id, other)?;
                        }
                    }
                }
                guard.syncing = SyncState::Idle;
                Ok(())
            }
            Err(err) => {
                guard.syncing = SyncState::Error(err.to_string());
                Err(err)
            }
        }
    }

    /// Apply a `changesCommitted` notify while holding the per-doc lock,
    /// so it cannot interleave with an in-flight flush on the same doc.
    pub async fn handle_changes_committed(&self, doc_id: &DocId, changes: Vec<Change>) -> Result<()> {
        let Some(handle) = self.doc_handle(doc_id) else { return Ok(()) };
        self.apply_incoming(doc_id, &handle, &changes).await
    }

    async fn apply_incoming(&self, doc_id: &DocId, handle: &Arc<Mutex<TrackedDoc<OS, LS>>>, changes: &[Change]) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut guard = handle.lock().await;
        match &mut guard.algorithm {
            TrackedAlgorithm::Ot { algo, doc } => {
                algo.apply_server_changes(doc_id, changes, doc.as_mut())?;
            }
            TrackedAlgorithm::Lww { algo } => {
                for change in changes {
                    algo.apply_server_changes(doc_id, change)?;
                }
            }
        }
        Ok(())
    }

    /// Delete a doc locally. If online, propagate immediately; otherwise
    /// keep a tombstone and propagate on the next `connect`.
    pub async fn delete_doc(&self, doc_id: &DocId) -> Result<()> {
        let Some(handle) = self.doc_handle(doc_id) else { return Ok(()) };
        if self.is_online() {
            self.transport.delete_doc(doc_id).await?;
            handle.lock().await.tombstoned = false;
            self.untrack(doc_id);
        } else {
            handle.lock().await.tombstoned = true;
        }
        Ok(())
    }

    /// `docDeleted` notify handler: another client (or another tab) tore
    /// down the doc server-side.
    pub fn handle_doc_deleted(&self, doc_id: &DocId) {
        self.untrack(doc_id);
    }
}

/// Timestamp source for ops formed inside the controller (stamping LWW
/// sends that lack one). Real callers pass their own clock through
/// `handle_doc_change`; this is only used for the rare case where a
/// flush forms a change from already-stamped pending ops, so any
/// monotonic-enough value works. Kept as a free function so it is the
/// only place in this module that could plausibly need a wall clock.
fn now_placeholder() -> Timestamp {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as Timestamp).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lww::InMemoryLwwClientStore;
    use crate::ot::InMemoryOtClientStore;
    use crate::patch::JsonPatchOp;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    /// A transport stub that behaves like a trivial single-writer server:
    /// it stores one document's state and hands out strictly increasing
    /// revs, with no real transformation (tests here exercise the
    /// controller's state machine, not OT/LWW correctness, which is
    /// covered in `ot`/`lww`/`patch`).
    struct StubTransport {
        state: StdMutex<HashMap<DocId, (serde_json::Value, crate::Rev)>>,
        changes: StdMutex<HashMap<DocId, Vec<Change>>>,
    }

    impl StubTransport {
        fn new() -> Self {
            StubTransport { state: StdMutex::new(HashMap::new()), changes: StdMutex::new(HashMap::new()) }
        }
    }

    impl Transport for StubTransport {
        async fn get_doc(&self, doc_id: &DocId, _at_rev: Option<crate::Rev>) -> Result<(serde_json::Value, crate::Rev)> {
            Ok(self.state.lock().unwrap().get(doc_id).cloned().unwrap_or((json!({}), 0)))
        }

        async fn get_changes_since(&self, doc_id: &DocId, rev: crate::Rev) -> Result<Vec<Change>> {
            Ok(self.changes.lock().unwrap().get(doc_id).cloned().unwrap_or_default().into_iter().filter(|c| c.rev > rev).collect())
        }

        async fn commit_changes(&self, doc_id: &DocId, changes: Vec<Change>) -> Result<Vec<Change>> {
            let mut store = self.changes.lock().unwrap();
            let history = store.entry(doc_id.clone()).or_default();
            let mut next_rev = history.iter().map(|c| c.rev).max().unwrap_or(0);
            let mut committed = Vec::with_capacity(changes.len());
            for change in changes {
                next_rev += 1;
                let done = change.committed(next_rev, next_rev);
                history.push(done.clone());
                committed.push(done);
            }
            Ok(committed)
        }

        async fn delete_doc(&self, doc_id: &DocId) -> Result<()> {
            self.state.lock().unwrap().remove(doc_id);
            Ok(())
        }

        async fn subscribe(&self, ids: &[DocId]) -> Result<Vec<DocId>> {
            Ok(ids.to_vec())
        }

        async fn unsubscribe(&self, ids: &[DocId]) -> Result<Vec<DocId>> {
            Ok(ids.to_vec())
        }
    }

    #[tokio::test]
    async fn connect_with_no_tracked_docs_reaches_connected() {
        let controller = SyncController::<_, InMemoryOtClientStore, InMemoryLwwClientStore>::new(StubTransport::new());
        controller.connect().await.unwrap();
        assert_eq!(controller.connection_state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn flush_sends_pending_ot_change_and_clears_it() {
        let controller = SyncController::<_, InMemoryOtClientStore, InMemoryLwwClientStore>::new(StubTransport::new());
        let doc_id: DocId = "d1".into();
        let mut algo = OtClientAlgorithm::new(InMemoryOtClientStore::new());
        algo.handle_doc_change(&doc_id, vec![JsonPatchOp::replace("/title", json!("World"))], None, 1000).unwrap();
        controller.track_ot(doc_id.clone(), algo, None);

        controller.set_online(true);
        controller.flush(&doc_id).await.unwrap();

        let handle = controller.doc_handle(&doc_id).unwrap();
        let guard = handle.lock().await;
        match &guard.algorithm {
            TrackedAlgorithm::Ot { algo, .. } => {
                assert_eq!(algo.get_pending_to_send(&doc_id).unwrap(), None);
                assert_eq!(algo.committed_rev(&doc_id).unwrap(), 1);
            }
            _ => unreachable!(),
        }
        assert_eq!(guard.syncing, SyncState::Idle);
    }

    #[tokio::test]
    async fn flush_with_nothing_pending_is_a_no_op() {
        let controller = SyncController::<_, InMemoryOtClientStore, InMemoryLwwClientStore>::new(StubTransport::new());
        let doc_id: DocId = "d1".into();
        controller.track_ot(doc_id.clone(), OtClientAlgorithm::new(InMemoryOtClientStore::new()), None);
        controller.flush(&doc_id).await.unwrap();
    }

    /// A transport stub whose `commitChanges` always rejects the submitted
    /// change outright (simulating a server-side LWW self-heal rejection)
    /// and returns no changes at all in response.
    struct RejectingTransport;

    impl Transport for RejectingTransport {
        async fn get_doc(&self, _doc_id: &DocId, _at_rev: Option<crate::Rev>) -> Result<(serde_json::Value, crate::Rev)> {
            Ok((json!({}), 0))
        }
        async fn get_changes_since(&self, _doc_id: &DocId, _rev: crate::Rev) -> Result<Vec<Change>> {
            Ok(Vec::new())
        }
        async fn commit_changes(&self, _doc_id: &DocId, _changes: Vec<Change>) -> Result<Vec<Change>> {
            Ok(Vec::new())
        }
        async fn delete_doc(&self, _doc_id: &DocId) -> Result<()> {
            Ok(())
        }
        async fn subscribe(&self, ids: &[DocId]) -> Result<Vec<DocId>> {
            Ok(ids.to_vec())
        }
        async fn unsubscribe(&self, ids: &[DocId]) -> Result<Vec<DocId>> {
            Ok(ids.to_vec())
        }
    }

    #[tokio::test]
    async fn flush_clears_sending_when_lww_change_is_entirely_rejected() {
        let controller = SyncController::<_, InMemoryOtClientStore, InMemoryLwwClientStore>::new(RejectingTransport);
        let doc_id: DocId = "d1".into();
        let mut algo = LwwClientAlgorithm::new(InMemoryLwwClientStore::new());
        algo.handle_doc_change(&doc_id, vec![JsonPatchOp::replace("/obj/name", json!("Alice"))], 1000).unwrap();
        controller.track_lww(doc_id.clone(), algo);

        controller.set_online(true);
        controller.flush(&doc_id).await.unwrap();

        let handle = controller.doc_handle(&doc_id).unwrap();
        let guard = handle.lock().await;
        match &guard.algorithm {
            TrackedAlgorithm::Lww { algo } => {
                assert_eq!(algo.store().sending_change(&doc_id).unwrap(), None, "must not retry a fully rejected send forever");
            }
            _ => unreachable!(),
        }
        assert_eq!(guard.syncing, SyncState::Idle);
    }

    #[tokio::test]
    async fn handle_changes_committed_applies_broadcast_to_lww_doc() {
        let controller = SyncController::<_, InMemoryOtClientStore, InMemoryLwwClientStore>::new(StubTransport::new());
        let doc_id: DocId = "d1".into();
        controller.track_lww(doc_id.clone(), LwwClientAlgorithm::new(InMemoryLwwClientStore::new()));

        let broadcast = Change::pending("other".into(), vec![JsonPatchOp::replace("/name", json!("Bob"))], 0, 1000).committed(1, 1001);
        controller.handle_changes_committed(&doc_id, vec![broadcast]).await.unwrap();

        let handle = controller.doc_handle(&doc_id).unwrap();
        let guard = handle.lock().await;
        match &guard.algorithm {
            TrackedAlgorithm::Lww { algo } => {
                assert_eq!(algo.store().committed_fields(&doc_id).unwrap()["/name"].value, Some(json!("Bob")));
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn offline_delete_sets_tombstone_without_calling_transport() {
        let controller = SyncController::<_, InMemoryOtClientStore, InMemoryLwwClientStore>::new(StubTransport::new());
        let doc_id: DocId = "d1".into();
        controller.track_ot(doc_id.clone(), OtClientAlgorithm::new(InMemoryOtClientStore::new()), None);
        controller.set_online(false);
        controller.delete_doc(&doc_id).await.unwrap();

        let handle = controller.doc_handle(&doc_id).unwrap();
        assert!(handle.lock().await.tombstoned);
    }
}
