//! Per-document async locking, shared by the client Sync Controller and
//! the server coordinators. Follows the same "keyed by an identifier,
//! shared via `Arc`, backed by `DashMap`" texture as the connection
//! registry this crate's sibling server crate uses for WebSocket
//! connections.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::DocId;

/// A registry of per-document async mutexes. Operations that mutate a
/// document's pending/sending/committed state acquire the lock for that
/// `DocId` and release it on every exit path, including early returns on
/// error — `tokio::sync::Mutex`'s RAII guard gives us that for free.
///
/// There is no busy-wait: `lock_doc` suspends the calling task until the
/// lock is free rather than polling.
#[derive(Debug, Default)]
pub struct DocLock {
    locks: DashMap<DocId, Arc<Mutex<()>>>,
}

impl DocLock {
    pub fn new() -> Self {
        DocLock { locks: DashMap::new() }
    }

    fn entry(&self, doc_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(doc_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire the per-document lock, suspending until it is available.
    /// The returned guard holds the lock for as long as it is alive.
    pub async fn lock_doc(&self, doc_id: &str) -> DocLockGuard {
        let mutex = self.entry(doc_id);
        DocLockGuard(mutex.lock_owned().await)
    }
}

/// Holds a document's lock for the lifetime of the guard.
pub struct DocLockGuard(OwnedMutexGuard<()>);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn serializes_concurrent_operations_on_the_same_doc() {
        let lock = Arc::new(DocLock::new());
        let counter = Arc::new(AtomicU32::new(0));
        let mut handles = Vec::new();
        for _ in 0..10 {
            let lock = lock.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                let _guard = lock.lock_doc("d1").await;
                let before = counter.load(Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1)).await;
                counter.store(before + 1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn different_docs_do_not_contend() {
        let lock = DocLock::new();
        let g1 = lock.lock_doc("a").await;
        let g2 = lock.lock_doc("b").await;
        drop(g1);
        drop(g2);
    }
}
