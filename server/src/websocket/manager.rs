//! WebSocket connection manager.
//!
//! Tracks active WebSocket connections, which document ids each one is
//! subscribed to, and broadcasts `notify` messages to the right subset
//! of connections.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::ServerMessage;

/// Sender for WebSocket messages.
pub type MessageSender = mpsc::UnboundedSender<ServerMessage>;

/// A single WebSocket connection.
#[derive(Debug)]
pub struct Connection {
    /// Unique identifier for this connection
    pub id: String,
    /// Channel to send messages to this connection
    pub sender: MessageSender,
}

/// Manages active WebSocket connections and per-doc subscriptions.
///
/// Thread-safe and can be shared across handlers via `Arc`.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    /// All active connections, keyed by connection ID.
    pub(crate) connections: DashMap<String, Connection>,
    /// Doc id -> connection ids subscribed to its `changesCommitted` /
    /// `docDeleted` notifications.
    subscriptions: DashMap<String, Vec<String>>,
    /// Reverse index, used to clean up subscriptions on disconnect.
    subscribed_docs: DashMap<String, Vec<String>>,
}

impl ConnectionManager {
    /// Create a new connection manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new connection manager wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a new connection. Returns the connection ID.
    pub fn register(&self, sender: MessageSender) -> String {
        let conn_id = uuid::Uuid::new_v4().to_string();
        self.connections.insert(conn_id.clone(), Connection { id: conn_id.clone(), sender });
        tracing::info!(conn_id = %conn_id, "WebSocket connection registered");
        conn_id
    }

    /// Unregister a connection and drop every subscription it held.
    pub fn unregister(&self, conn_id: &str) {
        if self.connections.remove(conn_id).is_some() {
            if let Some((_, doc_ids)) = self.subscribed_docs.remove(conn_id) {
                for doc_id in doc_ids {
                    if let Some(mut subs) = self.subscriptions.get_mut(&doc_id) {
                        subs.retain(|id| id != conn_id);
                    }
                }
            }
            tracing::info!(conn_id = %conn_id, "WebSocket connection unregistered");
        }
    }

    /// Subscribe a connection to a set of doc ids. Returns the ids
    /// accepted (all of them — this server has no per-doc authorization
    /// filter, which would hook in here via `subscribeFilter`).
    pub fn subscribe(&self, conn_id: &str, doc_ids: &[String]) -> Vec<String> {
        let mut owned = self.subscribed_docs.entry(conn_id.to_string()).or_default();
        for doc_id in doc_ids {
            self.subscriptions.entry(doc_id.clone()).or_default().push(conn_id.to_string());
            if !owned.contains(doc_id) {
                owned.push(doc_id.clone());
            }
        }
        doc_ids.to_vec()
    }

    pub fn unsubscribe(&self, conn_id: &str, doc_ids: &[String]) -> Vec<String> {
        for doc_id in doc_ids {
            if let Some(mut subs) = self.subscriptions.get_mut(doc_id) {
                subs.retain(|id| id != conn_id);
            }
            if let Some(mut owned) = self.subscribed_docs.get_mut(conn_id) {
                owned.retain(|id| id != doc_id);
            }
        }
        doc_ids.to_vec()
    }

    /// Broadcast a message to every connection subscribed to `doc_id`,
    /// except `sender_conn_id` (the one that caused the commit, which
    /// already has the result from its own RPC response).
    pub fn broadcast_to_doc_except(&self, doc_id: &str, sender_conn_id: Option<&str>, message: ServerMessage) -> usize {
        let Some(subs) = self.subscriptions.get(doc_id) else { return 0 };
        let mut sent = 0;
        for conn_id in subs.iter() {
            if Some(conn_id.as_str()) == sender_conn_id {
                continue;
            }
            if let Some(conn) = self.connections.get(conn_id.as_str()) {
                if conn.sender.send(message.clone()).is_ok() {
                    sent += 1;
                }
            }
        }
        tracing::debug!(doc_id = %doc_id, recipients = sent, "Broadcast notify to subscribers");
        sent
    }

    /// Send a message to a specific connection.
    pub fn send_to(&self, conn_id: &str, message: ServerMessage) {
        if let Some(conn) = self.connections.get(conn_id) {
            let _ = conn.sender.send(message);
        }
    }

    /// Get the number of active connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
