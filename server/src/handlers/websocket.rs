//! WebSocket handler for real-time sync.
//!
//! Handles WebSocket connections and dispatches messages to the same
//! RPC handlers the HTTP routes use, plus subscribe/unsubscribe and the
//! two `notify` pushes.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::websocket::{ClientMessage, ServerMessage};
use crate::AppState;

use super::commit::CommitRequest;
use super::{handle_commit, handle_delete_doc, handle_get_changes_since, handle_get_doc};

/// Handle an established WebSocket connection: register it, forward
/// outgoing messages from its channel, and dispatch incoming messages to
/// the RPC handlers until the socket closes.
pub async fn handle_websocket_connection(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let conn_id = state.conn_manager.register(tx);
    tracing::info!(conn_id = %conn_id, "WebSocket client connected");

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(text) => {
                    if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                        tracing::warn!("Failed to send WebSocket message: {}", e);
                        break;
                    }
                }
                Err(e) => tracing::error!("Failed to serialize WebSocket message: {}", e),
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let response = process_message(&text, &state, &conn_id).await;
                state.conn_manager.send_to(&conn_id, response);
            }
            Ok(Message::Binary(_)) => tracing::warn!("Binary messages not supported"),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                tracing::info!(conn_id = %conn_id, "WebSocket close frame received");
                break;
            }
            Err(e) => {
                tracing::warn!(conn_id = %conn_id, "WebSocket error: {}", e);
                break;
            }
        }
    }

    state.conn_manager.unregister(&conn_id);
    send_task.abort();
    tracing::info!(
        conn_id = %conn_id,
        active_connections = state.conn_manager.connection_count(),
        "WebSocket client disconnected"
    );
}

async fn process_message(text: &str, state: &AppState, conn_id: &str) -> ServerMessage {
    let client_msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => return ServerMessage::error(format!("invalid message format: {e}"), None),
    };

    match client_msg {
        ClientMessage::GetDoc { doc_id, at_rev, request_id } => match handle_get_doc(state, &doc_id, at_rev).await {
            Ok(resp) => ServerMessage::GetDocResult { state: resp.state, rev: resp.rev, request_id },
            Err(e) => ServerMessage::error(e.to_string(), request_id),
        },
        ClientMessage::GetChangesSince { doc_id, rev, request_id } => match handle_get_changes_since(state, &doc_id, rev).await {
            Ok(resp) => ServerMessage::GetChangesSinceResult { changes: resp.changes, request_id },
            Err(e) => ServerMessage::error(e.to_string(), request_id),
        },
        ClientMessage::CommitChanges { doc_id, changes, algorithm, request_id } => {
            let request = CommitRequest { changes, algorithm };
            match handle_commit(state, &doc_id, request, Some(conn_id)).await {
                Ok(resp) => ServerMessage::CommitChangesResult { changes: resp.changes, request_id },
                Err(e) => ServerMessage::error(e.to_string(), request_id),
            }
        }
        ClientMessage::DeleteDoc { doc_id, request_id } => match handle_delete_doc(state, &doc_id, Some(conn_id)).await {
            Ok(()) => ServerMessage::DeleteDocResult { request_id },
            Err(e) => ServerMessage::error(e.to_string(), request_id),
        },
        ClientMessage::Subscribe { ids, request_id } => {
            let accepted = state.conn_manager.subscribe(conn_id, &ids);
            ServerMessage::SubscribeResult { accepted, request_id }
        }
        ClientMessage::Unsubscribe { ids, request_id } => {
            let accepted = state.conn_manager.unsubscribe(conn_id, &ids);
            ServerMessage::UnsubscribeResult { accepted, request_id }
        }
        ClientMessage::Ping => ServerMessage::Pong,
    }
}
