//! `commitChanges` (§6): the only RPC that mutates a document. Shared by
//! both the HTTP route and the WebSocket dispatch loop, which is why it
//! takes the originating connection id separately from the request body
//! — HTTP callers have none, so broadcasts reach every subscriber.

use serde::{Deserialize, Serialize};
use syncpatch_core::Change;

use crate::db::Algorithm;
use crate::error::{AppError, Result};
use crate::websocket::ServerMessage;
use crate::AppState;

use super::common::{now_millis, resolve_algorithm};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    pub changes: Vec<Change>,
    #[serde(default)]
    pub algorithm: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResponse {
    pub changes: Vec<Change>,
}

pub async fn handle_commit(state: &AppState, doc_id: &str, request: CommitRequest, originator_conn_id: Option<&str>) -> Result<CommitResponse> {
    let _guard = state.doc_lock.lock_doc(doc_id).await;

    let algorithm = resolve_algorithm(state, doc_id, request.algorithm.as_deref()).await?;
    let now = now_millis();
    let doc_id_owned = doc_id.to_string();

    let committed = match algorithm {
        Algorithm::Ot => state.ot.commit_changes(&doc_id_owned, request.changes, now).await?,
        Algorithm::Lww => {
            if request.changes.len() != 1 {
                return Err(AppError::BadRequest("LWW commitChanges requires exactly one change".to_string()));
            }
            let change = request.changes.into_iter().next().expect("length checked above");
            state.lww.commit_changes(&doc_id_owned, change, now).await?
        }
    };

    if !committed.is_empty() {
        let notify = ServerMessage::ChangesCommitted {
            doc_id: doc_id_owned.clone(),
            changes: committed.clone(),
        };
        state.conn_manager.broadcast_to_doc_except(&doc_id_owned, originator_conn_id, notify);
    }

    Ok(CommitResponse { changes: committed })
}
