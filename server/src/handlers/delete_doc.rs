//! `deleteDoc` (§6): mark a document deleted and notify subscribers.

use crate::db::Algorithm;
use crate::error::Result;
use crate::websocket::ServerMessage;
use crate::AppState;

use super::common::require_registered;

pub async fn handle_delete_doc(state: &AppState, doc_id: &str, originator_conn_id: Option<&str>) -> Result<()> {
    let _guard = state.doc_lock.lock_doc(doc_id).await;

    let algorithm = require_registered(state, doc_id).await?;
    match algorithm {
        Algorithm::Ot => state.ot.delete_doc(&doc_id.to_string()).await?,
        Algorithm::Lww => state.lww.delete_doc(&doc_id.to_string()).await?,
    }

    state.conn_manager.broadcast_to_doc_except(
        doc_id,
        originator_conn_id,
        ServerMessage::DocDeleted { doc_id: doc_id.to_string() },
    );
    Ok(())
}
