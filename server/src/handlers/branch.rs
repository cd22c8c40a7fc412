//! Branch Manager endpoints (§4.7): fork, update, close, and merge a
//! document branch. Branching is only defined for OT documents, so
//! these reject any `doc_id` registered under LWW.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use syncpatch_core::branch::{Branch, BranchStatus};
use syncpatch_core::Change;

use crate::error::{AppError, Result};
use crate::AppState;

use super::common::now_millis;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBranchRequest {
    pub branched_at_rev: u64,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBranchRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseBranchRequest {
    pub status: BranchStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeBranchResponse {
    pub changes: Vec<Change>,
}

pub async fn handle_create_branch(state: &AppState, source_doc_id: &str, request: CreateBranchRequest) -> Result<Branch> {
    let _guard = state.doc_lock.lock_doc(source_doc_id).await;
    let branch = state
        .branches
        .create_branch(&source_doc_id.to_string(), request.branched_at_rev, request.name, now_millis())
        .await?;
    crate::db::ensure_doc(&state.pool, &branch.id, crate::db::Algorithm::Ot, now_millis() as i64).await?;
    Ok(branch)
}

pub async fn handle_update_branch(state: &AppState, branch_id: &str, request: UpdateBranchRequest) -> Result<Branch> {
    Ok(state.branches.update_branch(branch_id, request.name, request.metadata).await?)
}

pub async fn handle_close_branch(state: &AppState, branch_id: &str, request: CloseBranchRequest) -> Result<Branch> {
    if request.status == BranchStatus::Open {
        return Err(AppError::BadRequest("cannot close a branch into the open state".to_string()));
    }
    Ok(state.branches.close_branch(branch_id, request.status).await?)
}

pub async fn handle_merge_branch(state: &AppState, branch_id: &str) -> Result<MergeBranchResponse> {
    let branch = state
        .branches
        .coordinator()
        .store()
        .branch(branch_id)
        .await?
        .ok_or_else(|| AppError::Engine(syncpatch_core::Error::BranchNotFound { branch_id: branch_id.to_string() }))?;

    let _guard = state.doc_lock.lock_doc(&branch.doc_id).await;
    let merged = state.branches.merge_branch(branch_id, now_millis()).await?;

    if !merged.is_empty() {
        let notify = crate::websocket::ServerMessage::ChangesCommitted {
            doc_id: branch.doc_id.clone(),
            changes: merged.clone(),
        };
        state.conn_manager.broadcast_to_doc_except(&branch.doc_id, None, notify);
    }

    Ok(MergeBranchResponse { changes: merged })
}
