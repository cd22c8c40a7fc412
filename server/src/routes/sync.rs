//! Sync endpoint routes: the four RPCs of §6 over HTTP, the WebSocket
//! upgrade, and the Branch Manager endpoints (HTTP-only — branching is
//! not part of the wire RPC contract).

use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{
    handle_close_branch, handle_commit, handle_create_branch, handle_delete_doc, handle_get_changes_since, handle_get_doc, handle_merge_branch,
    handle_update_branch, handle_websocket_connection, CloseBranchRequest, CommitRequest, CreateBranchRequest, GetDocQuery, UpdateBranchRequest,
};
use crate::AppState;

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitBody {
    doc_id: String,
    #[serde(flatten)]
    request: CommitRequest,
}

/// Create sync routes, mounted under `/sync`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sync/commit", post(commit_handler))
        .route("/sync/doc/{doc_id}", get(get_doc_handler).delete(delete_doc_handler))
        .route("/sync/doc/{doc_id}/changes", get(get_changes_since_handler))
        .route("/sync/doc/{doc_id}/branch", post(create_branch_handler))
        .route("/sync/branch/{branch_id}", axum::routing::patch(update_branch_handler))
        .route("/sync/branch/{branch_id}/close", post(close_branch_handler))
        .route("/sync/branch/{branch_id}/merge", post(merge_branch_handler))
        .route("/sync/ws", get(websocket_handler))
}

async fn commit_handler(State(state): State<AppState>, _auth: AuthUser, Json(body): Json<CommitBody>) -> Result<impl IntoResponse> {
    let response = handle_commit(&state, &body.doc_id, body.request, None).await?;
    Ok(Json(response))
}

async fn get_doc_handler(State(state): State<AppState>, _auth: AuthUser, Path(doc_id): Path<String>, Query(query): Query<GetDocQuery>) -> Result<impl IntoResponse> {
    let response = handle_get_doc(&state, &doc_id, query.at_rev).await?;
    Ok(Json(response))
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangesSinceQuery {
    rev: u64,
}

async fn get_changes_since_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(doc_id): Path<String>,
    Query(query): Query<ChangesSinceQuery>,
) -> Result<impl IntoResponse> {
    let response = handle_get_changes_since(&state, &doc_id, query.rev).await?;
    Ok(Json(response))
}

async fn delete_doc_handler(State(state): State<AppState>, _auth: AuthUser, Path(doc_id): Path<String>) -> Result<impl IntoResponse> {
    handle_delete_doc(&state, &doc_id, None).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn create_branch_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(doc_id): Path<String>,
    Json(request): Json<CreateBranchRequest>,
) -> Result<impl IntoResponse> {
    let branch = handle_create_branch(&state, &doc_id, request).await?;
    Ok(Json(branch))
}

async fn update_branch_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(branch_id): Path<String>,
    Json(request): Json<UpdateBranchRequest>,
) -> Result<impl IntoResponse> {
    let branch = handle_update_branch(&state, &branch_id, request).await?;
    Ok(Json(branch))
}

async fn close_branch_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(branch_id): Path<String>,
    Json(request): Json<CloseBranchRequest>,
) -> Result<impl IntoResponse> {
    let branch = handle_close_branch(&state, &branch_id, request).await?;
    Ok(Json(branch))
}

async fn merge_branch_handler(State(state): State<AppState>, _auth: AuthUser, Path(branch_id): Path<String>) -> Result<impl IntoResponse> {
    let response = handle_merge_branch(&state, &branch_id).await?;
    Ok(Json(response))
}

/// GET /sync/ws - WebSocket endpoint for real-time sync.
///
/// Auth happens before the upgrade: clients without a valid bearer token
/// (when `AUTH_SECRET` is configured) never reach the handshake.
async fn websocket_handler(State(state): State<AppState>, _auth: AuthUser, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket_connection(socket, state))
}
