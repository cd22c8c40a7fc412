//! `getDoc` (§6): reconstruct a document's state at a revision.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::AppState;

use super::common::require_registered;
use crate::db::Algorithm;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetDocQuery {
    #[serde(default)]
    pub at_rev: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetDocResponse {
    pub state: Value,
    pub rev: u64,
}

pub async fn handle_get_doc(state: &AppState, doc_id: &str, at_rev: Option<u64>) -> Result<GetDocResponse> {
    let algorithm = require_registered(state, doc_id).await?;
    let (value, rev) = match algorithm {
        Algorithm::Ot => state.ot.get_doc(&doc_id.to_string(), at_rev).await?,
        Algorithm::Lww => state.lww.get_doc(&doc_id.to_string(), at_rev).await?,
    };
    Ok(GetDocResponse { state: value, rev })
}
