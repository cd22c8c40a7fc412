//! `getChangesSince` (§6): changes committed strictly after a revision.

use serde::Serialize;
use syncpatch_core::Change;

use crate::error::Result;
use crate::AppState;

use super::common::require_registered;
use crate::db::Algorithm;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetChangesSinceResponse {
    pub changes: Vec<Change>,
}

pub async fn handle_get_changes_since(state: &AppState, doc_id: &str, rev: u64) -> Result<GetChangesSinceResponse> {
    let algorithm = require_registered(state, doc_id).await?;
    let changes = match algorithm {
        Algorithm::Ot => state.ot.get_changes_since(&doc_id.to_string(), rev).await?,
        Algorithm::Lww => {
            let mut changes = state.lww.get_changes_since(&doc_id.to_string(), rev).await?;
            substitute_text_deltas(state, doc_id, &mut changes).await?;
            changes
        }
    };
    Ok(GetChangesSinceResponse { changes })
}

/// LWW `@txt` ops are stored compacted against the live document, not
/// as the literal deltas a client sent (§4.5's consolidation rule). When
/// serving catch-up history, swap each stored `@txt` op's delta for the
/// composed delta recorded in `lww_text_deltas`, so the replaying client
/// applies the same text transformation the committer intended instead
/// of today's already-merged snapshot of it.
async fn substitute_text_deltas(state: &AppState, doc_id: &str, changes: &mut [Change]) -> Result<()> {
    use syncpatch_core::patch::OpType;

    let revs: Vec<u64> = changes.iter().map(|c| c.rev).collect();
    if revs.is_empty() {
        return Ok(());
    }
    let min_rev = revs.iter().min().copied().unwrap_or(0);
    let deltas = crate::db::text_deltas_since(&state.pool, doc_id, min_rev.saturating_sub(1)).await?;
    if deltas.is_empty() {
        return Ok(());
    }

    for change in changes.iter_mut() {
        for op in change.ops.iter_mut() {
            if op.op != OpType::Txt {
                continue;
            }
            if let Some(per_path) = deltas.get(&op.path) {
                if let Some(value) = per_path.iter().find(|(rev, _)| *rev == change.rev).map(|(_, v)| v.clone()) {
                    op.value = Some(value);
                }
            }
        }
    }
    Ok(())
}
