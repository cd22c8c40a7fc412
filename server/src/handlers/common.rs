//! Shared helpers for the RPC handlers: algorithm dispatch against the
//! `docs` registry and the current-time source handlers pass down to the
//! coordinators.

use crate::db;
use crate::error::{AppError, Result};
use crate::AppState;

/// Resolve which algorithm a doc uses, registering it under `hint` (or
/// OT, if `hint` is absent) the first time it is seen. An explicit hint
/// that disagrees with an already-registered algorithm is rejected —
/// the first committer's choice is permanent.
pub async fn resolve_algorithm(state: &AppState, doc_id: &str, hint: Option<&str>) -> Result<db::Algorithm> {
    match db::get_doc(&state.pool, doc_id).await? {
        Some((algorithm, _deleted)) => {
            if let Some(hint) = hint {
                let requested: db::Algorithm = hint.parse().map_err(|_| AppError::BadRequest(format!("unknown algorithm: {hint}")))?;
                if requested != algorithm {
                    return Err(AppError::BadRequest(format!(
                        "doc {doc_id} was created as {} and cannot switch to {hint}",
                        algorithm.as_str()
                    )));
                }
            }
            Ok(algorithm)
        }
        None => {
            let algorithm: db::Algorithm = match hint {
                Some(hint) => hint.parse().map_err(|_| AppError::BadRequest(format!("unknown algorithm: {hint}")))?,
                None => db::Algorithm::Ot,
            };
            db::ensure_doc(&state.pool, doc_id, algorithm, now_millis() as i64).await?;
            Ok(algorithm)
        }
    }
}

/// Require a doc to already be registered, for read/delete paths that
/// must not silently create one.
pub async fn require_registered(state: &AppState, doc_id: &str) -> Result<db::Algorithm> {
    match db::get_doc(&state.pool, doc_id).await? {
        Some((algorithm, _deleted)) => Ok(algorithm),
        None => Err(AppError::Engine(syncpatch_core::Error::DocNotFound { doc_id: doc_id.to_string() })),
    }
}

pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}
