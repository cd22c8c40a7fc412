//! `transform(state, committedOps, pendingOps)`: rebase `pendingOps`
//! against `committedOps` that were applied first, per the JSON-Patch
//! algebra contract in the data model.

use serde_json::Value;

use super::ops::{JsonPatchOp, OpType};
use super::pointer::{self, ArrayIndex};
use super::text;
use crate::error::{Error, Result};

/// Transform a whole batch of pending ops against a whole batch of
/// committed ops, threading each committed op through in order so
/// multiple array-index shifts compound correctly. Ops that transform
/// away to nothing are dropped from the result.
pub fn transform_patch(committed_ops: &[JsonPatchOp], pending_ops: &[JsonPatchOp]) -> Result<Vec<JsonPatchOp>> {
    let mut pending: Vec<Option<JsonPatchOp>> = pending_ops.iter().cloned().map(Some).collect();
    for committed in committed_ops {
        for slot in pending.iter_mut() {
            if let Some(op) = slot.take() {
                *slot = transform_op(committed, &op)?;
            }
        }
    }
    Ok(pending.into_iter().flatten().collect())
}

/// Entry point matching the algebra contract's `transform(state, a, b)`
/// naming. The implementation here is purely syntactic (it never reads
/// `state`), which is sufficient for every op pair this module covers.
pub fn transform(_state: &Value, committed_ops: &[JsonPatchOp], pending_ops: &[JsonPatchOp]) -> Result<Vec<JsonPatchOp>> {
    transform_patch(committed_ops, pending_ops)
}

/// Rebase one `pending` op against one already-applied `committed` op.
/// Returns `None` when `pending` transforms away to nothing (its target
/// was removed, or it is superseded).
pub fn transform_op(committed: &JsonPatchOp, pending: &JsonPatchOp) -> Result<Option<JsonPatchOp>> {
    // `soft: true` marks `committed` as informational (§3, §4.1): it must
    // never displace, shift, or drop a concurrent op. Only a later
    // non-soft write at the same path supersedes it, which already holds
    // here since `pending` passes through untouched.
    if committed.is_soft() {
        return Ok(Some(pending.clone()));
    }

    if let Some(result) = transform_array_sibling(committed, pending)? {
        return Ok(result);
    }

    if committed.path == pending.path {
        return Ok(transform_same_path(committed, pending));
    }

    if pointer::is_ancestor(&committed.path, &pending.path) {
        return Ok(transform_ancestor_write(committed, pending));
    }

    // `pending` is an ancestor of `committed`, or the paths are
    // unrelated: `committed` cannot invalidate `pending` syntactically.
    Ok(Some(pending.clone()))
}

fn transform_same_path(committed: &JsonPatchOp, pending: &JsonPatchOp) -> Option<JsonPatchOp> {
    if committed.op == OpType::Remove {
        // The target is gone; any op addressing the exact same path is
        // moot (the coordinator's apply step would otherwise raise
        // InvalidPatch for a vanished target).
        return None;
    }

    if committed.op == OpType::Txt && pending.op == OpType::Txt {
        return Some(transform_txt(committed, pending));
    }

    if committed.op.is_extended() && pending.op.is_extended() {
        // @inc/@bit are commutative, @max/@min are idempotent: `apply`
        // already folds these into the stored value correctly, so the
        // pending op is replayed unchanged.
        return Some(pending.clone());
    }

    // replace-vs-replace (and the other standard-op combinations): the
    // later-submitted write simply overwrites, so `pending` passes
    // through unchanged — this is what makes same-field conflicts
    // resolve to "later write wins" under OT.
    Some(pending.clone())
}

fn transform_txt(committed: &JsonPatchOp, pending: &JsonPatchOp) -> JsonPatchOp {
    let a: text::Delta = committed
        .value
        .as_ref()
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();
    let b: text::Delta = pending
        .value
        .as_ref()
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();
    let b_prime = text::transform_delta(&a, &b, false);
    let mut out = pending.clone();
    out.value = Some(serde_json::to_value(b_prime).expect("delta serializes"));
    out
}

fn transform_ancestor_write(committed: &JsonPatchOp, pending: &JsonPatchOp) -> Option<JsonPatchOp> {
    match committed.op {
        // The subtree `pending` lives under was removed or entirely
        // replaced; `pending`'s target no longer exists in that form.
        OpType::Remove | OpType::Replace | OpType::Move => None,
        _ => Some(pending.clone()),
    }
}

/// Handle the case where `committed` and `pending` address sibling
/// elements of the same array. Returns `Ok(None)` when the two ops are
/// not array siblings (the caller should fall through to the general
/// path logic), `Ok(Some(result))` when this function fully decided the
/// outcome, and `Err` when an `/-` append collides with a concurrent
/// edit of the same array (per the open-question resolution: `/-` has no
/// well-defined transform and must be rejected rather than silently
/// misordered).
fn transform_array_sibling(committed: &JsonPatchOp, pending: &JsonPatchOp) -> Result<Option<Option<JsonPatchOp>>> {
    let Some((c_parent, c_tok)) = pointer::split_last(&committed.path) else { return Ok(None) };
    let Some((p_parent, p_tok)) = pointer::split_last(&pending.path) else { return Ok(None) };
    if c_parent != p_parent {
        return Ok(None);
    }
    let Ok(c_idx) = pointer::parse_array_index(&c_tok) else { return Ok(None) };
    let Ok(p_idx) = pointer::parse_array_index(&p_tok) else { return Ok(None) };

    if matches!(c_idx, ArrayIndex::Append) || matches!(p_idx, ArrayIndex::Append) {
        return Err(Error::InvalidPatch(format!(
            "'/-' path cannot be transformed against a concurrent edit of the same array (committed={:?}, pending={:?})",
            committed.path, pending.path
        )));
    }

    let (ArrayIndex::At(ai), ArrayIndex::At(bi)) = (c_idx, p_idx) else {
        unreachable!("append already handled above")
    };

    match committed.op {
        OpType::Add => {
            if bi >= ai {
                let mut shifted = pending.clone();
                shifted.path = format!("{p_parent}/{}", bi + 1);
                Ok(Some(Some(shifted)))
            } else {
                Ok(Some(Some(pending.clone())))
            }
        }
        OpType::Remove => {
            if bi == ai {
                Ok(Some(None))
            } else if bi > ai {
                let mut shifted = pending.clone();
                shifted.path = format!("{p_parent}/{}", bi - 1);
                Ok(Some(Some(shifted)))
            } else {
                Ok(Some(Some(pending.clone())))
            }
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn same_path_replace_vs_replace_keeps_later_write() {
        let committed = JsonPatchOp::replace("/title", json!("From A"));
        let pending = JsonPatchOp::replace("/title", json!("From B"));
        let out = transform_op(&committed, &pending).unwrap();
        assert_eq!(out, Some(pending));
    }

    #[test]
    fn disjoint_fields_transform_to_identity() {
        let committed = JsonPatchOp::replace("/title", json!("World"));
        let pending = JsonPatchOp::inc("/count", 5.0);
        let out = transform_op(&committed, &pending).unwrap();
        assert_eq!(out, Some(pending));
    }

    #[test]
    fn inc_vs_inc_same_path_is_unchanged() {
        let committed = JsonPatchOp::inc("/count", 1.0);
        let pending = JsonPatchOp::inc("/count", 2.0);
        let out = transform_op(&committed, &pending).unwrap();
        assert_eq!(out, Some(pending));
    }

    #[test]
    fn remove_drops_pending_op_at_same_path() {
        let committed = JsonPatchOp::remove("/x");
        let pending = JsonPatchOp::replace("/x", json!(1));
        let out = transform_op(&committed, &pending).unwrap();
        assert_eq!(out, None);
    }

    #[test]
    fn ancestor_remove_drops_descendant_write() {
        let committed = JsonPatchOp::remove("/obj");
        let pending = JsonPatchOp::replace("/obj/name", json!("Alice"));
        let out = transform_op(&committed, &pending).unwrap();
        assert_eq!(out, None);
    }

    #[test]
    fn array_add_shifts_later_sibling_indices() {
        let committed = JsonPatchOp::add("/items/0", json!("x"));
        let pending = JsonPatchOp::replace("/items/0", json!("y"));
        let out = transform_op(&committed, &pending).unwrap().unwrap();
        assert_eq!(out.path, "/items/1");
    }

    #[test]
    fn array_remove_drops_op_on_removed_element() {
        let committed = JsonPatchOp::remove("/items/2");
        let pending = JsonPatchOp::replace("/items/2", json!("y"));
        let out = transform_op(&committed, &pending).unwrap();
        assert_eq!(out, None);
    }

    #[test]
    fn array_remove_shifts_later_indices_down() {
        let committed = JsonPatchOp::remove("/items/0");
        let pending = JsonPatchOp::replace("/items/3", json!("y"));
        let out = transform_op(&committed, &pending).unwrap().unwrap();
        assert_eq!(out.path, "/items/2");
    }

    #[test]
    fn append_path_rejects_transform_against_concurrent_sibling() {
        let committed = JsonPatchOp::add("/items/-", json!("x"));
        let pending = JsonPatchOp::replace("/items/0", json!("y"));
        assert!(transform_op(&committed, &pending).is_err());
    }

    #[test]
    fn soft_array_add_does_not_shift_sibling_index() {
        let committed = JsonPatchOp::add("/items/0", json!("x")).soft();
        let pending = JsonPatchOp::replace("/items/0", json!("y"));
        let out = transform_op(&committed, &pending).unwrap();
        assert_eq!(out, Some(pending));
    }

    #[test]
    fn soft_remove_does_not_drop_pending_op_at_same_path() {
        let committed = JsonPatchOp::remove("/x").soft();
        let pending = JsonPatchOp::replace("/x", json!(1));
        let out = transform_op(&committed, &pending).unwrap();
        assert_eq!(out, Some(pending));
    }

    #[test]
    fn soft_ancestor_remove_does_not_drop_descendant_write() {
        let committed = JsonPatchOp::remove("/obj").soft();
        let pending = JsonPatchOp::replace("/obj/name", json!("Alice"));
        let out = transform_op(&committed, &pending).unwrap();
        assert_eq!(out, Some(pending));
    }

    #[test]
    fn soft_append_does_not_error_against_concurrent_sibling() {
        let committed = JsonPatchOp::add("/items/-", json!("x")).soft();
        let pending = JsonPatchOp::replace("/items/0", json!("y"));
        let out = transform_op(&committed, &pending).unwrap();
        assert_eq!(out, Some(pending));
    }

    #[test]
    fn non_soft_write_supersedes_prior_soft_write_at_same_path() {
        let soft_committed = JsonPatchOp::replace("/title", json!("draft")).soft();
        let pending = JsonPatchOp::replace("/title", json!("final"));
        let out = transform_op(&soft_committed, &pending).unwrap();
        assert_eq!(out, Some(pending));
    }
}
