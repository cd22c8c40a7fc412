//! `compose(a, b)`: combine two op sequences applied in sequence into one
//! equivalent sequence, used by the flatten-merge branch path and by
//! offline-session collapsing.

use super::ops::{JsonPatchOp, OpType};

/// Compose `a` followed by `b` into one op list. Adjacent `@inc`/`@bit`
/// ops on the same path are folded into a single op so a long offline
/// session collapses to a compact change; every other op pair is simply
/// concatenated, since JSON-Patch ops are themselves already a
/// sequential program (`apply(state, compose(a, b)) == apply(apply(state,
/// a), b)` holds for plain concatenation).
pub fn compose(a: &[JsonPatchOp], b: &[JsonPatchOp]) -> Vec<JsonPatchOp> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    out.extend(a.iter().cloned());
    out.extend(b.iter().cloned());
    fold_adjacent(out)
}

/// Compose a whole list of change op-lists into one flattened list, in
/// order. Used when flattening a branch's history into a single change
/// before transforming it against the source's divergent history.
pub fn compose_all<'a>(batches: impl IntoIterator<Item = &'a [JsonPatchOp]>) -> Vec<JsonPatchOp> {
    let mut out = Vec::new();
    for batch in batches {
        out = compose(&out, batch);
    }
    out
}

fn fold_adjacent(ops: Vec<JsonPatchOp>) -> Vec<JsonPatchOp> {
    let mut out: Vec<JsonPatchOp> = Vec::with_capacity(ops.len());
    for op in ops {
        if let Some(last) = out.last_mut() {
            if let Some(folded) = try_fold(last, &op) {
                *last = folded;
                continue;
            }
        }
        out.push(op);
    }
    out
}

fn try_fold(prev: &JsonPatchOp, next: &JsonPatchOp) -> Option<JsonPatchOp> {
    if prev.path != next.path {
        return None;
    }
    match (prev.op, next.op) {
        (OpType::Inc, OpType::Inc) => {
            let sum = prev.value.as_ref()?.as_f64()? + next.value.as_ref()?.as_f64()?;
            let mut folded = next.clone();
            folded.value = Some(serde_json::Value::from(sum));
            Some(folded)
        }
        (OpType::Bit, OpType::Bit) if prev.index.is_none() && next.index.is_none() => {
            let mask = (prev.value.as_ref()?.as_u64()?) | (next.value.as_ref()?.as_u64()?);
            let mut folded = next.clone();
            folded.value = Some(serde_json::Value::from(mask));
            Some(folded)
        }
        // replace/replace, max/max, min/min: the later op already fully
        // supersedes the earlier one syntactically.
        (OpType::Replace, OpType::Replace)
        | (OpType::Max, OpType::Max)
        | (OpType::Min, OpType::Min) => Some(next.clone()),
        _ => None,
    }
}
