//! `invert(state, ops)`: compute the op sequence that undoes `ops` when
//! applied (in reverse) to the state `ops` produced.

use serde_json::Value;

use super::apply::{apply, ApplyOptions};
use super::ops::{JsonPatchOp, OpType};
use super::pointer;
use crate::error::Result;

/// Compute the inverse of `ops`, given the state `ops` was applied to
/// (i.e. the state *before* `ops`, not after). Applying `ops` then its
/// inverse to `state` reproduces `state`.
pub fn invert(state: &Value, ops: &[JsonPatchOp]) -> Result<Vec<JsonPatchOp>> {
    let mut cursor = state.clone();
    let mut inverses = Vec::with_capacity(ops.len());
    for op in ops {
        let before = pointer::get(&cursor, &op.path)?.cloned();
        inverses.push(invert_one(op, before.as_ref()));
        cursor = apply(&cursor, std::slice::from_ref(op), ApplyOptions::default())?;
    }
    inverses.reverse();
    Ok(inverses)
}

fn invert_one(op: &JsonPatchOp, before: Option<&Value>) -> JsonPatchOp {
    match op.op {
        OpType::Add => JsonPatchOp::remove(op.path.clone()),
        OpType::Remove => match before {
            Some(v) => JsonPatchOp::add(op.path.clone(), v.clone()),
            None => JsonPatchOp::remove(op.path.clone()),
        },
        OpType::Replace => match before {
            Some(v) => JsonPatchOp::replace(op.path.clone(), v.clone()),
            None => JsonPatchOp::remove(op.path.clone()),
        },
        OpType::Copy => JsonPatchOp::remove(op.path.clone()),
        OpType::Move => {
            let from = op.from.clone().unwrap_or_default();
            JsonPatchOp::move_op(op.path.clone(), from)
        }
        OpType::Test => op.clone(),
        OpType::Inc => {
            let amount = op.value.as_ref().and_then(Value::as_f64).unwrap_or(0.0);
            JsonPatchOp::inc(op.path.clone(), -amount)
        }
        // @bit/@max/@min/@txt are lossy (the prior bit/extremum/delta
        // state cannot always be reconstructed from the op alone); the
        // best available inverse restores the previously observed value.
        OpType::Bit | OpType::Max | OpType::Min | OpType::Txt => match before {
            Some(v) => JsonPatchOp::replace(op.path.clone(), v.clone()),
            None => JsonPatchOp::remove(op.path.clone()),
        },
    }
}
