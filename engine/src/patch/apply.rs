//! `apply(state, ops, options)`: the JSON-Patch application half of the
//! algebra, including the extended `@inc`/`@bit`/`@max`/`@min`/`@txt`
//! operators.

use serde_json::Value;

use super::ops::{JsonPatchOp, OpType};
use super::pointer;
use super::text::{self, Delta};
use crate::error::{Error, Result};

/// Controls strict vs. partial application.
#[derive(Debug, Clone, Copy)]
pub struct ApplyOptions {
    /// Missing paths, type mismatches, and failed `test` ops raise
    /// [`Error::InvalidPatch`].
    pub strict: bool,
    /// When true, a failing sub-op is skipped (and the whole patch does
    /// not abort) instead of raising.
    pub partial: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        ApplyOptions { strict: true, partial: false }
    }
}

/// Apply a sequence of ops to `state`, returning a new value. `state` is
/// never mutated in place.
pub fn apply(state: &Value, ops: &[JsonPatchOp], options: ApplyOptions) -> Result<Value> {
    let mut out = state.clone();
    for op in ops {
        match apply_one(&mut out, op) {
            Ok(()) => {}
            Err(e) => {
                if options.partial {
                    tracing::debug!(path = %op.path, op = ?op.op, error = %e, "skipping failed sub-op under partial apply");
                    continue;
                }
                if options.strict {
                    return Err(e);
                }
            }
        }
    }
    Ok(out)
}

fn apply_one(state: &mut Value, op: &JsonPatchOp) -> Result<()> {
    match op.op {
        OpType::Add => {
            let value = require_value(op)?;
            pointer::add(state, &op.path, value.clone())
        }
        OpType::Remove => {
            pointer::remove(state, &op.path).map(|_| ())
        }
        OpType::Replace => {
            let value = require_value(op)?;
            pointer::replace(state, &op.path, value.clone())
        }
        OpType::Test => {
            let expected = require_value(op)?;
            let actual = pointer::get(state, &op.path)?;
            if actual == Some(expected) {
                Ok(())
            } else {
                Err(Error::InvalidPatch(format!("test failed at {:?}", op.path)))
            }
        }
        OpType::Copy => {
            let from = op
                .from
                .as_deref()
                .ok_or_else(|| Error::InvalidPatch("copy requires 'from'".into()))?;
            let value = pointer::get(state, from)?
                .cloned()
                .ok_or_else(|| Error::InvalidPatch(format!("copy source {from:?} does not exist")))?;
            pointer::add(state, &op.path, value)
        }
        OpType::Move => {
            let from = op
                .from
                .as_deref()
                .ok_or_else(|| Error::InvalidPatch("move requires 'from'".into()))?;
            let value = pointer::remove(state, from)?;
            pointer::add(state, &op.path, value)
        }
        OpType::Inc => apply_inc(state, op),
        OpType::Bit => apply_bit(state, op),
        OpType::Max => apply_extremum(state, op, true),
        OpType::Min => apply_extremum(state, op, false),
        OpType::Txt => apply_txt(state, op),
    }
}

fn require_value(op: &JsonPatchOp) -> Result<&Value> {
    op.value
        .as_ref()
        .ok_or_else(|| Error::InvalidPatch(format!("{:?} at {:?} requires a value", op.op, op.path)))
}

fn apply_inc(state: &mut Value, op: &JsonPatchOp) -> Result<()> {
    let amount = require_value(op)?
        .as_f64()
        .ok_or_else(|| Error::InvalidPatch("@inc value must be numeric".into()))?;
    let current = pointer::get(state, &op.path)?.and_then(Value::as_f64).unwrap_or(0.0);
    let next = current + amount;
    set_numeric(state, &op.path, next)
}

fn apply_bit(state: &mut Value, op: &JsonPatchOp) -> Result<()> {
    let current = pointer::get(state, &op.path)?.and_then(Value::as_u64).unwrap_or(0);
    let next = if let Some(index) = op.index {
        let set = require_value(op)?.as_bool().unwrap_or(false);
        if set {
            current | (1u64 << index)
        } else {
            current & !(1u64 << index)
        }
    } else {
        let mask = require_value(op)?
            .as_u64()
            .ok_or_else(|| Error::InvalidPatch("@bit mask must be an unsigned integer".into()))?;
        current | mask
    };
    set_exact(state, &op.path, Value::from(next))
}

fn apply_extremum(state: &mut Value, op: &JsonPatchOp, want_max: bool) -> Result<()> {
    let candidate = require_value(op)?
        .as_f64()
        .ok_or_else(|| Error::InvalidPatch(format!("{:?} value must be numeric", op.op)))?;
    match pointer::get(state, &op.path)?.and_then(Value::as_f64) {
        Some(current) => {
            let improves = if want_max { candidate > current } else { candidate < current };
            if improves {
                set_numeric(state, &op.path, candidate)
            } else {
                Ok(())
            }
        }
        None => set_numeric(state, &op.path, candidate),
    }
}

fn apply_txt(state: &mut Value, op: &JsonPatchOp) -> Result<()> {
    let delta_value = require_value(op)?;
    let delta: Delta = serde_json::from_value(delta_value.clone())
        .map_err(|e| Error::InvalidPatch(format!("invalid @txt delta: {e}")))?;
    let base = pointer::get(state, &op.path)?
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let next = text::apply_delta(&base, &delta);
    set_exact(state, &op.path, Value::from(next))
}

fn set_numeric(state: &mut Value, path: &str, value: f64) -> Result<()> {
    set_exact(state, path, serde_json::Number::from_f64(value).map(Value::Number).unwrap_or(Value::from(0)))
}

fn set_exact(state: &mut Value, path: &str, value: Value) -> Result<()> {
    if pointer::get(state, path)?.is_some() {
        pointer::replace(state, path, value)
    } else {
        pointer::add(state, path, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn applies_standard_ops_in_order() {
        let state = json!({"title": "Hello"});
        let ops = vec![JsonPatchOp::replace("/title", json!("World"))];
        let out = apply(&state, &ops, ApplyOptions::default()).unwrap();
        assert_eq!(out, json!({"title": "World"}));
    }

    #[test]
    fn inc_creates_path_when_absent() {
        let state = json!({});
        let ops = vec![JsonPatchOp::inc("/count", 5.0)];
        let out = apply(&state, &ops, ApplyOptions::default()).unwrap();
        assert_eq!(out["count"], json!(5.0));
    }

    #[test]
    fn inc_is_additive_across_multiple_ops() {
        let state = json!({"count": 1});
        let ops = vec![JsonPatchOp::inc("/count", 2.0), JsonPatchOp::inc("/count", 3.0)];
        let out = apply(&state, &ops, ApplyOptions::default()).unwrap();
        assert_eq!(out["count"], json!(6.0));
    }

    #[test]
    fn max_only_applies_when_improving() {
        let state = json!({"score": 10});
        let lower = apply(&state, &[JsonPatchOp::max("/score", json!(5))], ApplyOptions::default()).unwrap();
        assert_eq!(lower["score"], json!(10.0));
        let higher = apply(&state, &[JsonPatchOp::max("/score", json!(20))], ApplyOptions::default()).unwrap();
        assert_eq!(higher["score"], json!(20.0));
    }

    #[test]
    fn bit_set_and_clear_individual_bits() {
        let state = json!({"flags": 0});
        let set = apply(&state, &[JsonPatchOp::bit_set("/flags", 2, true)], ApplyOptions::default()).unwrap();
        assert_eq!(set["flags"], json!(4));
        let cleared =
            apply(&set, &[JsonPatchOp::bit_set("/flags", 2, false)], ApplyOptions::default()).unwrap();
        assert_eq!(cleared["flags"], json!(0));
    }

    #[test]
    fn txt_inserts_into_stored_text() {
        let state = json!({"body": "Hello World"});
        let delta = json!([{"retain": 6}, {"insert": "Big "}]);
        let ops = vec![JsonPatchOp::txt("/body", delta)];
        let out = apply(&state, &ops, ApplyOptions::default()).unwrap();
        assert_eq!(out["body"], json!("Hello Big World"));
    }

    #[test]
    fn strict_mode_raises_on_missing_replace_target() {
        let state = json!({});
        let ops = vec![JsonPatchOp::replace("/missing", json!(1))];
        assert!(apply(&state, &ops, ApplyOptions::default()).is_err());
    }

    #[test]
    fn partial_mode_skips_failing_op_and_keeps_going() {
        let state = json!({"a": 1});
        let ops = vec![
            JsonPatchOp::replace("/missing", json!(1)),
            JsonPatchOp::replace("/a", json!(2)),
        ];
        let options = ApplyOptions { strict: true, partial: true };
        let out = apply(&state, &ops, options).unwrap();
        assert_eq!(out, json!({"a": 2}));
    }

    #[test]
    fn state_is_not_mutated_in_place() {
        let state = json!({"a": 1});
        let ops = vec![JsonPatchOp::replace("/a", json!(2))];
        let _ = apply(&state, &ops, ApplyOptions::default()).unwrap();
        assert_eq!(state, json!({"a": 1}));
    }
}
