//! The `JSONPatchOp` record: RFC 6902 ops plus the five extended
//! operators (`@inc`, `@bit`, `@max`, `@min`, `@txt`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Timestamp;

/// The operation kind, serialized exactly as the wire/storage token
/// (including the `@`-prefixed extended operators).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpType {
    #[serde(rename = "add")]
    Add,
    #[serde(rename = "remove")]
    Remove,
    #[serde(rename = "replace")]
    Replace,
    #[serde(rename = "copy")]
    Copy,
    #[serde(rename = "move")]
    Move,
    #[serde(rename = "test")]
    Test,
    #[serde(rename = "@inc")]
    Inc,
    #[serde(rename = "@bit")]
    Bit,
    #[serde(rename = "@max")]
    Max,
    #[serde(rename = "@min")]
    Min,
    #[serde(rename = "@txt")]
    Txt,
}

impl OpType {
    /// True for the five CRDT-like extended operators.
    pub fn is_extended(self) -> bool {
        matches!(self, OpType::Inc | OpType::Bit | OpType::Max | OpType::Min | OpType::Txt)
    }
}

/// One JSON-Patch-style operation. `from` is only meaningful for `copy`
/// and `move`; `value` carries the operand for every other op (including
/// the extended operators, where it holds the increment, bitmask, or
/// delta as appropriate); `index` is only used by `@bit` to address a
/// single bit rather than OR in a mask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonPatchOp {
    pub op: OpType,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ts: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub soft: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub index: Option<u32>,
}

impl JsonPatchOp {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self::new(OpType::Add, path).with_value(value)
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self::new(OpType::Remove, path)
    }

    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self::new(OpType::Replace, path).with_value(value)
    }

    pub fn test(path: impl Into<String>, value: Value) -> Self {
        Self::new(OpType::Test, path).with_value(value)
    }

    pub fn copy(from: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(OpType::Copy, path).with_from(from)
    }

    pub fn move_op(from: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(OpType::Move, path).with_from(from)
    }

    pub fn inc(path: impl Into<String>, amount: f64) -> Self {
        Self::new(OpType::Inc, path).with_value(Value::from(amount))
    }

    pub fn bit_or(path: impl Into<String>, mask: u64) -> Self {
        Self::new(OpType::Bit, path).with_value(Value::from(mask))
    }

    pub fn bit_set(path: impl Into<String>, index: u32, set: bool) -> Self {
        let mut op = Self::new(OpType::Bit, path).with_value(Value::from(set));
        op.index = Some(index);
        op
    }

    pub fn max(path: impl Into<String>, value: Value) -> Self {
        Self::new(OpType::Max, path).with_value(value)
    }

    pub fn min(path: impl Into<String>, value: Value) -> Self {
        Self::new(OpType::Min, path).with_value(value)
    }

    pub fn txt(path: impl Into<String>, delta: Value) -> Self {
        Self::new(OpType::Txt, path).with_value(delta)
    }

    fn new(op: OpType, path: impl Into<String>) -> Self {
        JsonPatchOp {
            op,
            path: path.into(),
            from: None,
            value: None,
            ts: None,
            soft: None,
            index: None,
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn with_ts(mut self, ts: Timestamp) -> Self {
        self.ts = Some(ts);
        self
    }

    pub fn soft(mut self) -> Self {
        self.soft = Some(true);
        self
    }

    pub fn is_soft(&self) -> bool {
        self.soft.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_extended_op_with_at_prefix() {
        let op = JsonPatchOp::inc("/count", 3.0);
        let json = serde_json::to_string(&op).unwrap();
        assert!(json.contains("\"op\":\"@inc\""));
        assert!(json.contains("\"path\":\"/count\""));
    }

    #[test]
    fn round_trips_through_json() {
        let op = JsonPatchOp::replace("/title", Value::from("World")).with_ts(1001);
        let json = serde_json::to_string(&op).unwrap();
        let back: JsonPatchOp = serde_json::from_str(&json).unwrap();
        assert_eq!(op, back);
    }

    #[test]
    fn bit_set_carries_index() {
        let op = JsonPatchOp::bit_set("/flags", 3, true);
        assert_eq!(op.index, Some(3));
        assert_eq!(op.value, Some(Value::from(true)));
    }
}
