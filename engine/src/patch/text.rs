//! Delta-OT semantics for the `@txt` operator: `{retain, insert, delete}`
//! rich-text deltas composed and transformed against concurrent deltas at
//! the same path. This is a plain-text subset of the Quill/`rich-text`
//! delta model (no formatting attributes), which is all `@txt` needs.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One component of a delta: exactly one of `retain`/`insert`/`delete` is
/// set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaOp {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub retain: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub insert: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub delete: Option<usize>,
}

impl DeltaOp {
    pub fn retain(n: usize) -> Self {
        DeltaOp { retain: Some(n), insert: None, delete: None }
    }
    pub fn insert(s: impl Into<String>) -> Self {
        DeltaOp { retain: None, insert: Some(s.into()), delete: None }
    }
    pub fn delete(n: usize) -> Self {
        DeltaOp { retain: None, insert: None, delete: Some(n) }
    }

    fn len(&self) -> usize {
        if let Some(n) = self.retain {
            n
        } else if let Some(s) = &self.insert {
            s.chars().count()
        } else {
            self.delete.unwrap_or(0)
        }
    }

    fn is_insert(&self) -> bool {
        self.insert.is_some()
    }

    fn is_delete(&self) -> bool {
        self.delete.is_some()
    }
}

/// A sequence of [`DeltaOp`]s.
pub type Delta = Vec<DeltaOp>;

/// Apply a delta onto a base string, producing the resulting string.
pub fn apply_delta(base: &str, delta: &Delta) -> String {
    let chars: Vec<char> = base.chars().collect();
    let mut cursor = 0usize;
    let mut out = String::new();
    for op in delta {
        if let Some(n) = op.retain {
            let end = (cursor + n).min(chars.len());
            out.extend(&chars[cursor..end]);
            cursor = end;
        } else if let Some(s) = &op.insert {
            out.push_str(s);
        } else if let Some(n) = op.delete {
            cursor = (cursor + n).min(chars.len());
        }
    }
    if cursor < chars.len() {
        out.extend(&chars[cursor..]);
    }
    out
}

/// An iterator over a delta that can slice the current op by length,
/// following the classic `rich-text`/ot.js `Delta` iterator shape.
struct DeltaIter {
    ops: VecDeque<DeltaOp>,
}

impl DeltaIter {
    fn new(delta: &Delta) -> Self {
        DeltaIter { ops: delta.iter().cloned().collect() }
    }

    fn has_next(&self) -> bool {
        !self.ops.is_empty()
    }

    fn peek_len(&self) -> usize {
        self.ops.front().map(DeltaOp::len).unwrap_or(usize::MAX)
    }

    fn peek_is_insert(&self) -> bool {
        self.ops.front().map(DeltaOp::is_insert).unwrap_or(false)
    }

    fn peek_is_delete(&self) -> bool {
        self.ops.front().map(DeltaOp::is_delete).unwrap_or(false)
    }

    /// Consume and return the whole current op.
    fn next_full(&mut self) -> DeltaOp {
        self.ops.pop_front().expect("next_full called on empty iterator")
    }

    /// Consume `length` units from the front op, splitting it if the
    /// front op is longer than `length`.
    fn next(&mut self, length: usize) -> DeltaOp {
        let front = self.ops.front_mut().expect("next called on empty iterator");
        let front_len = front.len();
        if front_len <= length {
            return self.ops.pop_front().unwrap();
        }
        if let Some(n) = front.retain {
            front.retain = Some(n - length);
            DeltaOp::retain(length)
        } else if let Some(s) = &front.insert {
            let chars: Vec<char> = s.chars().collect();
            let (head, tail) = chars.split_at(length);
            let head: String = head.iter().collect();
            let tail: String = tail.iter().collect();
            front.insert = Some(tail);
            DeltaOp::insert(head)
        } else {
            let n = front.delete.unwrap();
            front.delete = Some(n - length);
            DeltaOp::delete(length)
        }
    }
}

fn chop(mut delta: Delta) -> Delta {
    if let Some(last) = delta.last() {
        if last.retain.is_some() {
            delta.pop();
        }
    }
    delta
}

/// Compose `b` onto `a`: the delta that, applied to a base string,
/// produces the same result as applying `a` then `b`.
pub fn compose_delta(a: &Delta, b: &Delta) -> Delta {
    let mut ai = DeltaIter::new(a);
    let mut bi = DeltaIter::new(b);
    let mut out = Delta::new();
    while ai.has_next() || bi.has_next() {
        if bi.peek_is_insert() {
            out.push(bi.next_full());
            continue;
        }
        if ai.peek_is_delete() {
            out.push(ai.next_full());
            continue;
        }
        let len = ai.peek_len().min(bi.peek_len());
        let a_op = if ai.has_next() { ai.next(len) } else { DeltaOp::retain(len) };
        let b_op = if bi.has_next() { bi.next(len) } else { DeltaOp::retain(len) };
        if b_op.retain.is_some() {
            if a_op.retain.is_some() {
                out.push(DeltaOp::retain(len));
            } else if let Some(s) = a_op.insert {
                out.push(DeltaOp::insert(s));
            }
        } else if b_op.delete.is_some() && a_op.retain.is_some() {
            out.push(DeltaOp::delete(len));
        }
        // a_op insert + b_op delete cancels out: nothing emitted.
    }
    chop(out)
}

/// Transform `b` against `a` (`a` took effect first); `a_priority`
/// breaks ties when both deltas insert at the same position.
pub fn transform_delta(a: &Delta, b: &Delta, a_priority: bool) -> Delta {
    let mut ai = DeltaIter::new(a);
    let mut bi = DeltaIter::new(b);
    let mut out = Delta::new();
    while ai.has_next() || bi.has_next() {
        if ai.peek_is_insert() && (a_priority || !bi.peek_is_insert()) {
            out.push(DeltaOp::retain(ai.next(ai.peek_len()).len()));
            continue;
        }
        if bi.peek_is_insert() {
            out.push(bi.next_full());
            continue;
        }
        let len = ai.peek_len().min(bi.peek_len());
        let a_op = if ai.has_next() { ai.next(len) } else { DeltaOp::retain(len) };
        let b_op = if bi.has_next() { bi.next(len) } else { DeltaOp::retain(len) };
        if a_op.delete.is_some() {
            // Already deleted by `a`; `b`'s op on the same range is moot.
            continue;
        } else if b_op.delete.is_some() {
            out.push(b_op);
        } else {
            out.push(DeltaOp::retain(len));
        }
    }
    chop(out)
}
