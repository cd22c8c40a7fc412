//! Consolidation rules shared by the LWW client's pending-ops map (§4.3)
//! and the server's per-path merge (§4.5): ancestor/descendant path
//! walking, same-path merge-by-timestamp, and the fold rules for the
//! extended operators.

use std::collections::HashMap;

use crate::patch::{pointer, text, JsonPatchOp, OpType};
use crate::{Path, Timestamp};

/// Fold `incoming` into the map of pending ops the client has authored
/// locally but not yet sent, per §4.3. Mutates `pending` in place.
pub fn consolidate_client(pending: &mut HashMap<Path, JsonPatchOp>, mut incoming: JsonPatchOp, now: Timestamp) {
    if incoming.ts.is_none() {
        incoming.ts = Some(now);
    }

    // New op is an ancestor of existing entries: those entries are about
    // to be overwritten wholesale, so drop them.
    let descendants: Vec<Path> = pending
        .keys()
        .filter(|existing_path| pointer::is_ancestor(&incoming.path, existing_path))
        .cloned()
        .collect();
    for path in descendants {
        pending.remove(&path);
    }

    // New op is a descendant of an existing entry: keep both (the
    // ancestor write already established a container; this refines a
    // field inside it). Collision with a *primitive* ancestor is a
    // server-side self-heal concern (§4.5), not a client-side one.
    let has_ancestor = pending.keys().any(|existing_path| pointer::is_ancestor(existing_path, &incoming.path));
    if has_ancestor {
        pending.insert(incoming.path.clone(), incoming);
        return;
    }

    match pending.remove(&incoming.path) {
        Some(existing) => {
            let merged = merge_same_path(&existing, &incoming);
            pending.insert(incoming.path.clone(), merged);
        }
        None => {
            pending.insert(incoming.path.clone(), incoming);
        }
    }
}

/// Merge two ops addressing the same path, applying the same-path rules
/// from both §4.3 (client consolidation) and §4.5 step 2 (server
/// consolidation): `@inc`/`@bit`(OR) fold additively; `replace`/`remove`/
/// `@max`/`@min`/`@bit`(indexed) resolve by latest `ts` (ties favor the
/// incoming op); `@txt` composes.
pub fn merge_same_path(existing: &JsonPatchOp, incoming: &JsonPatchOp) -> JsonPatchOp {
    match (existing.op, incoming.op) {
        (OpType::Inc, OpType::Inc) => {
            let sum = existing.value.as_ref().and_then(|v| v.as_f64()).unwrap_or(0.0)
                + incoming.value.as_ref().and_then(|v| v.as_f64()).unwrap_or(0.0);
            let mut out = incoming.clone();
            out.value = Some(serde_json::Value::from(sum));
            out
        }
        (OpType::Bit, OpType::Bit) if existing.index.is_none() && incoming.index.is_none() => {
            let mask = existing.value.as_ref().and_then(|v| v.as_u64()).unwrap_or(0)
                | incoming.value.as_ref().and_then(|v| v.as_u64()).unwrap_or(0);
            let mut out = incoming.clone();
            out.value = Some(serde_json::Value::from(mask));
            out
        }
        (OpType::Txt, OpType::Txt) => {
            let a: text::Delta = existing
                .value
                .as_ref()
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();
            let b: text::Delta = incoming
                .value
                .as_ref()
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();
            let composed = text::compose_delta(&a, &b);
            let mut out = incoming.clone();
            out.value = Some(serde_json::to_value(composed).expect("delta serializes"));
            out
        }
        _ => {
            let existing_ts = existing.ts.unwrap_or(0);
            let incoming_ts = incoming.ts.unwrap_or(0);
            if incoming_ts >= existing_ts {
                incoming.clone()
            } else {
                existing.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ancestor_write_drops_descendant_entries() {
        let mut pending = HashMap::new();
        pending.insert("/obj/name".to_string(), JsonPatchOp::replace("/obj/name", json!("Alice")).with_ts(1));
        consolidate_client(&mut pending, JsonPatchOp::replace("/obj", json!({"name": "Bob"})).with_ts(2), 100);
        assert_eq!(pending.len(), 1);
        assert!(pending.contains_key("/obj"));
    }

    #[test]
    fn descendant_of_existing_ancestor_keeps_both() {
        let mut pending = HashMap::new();
        pending.insert("/obj".to_string(), JsonPatchOp::replace("/obj", json!({})).with_ts(1));
        consolidate_client(&mut pending, JsonPatchOp::replace("/obj/name", json!("Alice")).with_ts(2), 100);
        assert_eq!(pending.len(), 2);
    }

    #[test]
    fn inc_merges_additively_on_same_path() {
        let mut pending = HashMap::new();
        consolidate_client(&mut pending, JsonPatchOp::inc("/count", 2.0).with_ts(1), 100);
        consolidate_client(&mut pending, JsonPatchOp::inc("/count", 3.0).with_ts(2), 100);
        assert_eq!(pending["/count"].value, Some(json!(5.0)));
    }

    #[test]
    fn replace_overwrites_by_latest_ts_regardless_of_order() {
        let mut pending = HashMap::new();
        consolidate_client(&mut pending, JsonPatchOp::replace("/name", json!("Bob")).with_ts(1500), 100);
        consolidate_client(&mut pending, JsonPatchOp::replace("/name", json!("Alice")).with_ts(1000), 100);
        assert_eq!(pending["/name"].value, Some(json!("Bob")));
    }
}
