//! Edge case tests for syncpatch-core.
//!
//! These cover boundary conditions and unusual inputs that the inline
//! `#[cfg(test)]` modules don't already exercise: unicode/large payloads,
//! JSON-Pointer escaping, deeply nested values, and scale (many ops,
//! many documents).

use serde_json::json;
use syncpatch_core::ot::{InMemoryOtServerStore, OtCoordinator, OtCoordinatorConfig};
use syncpatch_core::patch::{apply, ApplyOptions, JsonPatchOp};
use syncpatch_core::{new_change_id, new_doc_id, Change};

fn coordinator() -> OtCoordinator<InMemoryOtServerStore> {
    OtCoordinator::new(InMemoryOtServerStore::new(), OtCoordinatorConfig::default())
}

// ============================================================================
// String edge cases
// ============================================================================

#[test]
fn empty_string_value() {
    let state = json!({});
    let ops = vec![JsonPatchOp::add("/name", json!(""))];
    let out = apply(&state, &ops, ApplyOptions::default()).unwrap();
    assert_eq!(out["name"], "");
}

#[test]
fn unicode_values_round_trip() {
    let names = vec!["日本語テスト", "Привет мир", "مرحبا بالعالم", "🎉🚀💯", "Ω≈ç√∫", "Hello\nWorld\tTab"];
    for name in names {
        let state = json!({});
        let ops = vec![JsonPatchOp::add("/name", json!(name))];
        let out = apply(&state, &ops, ApplyOptions::default()).unwrap();
        assert_eq!(out["name"], name, "failed for {name:?}");
    }
}

#[test]
fn very_long_string_value() {
    let long_string = "x".repeat(1024 * 1024);
    let state = json!({});
    let ops = vec![JsonPatchOp::add("/blob", json!(long_string.clone()))];
    let out = apply(&state, &ops, ApplyOptions::default()).unwrap();
    assert_eq!(out["blob"].as_str().unwrap().len(), 1024 * 1024);
}

// ============================================================================
// JSON-Pointer escaping
// ============================================================================

#[test]
fn tilde_and_slash_escaped_in_path() {
    // Key literally named "a/b~c" is encoded as "a~1b~0c" in the pointer.
    let state = json!({});
    let ops = vec![JsonPatchOp::add("/a~1b~0c", json!("value"))];
    let out = apply(&state, &ops, ApplyOptions::default()).unwrap();
    assert_eq!(out["a/b~c"], "value");
}

#[test]
fn path_with_special_characters_in_key() {
    let state = json!({});
    let keys = vec!["with-dash", "with_underscore", "with.dot", "with spaces", "123numeric"];
    let mut ops = Vec::new();
    for key in &keys {
        ops.push(JsonPatchOp::add(format!("/{key}"), json!(*key)));
    }
    let out = apply(&state, &ops, ApplyOptions::default()).unwrap();
    for key in &keys {
        assert_eq!(out[*key], *key);
    }
}

// ============================================================================
// Deeply nested / complex JSON
// ============================================================================

#[test]
fn deeply_nested_json_value() {
    let mut nested = json!({"value": "leaf"});
    for _ in 0..50 {
        nested = json!({"nested": nested});
    }
    let state = json!({});
    let ops = vec![JsonPatchOp::add("/data", nested.clone())];
    let out = apply(&state, &ops, ApplyOptions::default()).unwrap();
    assert_eq!(out["data"], nested);
}

#[test]
fn json_with_every_primitive_type() {
    let complex = json!({
        "string": "hello",
        "number": 42,
        "float": 3.14159,
        "bool_true": true,
        "bool_false": false,
        "null": null,
        "array": [1, 2, 3, "mixed", true, null],
        "object": {"a": 1, "b": "two"},
        "empty_array": [],
        "empty_object": {},
    });
    let state = json!({});
    let ops = vec![JsonPatchOp::add("/data", complex.clone())];
    let out = apply(&state, &ops, ApplyOptions::default()).unwrap();
    assert_eq!(out["data"], complex);
}

// ============================================================================
// Numeric edge cases for the extended operators
// ============================================================================

#[test]
fn inc_at_f64_precision_boundary() {
    // 2^53 and 2^53 + 2 are both exactly representable in f64; picking
    // an even increment avoids depending on round-to-even behavior for
    // the (inexact) odd values between them.
    let state = json!({"count": 9_007_199_254_740_992i64}); // 2^53
    let ops = vec![JsonPatchOp::inc("/count", 2.0)];
    let out = apply(&state, &ops, ApplyOptions::default()).unwrap();
    assert_eq!(out["count"], 9_007_199_254_740_994i64 as f64);
}

#[test]
fn bit_or_with_all_bits_set() {
    let state = json!({"flags": 0});
    let ops = vec![JsonPatchOp::bit_or("/flags", u64::MAX)];
    let out = apply(&state, &ops, ApplyOptions::default()).unwrap();
    assert_eq!(out["flags"].as_u64().unwrap(), u64::MAX);
}

// ============================================================================
// Scale: many ops, many documents
// ============================================================================

#[tokio::test]
async fn many_sequential_commits_on_one_doc() {
    let coord = coordinator();
    let doc_id = new_doc_id();
    let mut rev = 0u64;
    for i in 0..500u64 {
        let change = Change::pending(new_change_id(), vec![JsonPatchOp::replace("/counter", json!(i))], rev, 1000 + i);
        let committed = coord.commit_changes(&doc_id, vec![change], 1000 + i).await.unwrap();
        rev = committed[0].rev;
    }
    let (state, final_rev) = coord.get_doc(&doc_id, None).await.unwrap();
    assert_eq!(final_rev, 500);
    assert_eq!(state["counter"], 499);
}

#[tokio::test]
async fn many_independent_documents_do_not_interfere() {
    let coord = coordinator();
    let doc_ids: Vec<String> = (0..100).map(|_| new_doc_id()).collect();
    for (i, doc_id) in doc_ids.iter().enumerate() {
        let change = Change::pending(new_change_id(), vec![JsonPatchOp::add("/n", json!(i))], 0, 1000);
        coord.commit_changes(doc_id, vec![change], 1000).await.unwrap();
    }
    for (i, doc_id) in doc_ids.iter().enumerate() {
        let (state, rev) = coord.get_doc(doc_id, None).await.unwrap();
        assert_eq!(rev, 1);
        assert_eq!(state["n"], i);
    }
}

// ============================================================================
// Id generation edge cases
// ============================================================================

#[test]
fn generated_ids_are_url_and_json_safe() {
    // The 62-char alphanumeric alphabet never needs escaping in a JSON
    // string or a URL path segment, unlike UUIDs with dashes.
    for _ in 0..1000 {
        let doc_id = new_doc_id();
        assert!(doc_id.chars().all(|c| c.is_ascii_alphanumeric()));
        let change_id = new_change_id();
        assert!(change_id.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
