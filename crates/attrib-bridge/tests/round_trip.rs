// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Encoding a tree and rebuilding it through the arena port must be lossless.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use attrib_bridge::{encode_with, ArenaBoundary, BoundaryCall, RecordingBoundary, Target};
use attrib_value::{Dictionary, ScalarKind, Value};
use proptest::prelude::*;

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        "[ -~]{0,12}".prop_map(Value::Str),
        any::<i32>().prop_map(Value::I32),
        any::<i64>().prop_map(Value::I64),
        any::<f32>()
            .prop_filter("finite", |f| f.is_finite())
            .prop_map(Value::F32),
        any::<f64>()
            .prop_filter("finite", |f| f.is_finite())
            .prop_map(Value::F64),
    ]
}

fn tree() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::vec(("[a-z]{1,6}", inner), 0..6)
                .prop_map(|entries| Value::Dict(entries.into_iter().collect())),
        ]
    })
}

fn root() -> impl Strategy<Value = Dictionary> {
    prop::collection::vec(("[a-z]{1,6}", tree()), 0..8)
        .prop_map(|entries| entries.into_iter().collect())
}

proptest! {
    #[test]
    fn encode_then_rebuild_is_identity(root in root()) {
        let mut arena = ArenaBoundary::new();
        let rebuilt = encode_with(&mut arena, &root, ArenaBoundary::take_root)
            .expect("unbounded arena never fails");
        prop_assert_eq!(&rebuilt, &root);
        prop_assert!(arena.violations().is_empty(), "{:?}", arena.violations());
        prop_assert_eq!(arena.live_containers(), 0);
    }

    #[test]
    fn every_session_is_bracketed(root in root()) {
        let mut rec = RecordingBoundary::default();
        encode_with(&mut rec, &root, |_| ()).expect("recorder never fails");
        let calls = rec.calls();
        prop_assert_eq!(calls.first(), Some(&BoundaryCall::BeginSession));
        prop_assert_eq!(calls.last(), Some(&BoundaryCall::ReleaseAll));
        let allocs = calls.iter().filter(|c| matches!(c, BoundaryCall::Allocate { .. })).count();
        let links = calls.iter().filter(|c| matches!(c, BoundaryCall::LinkChild { .. })).count();
        prop_assert_eq!(allocs, links);
    }
}

#[test]
fn null_value_is_not_a_missing_key() {
    let with_null: Dictionary = [("a", Value::Null)].into_iter().collect();
    let mut arena = ArenaBoundary::new();

    let rebuilt = encode_with(&mut arena, &with_null, ArenaBoundary::take_root).expect("encode");
    assert!(rebuilt.contains_key("a"));
    assert_eq!(rebuilt.get("a"), Some(&Value::Null));

    let empty =
        encode_with(&mut arena, &Dictionary::new(), ArenaBoundary::take_root).expect("encode");
    assert_ne!(rebuilt, empty);
}

#[test]
fn null_is_pushed_with_null_kind_and_empty_payload() {
    let root: Dictionary = [("a", Value::Null)].into_iter().collect();
    let mut rec = RecordingBoundary::default();
    encode_with(&mut rec, &root, |_| ()).expect("encode");
    assert_eq!(rec.calls()[1], BoundaryCall::push_root("a", ScalarKind::Null, ""));
}

#[test]
fn float_payload_uses_a_decimal_point() {
    let root: Dictionary = [("price", Value::F64(1.235)), ("ratio", Value::F32(1.235))]
        .into_iter()
        .collect();
    let mut rec = RecordingBoundary::default();
    encode_with(&mut rec, &root, |_| ()).expect("encode");
    assert_eq!(rec.calls()[1], BoundaryCall::push_root("price", ScalarKind::Float64, "1.235"));
    assert_eq!(rec.calls()[2], BoundaryCall::push_root("ratio", ScalarKind::Float32, "1.235"));
}

#[test]
fn nested_array_of_dicts_links_by_append() {
    let doc = serde_json::json!({"items": [{"sku": "a"}, {"sku": "b"}]});
    let root = Dictionary::from_json_str(&doc.to_string()).expect("object");
    let mut rec = RecordingBoundary::default();
    encode_with(&mut rec, &root, |_| ()).expect("encode");

    let appends = rec
        .calls()
        .iter()
        .filter(|c| matches!(c, BoundaryCall::LinkChild { target: Target::Append(_), .. }))
        .count();
    assert_eq!(appends, 2);
}

#[test]
fn failed_allocation_still_releases() {
    let root: Dictionary = [("a", Value::Array(vec![Value::from(vec![1])]))]
        .into_iter()
        .collect();
    let mut rec = RecordingBoundary::failing_at(1);
    let err = encode_with(&mut rec, &root, |_| ()).unwrap_err();
    assert!(err.to_string().contains("depth 2"), "{err}");
    assert_eq!(rec.calls().last(), Some(&BoundaryCall::ReleaseAll));
    assert!(!rec
        .calls()
        .iter()
        .any(|c| matches!(c, BoundaryCall::LinkChild { .. })));
}
