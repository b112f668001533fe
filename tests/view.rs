mod common;

use std::fs;
use std::sync::Arc;

use json_index_cache::{Error, IndexCache, LazyValue, Navigate};
use serde_json::{json, Value};

#[test]
fn test_navigation_matches_eager_parse() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.json");
    fs::write(&path, r#"{"a": [1, {"b": "x"}, 3]}"#).unwrap();

    let view = json_index_cache::load(&path).unwrap();
    let b = view.get("a").unwrap().get(1usize).unwrap().get("b").unwrap();
    assert_eq!(b.as_leaf(), Some(&json!("x")));
    assert_eq!(*b.materialize().unwrap(), json!("x"));
    assert_eq!(*view.pointer("/a/2").unwrap().materialize().unwrap(), json!(3));
    assert_eq!(
        *view.get("a").unwrap().materialize().unwrap(),
        json!([1, {"b": "x"}, 3])
    );

    assert!(matches!(
        view.get("a").unwrap().get(3usize),
        Err(Error::OutOfRange { .. })
    ));
    assert!(matches!(view.get("zz"), Err(Error::OutOfRange { .. })));
    assert!(matches!(view.get(0usize), Err(Error::OutOfRange { .. })));
}

/// Walks `value` alongside its eager counterpart, checking every child on the way down.
fn check_tree(value: &LazyValue<'_>, expected: &Value) {
    assert_eq!(*value.materialize().unwrap(), *expected);
    match expected {
        Value::Object(map) => {
            let object = value.as_object().unwrap();
            assert_eq!(object.len(), map.len());
            for (key, child) in map {
                check_tree(&object.get_key(key).unwrap(), child);
            }
        }
        Value::Array(items) => {
            let array = value.as_array().unwrap();
            assert_eq!(array.len(), items.len());
            for (i, child) in items.iter().enumerate() {
                check_tree(&array.get_index(i).unwrap(), child);
            }
        }
        leaf => assert_eq!(value.as_leaf(), Some(leaf)),
    }
}

#[test]
fn test_every_path_matches_eager_parse() {
    let dir = tempfile::tempdir().unwrap();
    for seed in 10..14 {
        let path = common::write_fixture(dir.path(), &format!("doc{seed}.json"), seed, 5);
        let expected: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        let view = json_index_cache::load(&path).unwrap();
        check_tree(&view.root().unwrap(), &expected);
    }
}

#[test]
fn test_duplicate_keys_keep_last() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dup.json");
    fs::write(&path, r#"{"k":1,"k":2}"#).unwrap();

    let view = json_index_cache::load(&path).unwrap();
    assert_eq!(*view.get("k").unwrap().materialize().unwrap(), json!(2));
    assert_eq!(*view.materialize().unwrap(), json!({"k": 2}));
    assert_eq!(view.root().unwrap().len(), Some(1));
}

#[test]
fn test_views_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.json");
    fs::write(&path, r#"{"a": {"b": [1, 2]}, "c": "d"}"#).unwrap();

    let cache = IndexCache::default();
    let first = cache.load(&path).unwrap();
    let second = cache.load(&path).unwrap();
    assert_eq!(cache.scan_count(), 1);

    let a = first.get("a").unwrap().materialize().unwrap();
    assert_eq!(first.memoized_count(), 1);
    assert_eq!(second.memoized_count(), 0);

    let again = first.get("a").unwrap().materialize().unwrap();
    assert!(Arc::ptr_eq(&a, &again));
    let other = second.get("a").unwrap().materialize().unwrap();
    assert!(!Arc::ptr_eq(&a, &other));
    assert_eq!(a, other);
}

#[test]
fn test_concurrent_access() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_fixture(dir.path(), "doc.json", 3, 4);
    let expected: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    let view = json_index_cache::load(&path).unwrap();

    std::thread::scope(|scope| {
        for t in 0..4 {
            let view = &view;
            let expected = &expected;
            scope.spawn(move || {
                for i in 0..16 {
                    let key = format!("field{}", (i + t) % 16);
                    let value = view.get(&key).unwrap().materialize().unwrap();
                    assert_eq!(*value, expected[&key]);
                }
            });
        }
    });
    assert_eq!(*view.materialize().unwrap(), expected);
}
