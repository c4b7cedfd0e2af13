//! Property tests for path parsing and copy-on-write path access

use nebula_form::accessor::{delete, get, set};
use nebula_form::path::{FieldPath, normalize};
use nebula_form::{FormError, Value};
use proptest::prelude::*;
use serde_json::json;

fn arb_segment() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => "[a-z][a-zA-Z]{0,5}",
        1 => (0usize..4).prop_map(|i| i.to_string()),
    ]
}

fn arb_path() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_segment(), 1..5).prop_map(|segments| segments.join("."))
}

fn arb_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[ -~]{0,12}".prop_map(Value::from),
    ]
}

fn base_model() -> Value {
    Value::from(json!({
        "left": {"name": "Ada", "items": [1, 2, 3]},
        "right": {"theme": "dark", "nested": {"deep": true}},
    }))
}

proptest! {
    /// Whatever is written at a path can be read back from the same path.
    #[test]
    fn set_then_get_round_trips(path in arb_path(), value in arb_leaf()) {
        let root = set(&Value::object(), &path, value.clone()).unwrap();
        prop_assert_eq!(get(&root, &path).unwrap(), Some(&value));
    }

    /// Writing never changes the input tree.
    #[test]
    fn set_leaves_input_untouched(path in arb_path(), value in arb_leaf()) {
        let root = base_model();
        let before = root.to_json();
        let prefixed = format!("left.extra.{path}");
        let _ = set(&root, &prefixed, value).unwrap();
        prop_assert_eq!(root.to_json(), before);
    }

    /// Branches off the written path keep sharing storage.
    #[test]
    fn set_shares_untouched_siblings(path in arb_path(), value in arb_leaf()) {
        let root = base_model();
        let next = set(&root, &format!("left.extra.{path}"), value).unwrap();
        let before = get(&root, "right").unwrap().unwrap();
        let after = get(&next, "right").unwrap().unwrap();
        prop_assert!(after.ptr_eq(before));
    }

    /// Deleting twice is the same as deleting once.
    #[test]
    fn delete_is_idempotent(path in arb_path(), value in arb_leaf()) {
        let root = set(&Value::object(), &path, value).unwrap();
        let once = delete(&root, &path).unwrap();
        let twice = delete(&once, &path).unwrap();
        prop_assert_eq!(&once, &twice);
    }

    /// Soft normalisation always produces something the strict parser accepts.
    #[test]
    fn normalized_paths_parse(raw in "[a-z0-9.\\[\\] ]{0,16}") {
        if let Some(clean) = normalize(&raw) {
            prop_assert!(FieldPath::parse(&clean).is_ok(), "`{}` -> `{}`", raw, clean);
        }
    }
}

#[test]
fn deleting_a_missing_path_shares_the_whole_tree() {
    let root = base_model();
    let same = delete(&root, "left.nothing.here").unwrap();
    assert!(same.ptr_eq(&root));
}

#[test]
fn malformed_paths_are_hard_errors() {
    let root = base_model();
    for bad in [".left", "left.", "left..name", "left[x]"] {
        assert!(matches!(get(&root, bad), Err(FormError::InvalidPath { .. })));
        assert!(matches!(set(&root, bad, Value::Null), Err(FormError::InvalidPath { .. })));
        assert!(matches!(delete(&root, bad), Err(FormError::InvalidPath { .. })));
    }
    // An empty path addresses the root for reads and writes but cannot be deleted.
    assert!(matches!(delete(&root, ""), Err(FormError::InvalidPath { .. })));
}
