use nutmeg::path::{assign, remove, resolve};
use nutmeg::Value;

fn doc(v: serde_json::Value) -> Value {
    v.into()
}

fn json(v: Value) -> serde_json::Value {
    v.into()
}

// ========================================================================
// Resolution
// ========================================================================

#[test]
fn test_resolve_simple_field() {
    let d = doc(serde_json::json!({"name": "Ada", "age": 36}));
    assert_eq!(resolve(&d, "name"), Some(Value::String("Ada".into())));
    assert_eq!(resolve(&d, "age"), Some(Value::Int(36)));
}

#[test]
fn test_resolve_nested_field() {
    let d = doc(serde_json::json!({"user": {"profile": {"email": "a@b.c"}}}));
    assert_eq!(
        resolve(&d, "user.profile.email"),
        Some(Value::String("a@b.c".into()))
    );
}

#[test]
fn test_resolve_missing_is_none() {
    let d = doc(serde_json::json!({"a": 1}));
    assert_eq!(resolve(&d, "b"), None);
    assert_eq!(resolve(&d, "a.b.c"), None);
}

#[test]
fn test_resolve_null_is_not_missing() {
    let d = doc(serde_json::json!({"a": null}));
    assert_eq!(resolve(&d, "a"), Some(Value::Null));
}

#[test]
fn test_resolve_array_index() {
    let d = doc(serde_json::json!({"items": [10, 20, 30]}));
    assert_eq!(resolve(&d, "items.1"), Some(Value::Int(20)));
    assert_eq!(resolve(&d, "items.9"), None);
}

#[test]
fn test_resolve_maps_across_array() {
    let d = doc(serde_json::json!({"items": [{"p": 1}, {"p": 2}, {"q": 3}]}));
    // elements without the field are omitted, not nulled
    assert_eq!(json(resolve(&d, "items.p").unwrap()), serde_json::json!([1, 2]));
}

#[test]
fn test_resolve_deep_array_mapping() {
    let d = doc(serde_json::json!({"a": [{"b": [{"c": 1}, {"c": 2}]}, {"b": [{"c": 3}]}]}));
    assert_eq!(
        json(resolve(&d, "a.b.c").unwrap()),
        serde_json::json!([[1, 2], [3]])
    );
}

#[test]
fn test_resolve_index_then_field() {
    let d = doc(serde_json::json!({"a": [{"c": 1}, {"c": 2}]}));
    assert_eq!(resolve(&d, "a.1.c"), Some(Value::Int(2)));
}

#[test]
fn test_numeric_segment_on_document_matches_key() {
    let d = doc(serde_json::json!({"a": {"0": "zero"}}));
    assert_eq!(resolve(&d, "a.0"), Some(Value::String("zero".into())));
}

#[test]
fn test_resolve_empty_path_is_identity() {
    let d = doc(serde_json::json!({"a": 1}));
    assert_eq!(resolve(&d, ""), Some(d.clone()));
}

// ========================================================================
// Assignment
// ========================================================================

#[test]
fn test_assign_creates_intermediates() {
    let mut d = doc(serde_json::json!({}));
    assign(&mut d, "a.b.c", Value::Int(7));
    assert_eq!(json(d), serde_json::json!({"a": {"b": {"c": 7}}}));
}

#[test]
fn test_assign_extends_array() {
    let mut d = doc(serde_json::json!({"a": [1]}));
    assign(&mut d, "a.3", Value::Int(9));
    assert_eq!(json(d), serde_json::json!({"a": [1, null, null, 9]}));
}

#[test]
fn test_assign_replicates_into_array_elements() {
    let mut d = doc(serde_json::json!({"items": [{"p": 1}, {"p": 2}]}));
    assign(&mut d, "items.flag", Value::Bool(true));
    assert_eq!(
        json(d),
        serde_json::json!({"items": [{"p": 1, "flag": true}, {"p": 2, "flag": true}]})
    );
}

#[test]
fn test_assign_through_scalar_is_skipped() {
    let mut d = doc(serde_json::json!({"a": 5}));
    assign(&mut d, "a.b", Value::Int(1));
    assert_eq!(json(d), serde_json::json!({"a": 5}));
}

#[test]
fn test_assign_preserves_key_order() {
    let mut d = doc(serde_json::json!({"z": 1, "a": 2}));
    assign(&mut d, "m", Value::Int(3));
    let Value::Object(map) = d else { panic!("expected document") };
    let keys: Vec<&str> = map.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["z", "a", "m"]);
}

// ========================================================================
// Removal
// ========================================================================

#[test]
fn test_remove_leaf() {
    let mut d = doc(serde_json::json!({"a": {"b": 1, "c": 2}}));
    remove(&mut d, "a.b");
    assert_eq!(json(d), serde_json::json!({"a": {"c": 2}}));
}

#[test]
fn test_remove_missing_is_noop() {
    let mut d = doc(serde_json::json!({"a": 1}));
    remove(&mut d, "x.y");
    assert_eq!(json(d), serde_json::json!({"a": 1}));
}

#[test]
fn test_remove_does_not_collapse_empty_containers() {
    let mut d = doc(serde_json::json!({"a": {"b": 1}}));
    remove(&mut d, "a.b");
    assert_eq!(json(d), serde_json::json!({"a": {}}));
}

#[test]
fn test_remove_maps_across_array() {
    let mut d = doc(serde_json::json!({"items": [{"p": 1, "q": 2}, {"p": 3}]}));
    remove(&mut d, "items.p");
    assert_eq!(json(d), serde_json::json!({"items": [{"q": 2}, {}]}));
}

#[test]
fn test_remove_array_index() {
    let mut d = doc(serde_json::json!({"a": [1, 2, 3]}));
    remove(&mut d, "a.1");
    assert_eq!(json(d), serde_json::json!({"a": [1, 3]}));
}

// ========================================================================
// Round-trip invariant
// ========================================================================

#[test]
fn test_assign_then_remove_restores_document() {
    let original = doc(serde_json::json!({"a": {"b": 1}, "c": [1, 2]}));
    let mut d = original.clone();
    assign(&mut d, "a.x", Value::String("tmp".into()));
    remove(&mut d, "a.x");
    assert_eq!(d, original);
}
