use std::cmp::Ordering;

use nutmeg::collation::{Collation, Collator};
use nutmeg::{aggregate, Options, Value};

fn docs(v: serde_json::Value) -> Vec<Value> {
    match Value::from(v) {
        Value::Array(items) => items,
        _ => panic!("fixture must be an array"),
    }
}

fn collation(json: serde_json::Value) -> Collation {
    serde_json::from_value(json).unwrap()
}

// ========================================================================
// Comparator behavior
// ========================================================================

#[test]
fn test_strength_one_ignores_case() {
    let c = collation(serde_json::json!({"locale": "en", "strength": 1}));
    let col = c.collator();
    assert_eq!(col.compare("Hello", "hello"), Ordering::Equal);
    assert_eq!(col.compare("abc", "abd"), Ordering::Less);
}

#[test]
fn test_strength_three_breaks_ties_by_case() {
    let c = collation(serde_json::json!({"locale": "en", "strength": 3, "caseFirst": "upper"}));
    let col = c.collator();
    assert_eq!(col.compare("Apple", "apple"), Ordering::Less);

    let lower_first = collation(
        serde_json::json!({"locale": "en", "strength": 3, "caseFirst": "lower"}),
    );
    assert_eq!(lower_first.collator().compare("Apple", "apple"), Ordering::Greater);
}

#[test]
fn test_case_level_at_primary_strength() {
    let c = collation(serde_json::json!({"locale": "en", "strength": 1, "caseLevel": true}));
    assert_ne!(c.collator().compare("A", "a"), Ordering::Equal);
}

#[test]
fn test_numeric_ordering_compares_digit_runs() {
    let c = collation(serde_json::json!({"locale": "en", "numericOrdering": true}));
    let col = c.collator();
    assert_eq!(col.compare("item9", "item10"), Ordering::Less);
    assert_eq!(col.compare("v2.10", "v2.9"), Ordering::Greater);
}

#[test]
fn test_byte_order_without_numeric_ordering() {
    let c = collation(serde_json::json!({"locale": "en"}));
    // lexicographic: "10" < "9"
    assert_eq!(c.collator().compare("item10", "item9"), Ordering::Less);
}

#[test]
fn test_sort_key_equality_matches_compare() {
    let c = collation(serde_json::json!({"locale": "en", "strength": 1, "numericOrdering": true}));
    let col = c.collator();
    assert_eq!(col.sort_key("File07"), col.sort_key("file07"));
    assert_ne!(col.sort_key("file07"), col.sort_key("file7"));
}

// ========================================================================
// Collation through the pipeline
// ========================================================================

#[test]
fn test_sort_preserves_order_of_case_equivalent_strings() {
    // strength 1: A/a and B/b fold together; stability keeps input order
    let options = Options::new()
        .with_collation(collation(serde_json::json!({"locale": "en", "strength": 1})));
    let out = aggregate(
        &docs(serde_json::json!([{"n": "A"}, {"n": "a"}, {"n": "B"}, {"n": "b"}])),
        &serde_json::json!([{"$sort": {"n": 1}}]).into(),
        options,
    )
    .unwrap();
    let names: Vec<serde_json::Value> = out.into_iter().map(Into::into).collect();
    assert_eq!(
        serde_json::Value::Array(names),
        serde_json::json!([{"n": "A"}, {"n": "a"}, {"n": "B"}, {"n": "b"}])
    );
}

#[test]
fn test_sort_numeric_ordering_on_strings() {
    let options = Options::new().with_collation(collation(
        serde_json::json!({"locale": "en", "numericOrdering": true}),
    ));
    let out = aggregate(
        &docs(serde_json::json!([{"v": "x10"}, {"v": "x2"}, {"v": "x1"}])),
        &serde_json::json!([{"$sort": {"v": 1}}]).into(),
        options,
    )
    .unwrap();
    let rows: Vec<serde_json::Value> = out.into_iter().map(Into::into).collect();
    assert_eq!(
        serde_json::Value::Array(rows),
        serde_json::json!([{"v": "x1"}, {"v": "x2"}, {"v": "x10"}])
    );
}

#[test]
fn test_group_folds_keys_under_collation() {
    let options = Options::new()
        .with_collation(collation(serde_json::json!({"locale": "en", "strength": 2})));
    let out = aggregate(
        &docs(serde_json::json!([{"c": "red"}, {"c": "RED"}, {"c": "blue"}])),
        &serde_json::json!([{"$group": {"_id": "$c", "n": {"$count": {}}}}]).into(),
        options,
    )
    .unwrap();
    assert_eq!(out.len(), 2);
}

#[test]
fn test_comparison_operators_respect_collation() {
    let options = Options::new()
        .with_collation(collation(serde_json::json!({"locale": "en", "strength": 1})));
    let out = nutmeg::compute_expr(
        &serde_json::json!({}).into(),
        &serde_json::json!({"$eq": ["HELLO", "hello"]}).into(),
        &options,
    )
    .unwrap();
    assert_eq!(out, Value::Bool(true));
}

#[test]
fn test_shifted_alternate_ignores_punctuation() {
    let c = collation(serde_json::json!({"locale": "en", "strength": 1, "alternate": "shifted"}));
    assert_eq!(c.collator().compare("off-site", "offsite"), Ordering::Equal);
}
