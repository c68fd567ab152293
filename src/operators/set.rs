//! Set operators.
//!
//! Arrays are treated as sets under canonical equality: duplicates collapse
//! and element order of the result follows first occurrence in the inputs.

use indexmap::IndexMap;

use crate::canonical::canonical_key;
use crate::error::{Error, Result};
use crate::operators::{exactly, expect_array, ok, one, OpCtx};
use crate::value::Value;

fn as_set(v: &Value, op: &str) -> Result<IndexMap<String, Value>> {
    let items = expect_array(v, op)?;
    let mut set = IndexMap::new();
    for item in items {
        set.entry(canonical_key(item, None)).or_insert_with(|| item.clone());
    }
    Ok(set)
}

pub fn set_equals(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    if args.len() < 2 {
        return Err(Error::InvalidSpec("$setEquals expects at least 2 arguments".to_string()));
    }
    let first = as_set(&args[0], "$setEquals")?;
    for v in &args[1..] {
        let other = as_set(v, "$setEquals")?;
        if other.len() != first.len() || !other.keys().all(|k| first.contains_key(k)) {
            return ok(Value::Bool(false));
        }
    }
    ok(Value::Bool(true))
}

pub fn set_intersection(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let mut iter = args.iter();
    let mut acc = match iter.next() {
        Some(v) => as_set(v, "$setIntersection")?,
        None => IndexMap::new(),
    };
    for v in iter {
        let other = as_set(v, "$setIntersection")?;
        acc.retain(|k, _| other.contains_key(k));
    }
    ok(Value::Array(acc.into_values().collect()))
}

pub fn set_union(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let mut acc = IndexMap::new();
    for v in args {
        for (k, item) in as_set(v, "$setUnion")? {
            acc.entry(k).or_insert(item);
        }
    }
    ok(Value::Array(acc.into_values().collect()))
}

pub fn set_difference(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let args = exactly(args, 2, "$setDifference")?;
    let mut left = as_set(&args[0], "$setDifference")?;
    let right = as_set(&args[1], "$setDifference")?;
    left.retain(|k, _| !right.contains_key(k));
    ok(Value::Array(left.into_values().collect()))
}

pub fn set_is_subset(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let args = exactly(args, 2, "$setIsSubset")?;
    let left = as_set(&args[0], "$setIsSubset")?;
    let right = as_set(&args[1], "$setIsSubset")?;
    ok(Value::Bool(left.keys().all(|k| right.contains_key(k))))
}

/// The single argument is an array of arrays in the spec language, so after
/// positional evaluation the element array arrives as the only argument.
fn element_array<'v>(args: &'v [Value], op: &str) -> Result<&'v [Value]> {
    expect_array(one(args, op)?, op)
}

pub fn any_element_true(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let items = element_array(args, "$anyElementTrue")?;
    ok(Value::Bool(items.iter().any(Value::is_truthy)))
}

pub fn all_elements_true(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let items = element_array(args, "$allElementsTrue")?;
    ok(Value::Bool(items.iter().all(Value::is_truthy)))
}
