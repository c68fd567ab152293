//! Array operators.

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::operators::{any_null, exactly, expect_array, expect_int, null, ok, one, OpCtx};
use crate::value::{compare, equivalent, Document, Value};

pub fn array_elem_at(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let args = exactly(args, 2, "$arrayElemAt")?;
    if any_null(args) {
        return null();
    }
    let items = expect_array(&args[0], "$arrayElemAt")?;
    let idx = expect_int(&args[1], "$arrayElemAt")?;
    let resolved = if idx < 0 {
        items.len().checked_sub(idx.unsigned_abs() as usize)
    } else {
        Some(idx as usize)
    };
    // out of range yields missing, so `$project` drops the field
    Ok(resolved.and_then(|i| items.get(i)).cloned())
}

pub fn first(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    match one(args, "$first")? {
        Value::Null => null(),
        v => Ok(expect_array(v, "$first")?.first().cloned()),
    }
}

pub fn last(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    match one(args, "$last")? {
        Value::Null => null(),
        v => Ok(expect_array(v, "$last")?.last().cloned()),
    }
}

pub fn concat_arrays(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    if any_null(args) {
        return null();
    }
    let mut out = Vec::new();
    for v in args {
        out.extend_from_slice(expect_array(v, "$concatArrays")?);
    }
    ok(Value::Array(out))
}

/// Expression-position `$slice`: `[array, n]` or `[array, skip, n]`.
pub fn slice(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    if args.len() < 2 || args.len() > 3 {
        return Err(Error::InvalidSpec("$slice expects 2 or 3 arguments".to_string()));
    }
    if any_null(args) {
        return null();
    }
    let items = expect_array(&args[0], "$slice")?;
    let sliced: Vec<Value> = if args.len() == 2 {
        let n = expect_int(&args[1], "$slice")?;
        if n < 0 {
            let skip = items.len().saturating_sub(n.unsigned_abs() as usize);
            items[skip..].to_vec()
        } else {
            items.iter().take(n as usize).cloned().collect()
        }
    } else {
        let skip = expect_int(&args[1], "$slice")?;
        let n = expect_int(&args[2], "$slice")?;
        if n <= 0 {
            return Err(Error::InvalidSpec(
                "$slice count must be positive when a skip is given".to_string(),
            ));
        }
        let start = if skip < 0 {
            items.len().saturating_sub(skip.unsigned_abs() as usize)
        } else {
            (skip as usize).min(items.len())
        };
        items[start..].iter().take(n as usize).cloned().collect()
    };
    ok(Value::Array(sliced))
}

pub fn size(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    ok(Value::Int(expect_array(one(args, "$size")?, "$size")?.len() as i64))
}

pub fn reverse_array(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    match one(args, "$reverseArray")? {
        Value::Null => null(),
        v => {
            let mut items = expect_array(v, "$reverseArray")?.to_vec();
            items.reverse();
            ok(Value::Array(items))
        }
    }
}

pub fn is_array(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    ok(Value::Bool(matches!(one(args, "$isArray")?, Value::Array(_))))
}

pub fn index_of_array(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    if args.len() < 2 || args.len() > 4 {
        return Err(Error::InvalidSpec("$indexOfArray expects 2 to 4 arguments".to_string()));
    }
    if matches!(args[0], Value::Null) {
        return null();
    }
    let items = expect_array(&args[0], "$indexOfArray")?;
    let needle = &args[1];
    let start = match args.get(2) {
        Some(v) => expect_int(v, "$indexOfArray")?.max(0) as usize,
        None => 0,
    };
    let end = match args.get(3) {
        Some(v) => (expect_int(v, "$indexOfArray")?.max(0) as usize).min(items.len()),
        None => items.len(),
    };
    if start > end {
        return ok(Value::Int(-1));
    }
    let found = items[start..end]
        .iter()
        .position(|v| equivalent(v, needle))
        .map(|i| (start + i) as i64);
    ok(Value::Int(found.unwrap_or(-1)))
}

pub fn range(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    if args.len() < 2 || args.len() > 3 {
        return Err(Error::InvalidSpec("$range expects 2 or 3 arguments".to_string()));
    }
    let start = expect_int(&args[0], "$range")?;
    let end = expect_int(&args[1], "$range")?;
    let step = match args.get(2) {
        Some(v) => expect_int(v, "$range")?,
        None => 1,
    };
    if step == 0 {
        return Err(Error::InvalidSpec("$range step must be non-zero".to_string()));
    }
    let mut out = Vec::new();
    let mut n = start;
    while (step > 0 && n < end) || (step < 0 && n > end) {
        out.push(Value::Int(n));
        n += step;
    }
    ok(Value::Array(out))
}

pub fn zip(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let doc = match one(args, "$zip")? {
        Value::Object(doc) => doc,
        other => {
            return Err(Error::InvalidSpec(format!(
                "$zip expects a document argument, found {}",
                other.type_name()
            )));
        }
    };
    let inputs = doc
        .get("inputs")
        .ok_or_else(|| Error::InvalidSpec("$zip requires 'inputs'".to_string()))?;
    let inputs = expect_array(inputs, "$zip")?;
    let mut rows: Vec<&[Value]> = Vec::with_capacity(inputs.len());
    for input in inputs {
        if matches!(input, Value::Null) {
            return null();
        }
        rows.push(expect_array(input, "$zip")?);
    }
    if rows.is_empty() {
        return Err(Error::InvalidSpec("$zip 'inputs' must not be empty".to_string()));
    }
    let longest = doc.get("useLongestLength").is_some_and(Value::is_truthy);
    let defaults = match doc.get("defaults") {
        None | Some(Value::Null) => Vec::new(),
        Some(v) => expect_array(v, "$zip")?.to_vec(),
    };
    let len = if longest {
        rows.iter().map(|r| r.len()).max().unwrap_or(0)
    } else {
        rows.iter().map(|r| r.len()).min().unwrap_or(0)
    };
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        let tuple: Vec<Value> = rows
            .iter()
            .enumerate()
            .map(|(r, row)| {
                row.get(i)
                    .cloned()
                    .unwrap_or_else(|| defaults.get(r).cloned().unwrap_or(Value::Null))
            })
            .collect();
        out.push(Value::Array(tuple));
    }
    ok(Value::Array(out))
}

/// `$in`: membership test, `[needle, haystack]`.
pub fn contains(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let args = exactly(args, 2, "$in")?;
    let items = expect_array(&args[1], "$in")?;
    ok(Value::Bool(items.iter().any(|v| equivalent(v, &args[0]))))
}

pub fn array_to_object(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    match one(args, "$arrayToObject")? {
        Value::Null => null(),
        v => {
            let items = expect_array(v, "$arrayToObject")?;
            let mut doc = Document::new();
            for item in items {
                match item {
                    Value::Array(pair) if pair.len() == 2 => {
                        let key = pair[0].as_str().ok_or_else(|| {
                            Error::Type("$arrayToObject keys must be strings".to_string())
                        })?;
                        doc.insert(key.to_string(), pair[1].clone());
                    }
                    Value::Object(kv) => {
                        let key = kv.get("k").and_then(Value::as_str).ok_or_else(|| {
                            Error::Type("$arrayToObject entries need a string 'k'".to_string())
                        })?;
                        let value = kv.get("v").ok_or_else(|| {
                            Error::Type("$arrayToObject entries need a 'v'".to_string())
                        })?;
                        doc.insert(key.to_string(), value.clone());
                    }
                    other => {
                        return Err(Error::Type(format!(
                            "$arrayToObject expects [k, v] pairs or {{k, v}} documents, found {}",
                            other.type_name()
                        )));
                    }
                }
            }
            ok(Value::Object(doc))
        }
    }
}

pub fn object_to_array(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    match one(args, "$objectToArray")? {
        Value::Null => null(),
        Value::Object(doc) => {
            let entries: Vec<Value> = doc
                .iter()
                .map(|(k, v)| {
                    let mut entry = Document::new();
                    entry.insert("k".to_string(), Value::String(k.clone()));
                    entry.insert("v".to_string(), v.clone());
                    Value::Object(entry)
                })
                .collect();
            ok(Value::Array(entries))
        }
        other => Err(Error::Type(format!(
            "$objectToArray expects a document, found {}",
            other.type_name()
        ))),
    }
}

pub fn sort_array(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let doc = match one(args, "$sortArray")? {
        Value::Object(doc) => doc,
        Value::Null => return null(),
        other => {
            return Err(Error::InvalidSpec(format!(
                "$sortArray expects a document argument, found {}",
                other.type_name()
            )));
        }
    };
    let input = doc
        .get("input")
        .ok_or_else(|| Error::InvalidSpec("$sortArray requires 'input'".to_string()))?;
    if matches!(input, Value::Null) {
        return null();
    }
    let mut items = expect_array(input, "$sortArray")?.to_vec();
    let sort_by = doc
        .get("sortBy")
        .ok_or_else(|| Error::InvalidSpec("$sortArray requires 'sortBy'".to_string()))?;
    match sort_by {
        Value::Int(dir) if *dir == 1 || *dir == -1 => {
            let descending = *dir == -1;
            items.sort_by(|a, b| {
                let ord = compare(a, b);
                if descending { ord.reverse() } else { ord }
            });
        }
        Value::Object(fields) => {
            let keys: Vec<(&String, i64)> = fields
                .iter()
                .map(|(k, v)| {
                    v.as_i64()
                        .filter(|d| *d == 1 || *d == -1)
                        .map(|d| (k, d))
                        .ok_or_else(|| {
                            Error::InvalidSpec("$sortArray directions must be 1 or -1".to_string())
                        })
                })
                .collect::<Result<_>>()?;
            items.sort_by(|a, b| {
                for (key, dir) in &keys {
                    let va = crate::path::resolve(a, key).unwrap_or(Value::Null);
                    let vb = crate::path::resolve(b, key).unwrap_or(Value::Null);
                    let ord = compare(&va, &vb);
                    if ord != Ordering::Equal {
                        return if *dir == -1 { ord.reverse() } else { ord };
                    }
                }
                Ordering::Equal
            });
        }
        _ => {
            return Err(Error::InvalidSpec(
                "$sortArray sortBy must be 1, -1 or a field document".to_string(),
            ));
        }
    }
    ok(Value::Array(items))
}
