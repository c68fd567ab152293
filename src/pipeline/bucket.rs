//! `$bucket` and `$bucketAuto`, both blocking.

use std::cmp::Ordering;

use crate::ast::stages::{Accumulator, BucketAutoSpec, BucketSpec};
use crate::ast::Expr;
use crate::canonical::canonical_key;
use crate::error::{Error, Result};
use crate::evaluator::{compute, ExprContext};
use crate::options::Options;
use crate::pipeline::group::{parse_simple_outputs, AccState};
use crate::value::{compare, Document, Value};

fn parse_outputs(
    doc: &crate::value::Document,
    options: &Options,
) -> Result<Vec<(String, Accumulator, Expr)>> {
    match doc.get("output") {
        None => Ok(vec![("count".to_string(), Accumulator::Count, Expr::null())]),
        Some(Value::Object(output)) => parse_simple_outputs(output, options),
        Some(_) => Err(Error::InvalidSpec("'output' must be a document".to_string())),
    }
}

pub fn parse_bucket(spec: &Value, options: &Options) -> Result<BucketSpec> {
    let Value::Object(doc) = spec else {
        return Err(Error::InvalidSpec("$bucket expects a document".to_string()));
    };
    let group_by = doc
        .get("groupBy")
        .ok_or_else(|| Error::InvalidSpec("$bucket requires 'groupBy'".to_string()))?;
    let boundaries = match doc.get("boundaries") {
        Some(Value::Array(items)) if items.len() >= 2 => items.clone(),
        _ => {
            return Err(Error::InvalidSpec(
                "$bucket requires at least two boundaries".to_string(),
            ));
        }
    };
    for pair in boundaries.windows(2) {
        if compare(&pair[0], &pair[1]) != Ordering::Less {
            return Err(Error::InvalidSpec(
                "$bucket boundaries must be strictly ascending".to_string(),
            ));
        }
    }
    Ok(BucketSpec {
        group_by: crate::parser::parse_expr(group_by, options)?,
        boundaries,
        default: doc.get("default").cloned(),
        output: parse_outputs(doc, options)?,
    })
}

pub fn parse_bucket_auto(spec: &Value, options: &Options) -> Result<BucketAutoSpec> {
    let Value::Object(doc) = spec else {
        return Err(Error::InvalidSpec("$bucketAuto expects a document".to_string()));
    };
    let group_by = doc
        .get("groupBy")
        .ok_or_else(|| Error::InvalidSpec("$bucketAuto requires 'groupBy'".to_string()))?;
    let buckets = doc
        .get("buckets")
        .and_then(Value::as_i64)
        .filter(|n| *n > 0)
        .ok_or_else(|| {
            Error::InvalidSpec("$bucketAuto requires a positive bucket count".to_string())
        })?;
    Ok(BucketAutoSpec {
        group_by: crate::parser::parse_expr(group_by, options)?,
        buckets: buckets as usize,
        output: parse_outputs(doc, options)?,
    })
}

/// Which bucket a key lands in: the last boundary at or below it, provided
/// the key stays under the final boundary.
fn bucket_index(key: &Value, boundaries: &[Value]) -> Option<usize> {
    if compare(key, &boundaries[0]) == Ordering::Less {
        return None;
    }
    if compare(key, boundaries.last().expect("at least two boundaries")) != Ordering::Less {
        return None;
    }
    let mut idx = 0;
    for (i, b) in boundaries[..boundaries.len() - 1].iter().enumerate() {
        if compare(key, b) != Ordering::Less {
            idx = i;
        }
    }
    Some(idx)
}

struct OutputAcc<'s> {
    fields: &'s [(String, Accumulator, Expr)],
    states: Vec<AccState>,
    count: usize,
}

impl<'s> OutputAcc<'s> {
    fn new(fields: &'s [(String, Accumulator, Expr)]) -> Self {
        OutputAcc {
            fields,
            states: fields.iter().map(|(_, acc, _)| AccState::new(*acc)).collect(),
            count: 0,
        }
    }

    fn update(&mut self, doc: &Value, options: &Options) -> Result<()> {
        self.count += 1;
        let ctx = ExprContext::new(doc, options);
        for ((_, _, expr), state) in self.fields.iter().zip(self.states.iter_mut()) {
            state.update(compute(expr, &ctx)?)?;
        }
        Ok(())
    }

    fn finish(self, id: Value) -> Value {
        let mut out = Document::new();
        out.insert("_id".to_string(), id);
        for ((name, _, _), state) in self.fields.iter().zip(self.states) {
            if let Some(v) = state.finish() {
                out.insert(name.clone(), v);
            }
        }
        Value::Object(out)
    }
}

pub fn execute_bucket(spec: &BucketSpec, docs: Vec<Value>, options: &Options) -> Result<Vec<Value>> {
    let mut buckets: Vec<OutputAcc<'_>> = (0..spec.boundaries.len() - 1)
        .map(|_| OutputAcc::new(&spec.output))
        .collect();
    let mut default_bucket = OutputAcc::new(&spec.output);

    for doc in &docs {
        let ctx = ExprContext::new(doc, options);
        let key = compute(&spec.group_by, &ctx)?.unwrap_or(Value::Null);
        match bucket_index(&key, &spec.boundaries) {
            Some(i) => buckets[i].update(doc, options)?,
            None => match &spec.default {
                Some(_) => default_bucket.update(doc, options)?,
                None => {
                    return Err(Error::Type(format!(
                        "$bucket found a value outside the boundaries and no default: {}",
                        canonical_key(&key, None)
                    )));
                }
            },
        }
    }

    let mut out = Vec::new();
    for (i, bucket) in buckets.into_iter().enumerate() {
        if bucket.count > 0 {
            out.push(bucket.finish(spec.boundaries[i].clone()));
        }
    }
    if default_bucket.count > 0 {
        let id = spec.default.clone().expect("default checked during update");
        out.push(default_bucket.finish(id));
    }
    Ok(out)
}

pub fn execute_bucket_auto(
    spec: &BucketAutoSpec,
    docs: Vec<Value>,
    options: &Options,
) -> Result<Vec<Value>> {
    if docs.is_empty() {
        return Ok(Vec::new());
    }

    // group keys are computed once, up front, and carried beside each
    // document through the sort
    let mut keyed: Vec<(Option<Value>, Value)> = Vec::with_capacity(docs.len());
    for doc in docs {
        let ctx = ExprContext::new(&doc, options);
        let key = compute(&spec.group_by, &ctx)?.filter(|k| !matches!(k, Value::Null));
        keyed.push((key, doc));
    }
    keyed.sort_by(|(ka, _), (kb, _)| match (ka, kb) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare(a, b),
    });

    // null and missing keys form their own bucket at the low end
    let first_keyed = keyed.iter().position(|(k, _)| k.is_some()).unwrap_or(keyed.len());
    let (nulls, rest) = keyed.split_at(first_keyed);

    let mut chunks: Vec<&[(Option<Value>, Value)]> = Vec::new();
    if !rest.is_empty() {
        let slots = if nulls.is_empty() {
            spec.buckets
        } else {
            spec.buckets.saturating_sub(1).max(1)
        };
        let chunk_size = rest.len().div_ceil(slots);
        let mut start = 0;
        while start < rest.len() {
            let mut end = (start + chunk_size).min(rest.len());
            // a chunk absorbs every following document with the same key,
            // so equal keys never span buckets
            while end < rest.len() && compare_keys(&rest[end - 1].0, &rest[end].0) == Ordering::Equal
            {
                end += 1;
            }
            chunks.push(&rest[start..end]);
            start = end;
        }
    }

    let greatest = rest.last().and_then(|(k, _)| k.clone()).unwrap_or(Value::Null);
    let mut out = Vec::new();

    if !nulls.is_empty() {
        let mut acc = OutputAcc::new(&spec.output);
        for (_, doc) in nulls {
            acc.update(doc, options)?;
        }
        let max = chunks
            .first()
            .and_then(|c| c.first())
            .and_then(|(k, _)| k.clone())
            .unwrap_or(Value::Null);
        out.push(acc.finish(min_max_id(Value::Null, max)));
    }

    for (i, chunk) in chunks.iter().enumerate() {
        let mut acc = OutputAcc::new(&spec.output);
        for (_, doc) in *chunk {
            acc.update(doc, options)?;
        }
        let min = chunk
            .first()
            .and_then(|(k, _)| k.clone())
            .unwrap_or(Value::Null);
        // each bucket's max is the next bucket's min; the last bucket
        // closes on the greatest key observed
        let max = match chunks.get(i + 1) {
            Some(next) => next
                .first()
                .and_then(|(k, _)| k.clone())
                .unwrap_or(Value::Null),
            None => greatest.clone(),
        };
        out.push(acc.finish(min_max_id(min, max)));
    }
    Ok(out)
}

fn compare_keys(a: &Option<Value>, b: &Option<Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => compare(x, y),
    }
}

fn min_max_id(min: Value, max: Value) -> Value {
    let mut id = Document::new();
    id.insert("min".to_string(), min);
    id.insert("max".to_string(), max);
    Value::Object(id)
}
