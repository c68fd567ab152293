//! `$setWindowFields`: per-document accumulators over a window of the
//! surrounding partition.
//!
//! Partitions are formed by the canonical key of `partitionBy`, sorted
//! internally by `sortBy`, and each output field is computed over a frame
//! of document positions relative to the current row. Without a `window`
//! block the frame is the whole partition.

use std::cmp::Ordering;

use indexmap::IndexMap;

use crate::ast::stages::{Bound, WindowField, WindowFunc, WindowSpec};
use crate::canonical::canonical_key;
use crate::error::{Error, Result};
use crate::evaluator::{compute, ExprContext};
use crate::options::Options;
use crate::path::{assign, resolve};
use crate::pipeline::group::AccState;
use crate::value::{compare, Value};

pub fn parse_window_fields(spec: &Value, options: &Options) -> Result<WindowSpec> {
    let Value::Object(doc) = spec else {
        return Err(Error::InvalidSpec("$setWindowFields expects a document".to_string()));
    };
    let partition_by = match doc.get("partitionBy") {
        None | Some(Value::Null) => None,
        Some(expr) => Some(crate::parser::parse_expr(expr, options)?),
    };
    let sort_by = match doc.get("sortBy") {
        None => Vec::new(),
        Some(spec) => super::sort::parse_sort(spec)?.keys,
    };
    let output = match doc.get("output") {
        Some(Value::Object(fields)) => {
            let mut parsed = Vec::with_capacity(fields.len());
            for (field, body) in fields {
                parsed.push(parse_output_field(field, body, &sort_by, options)?);
            }
            parsed
        }
        _ => {
            return Err(Error::InvalidSpec(
                "$setWindowFields requires an 'output' document".to_string(),
            ));
        }
    };
    Ok(WindowSpec {
        partition_by,
        sort_by,
        output,
    })
}

fn parse_output_field(
    field: &str,
    body: &Value,
    sort_by: &[(String, i32)],
    options: &Options,
) -> Result<WindowField> {
    let Value::Object(body) = body else {
        return Err(Error::InvalidSpec(format!(
            "window field '{field}' must be a document"
        )));
    };
    let mut func = None;
    let mut frame = None;
    for (key, arg) in body {
        match key.as_str() {
            "window" => frame = Some(parse_frame(arg)?),
            "$rank" | "$denseRank" | "$documentNumber" => {
                if sort_by.is_empty() {
                    return Err(Error::InvalidSpec(format!("{key} requires 'sortBy'")));
                }
                func = Some(match key.as_str() {
                    "$rank" => WindowFunc::Rank,
                    "$denseRank" => WindowFunc::DenseRank,
                    _ => WindowFunc::DocumentNumber,
                });
            }
            "$shift" => {
                let Value::Object(shift) = arg else {
                    return Err(Error::InvalidSpec("$shift expects a document".to_string()));
                };
                let output = shift
                    .get("output")
                    .ok_or_else(|| Error::InvalidSpec("$shift requires 'output'".to_string()))?;
                let by = shift
                    .get("by")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| Error::InvalidSpec("$shift requires an integer 'by'".to_string()))?;
                func = Some(WindowFunc::Shift {
                    expr: crate::parser::parse_expr(output, options)?,
                    by,
                    default: shift.get("default").cloned().unwrap_or(Value::Null),
                });
            }
            name => match super::group::accumulator_by_name(name) {
                Some(acc) => {
                    let expr = if acc == crate::ast::stages::Accumulator::Count {
                        crate::ast::Expr::null()
                    } else {
                        crate::parser::parse_expr(arg, options)?
                    };
                    func = Some(WindowFunc::Acc(acc, expr));
                }
                None => return Err(Error::UnknownOperator(name.to_string())),
            },
        }
    }
    let func = func.ok_or_else(|| {
        Error::InvalidSpec(format!("window field '{field}' needs a window function"))
    })?;
    Ok(WindowField {
        field: field.to_string(),
        func,
        frame,
    })
}

fn parse_frame(spec: &Value) -> Result<(Bound, Bound)> {
    let Value::Object(doc) = spec else {
        return Err(Error::InvalidSpec("'window' must be a document".to_string()));
    };
    let Some(Value::Array(bounds)) = doc.get("documents") else {
        return Err(Error::InvalidSpec(
            "'window' supports document frames: {documents: [lo, hi]}".to_string(),
        ));
    };
    if bounds.len() != 2 {
        return Err(Error::InvalidSpec("a frame takes exactly two bounds".to_string()));
    }
    let bound = |v: &Value| -> Result<Bound> {
        match v {
            Value::String(s) if s == "unbounded" => Ok(Bound::Unbounded),
            Value::String(s) if s == "current" => Ok(Bound::Current),
            other => other
                .as_i64()
                .map(Bound::Offset)
                .ok_or_else(|| Error::InvalidSpec("frame bounds are 'unbounded', 'current' or integers".to_string())),
        }
    };
    Ok((bound(&bounds[0])?, bound(&bounds[1])?))
}

fn frame_range(frame: &(Bound, Bound), i: usize, len: usize) -> Option<(usize, usize)> {
    let position = |bound: &Bound, low: bool| -> i64 {
        match bound {
            Bound::Unbounded => {
                if low {
                    0
                } else {
                    len as i64 - 1
                }
            }
            Bound::Current => i as i64,
            Bound::Offset(k) => i as i64 + k,
        }
    };
    let lo = position(&frame.0, true).max(0);
    let hi = position(&frame.1, false).min(len as i64 - 1);
    if lo > hi {
        return None;
    }
    Some((lo as usize, hi as usize))
}

fn sort_key(doc: &Value, sort_by: &[(String, i32)]) -> Vec<Value> {
    sort_by
        .iter()
        .map(|(path, _)| resolve(doc, path).unwrap_or(Value::Null))
        .collect()
}

fn key_cmp(a: &[Value], b: &[Value], sort_by: &[(String, i32)]) -> Ordering {
    for (i, (_, dir)) in sort_by.iter().enumerate() {
        let ord = compare(&a[i], &b[i]);
        if ord != Ordering::Equal {
            return if *dir == -1 { ord.reverse() } else { ord };
        }
    }
    Ordering::Equal
}

pub fn execute(spec: &WindowSpec, docs: Vec<Value>, options: &Options) -> Result<Vec<Value>> {
    // partitions keep first-occurrence order
    let mut partitions: IndexMap<String, Vec<Value>> = IndexMap::new();
    for doc in docs {
        let key = match &spec.partition_by {
            None => String::new(),
            Some(expr) => {
                let ctx = ExprContext::new(&doc, options);
                canonical_key(&compute(expr, &ctx)?.unwrap_or(Value::Null), None)
            }
        };
        partitions.entry(key).or_default().push(doc);
    }

    let mut out = Vec::new();
    for (_, mut partition) in partitions {
        if !spec.sort_by.is_empty() {
            let mut decorated: Vec<(Vec<Value>, Value)> = partition
                .into_iter()
                .map(|doc| (sort_key(&doc, &spec.sort_by), doc))
                .collect();
            decorated.sort_by(|(a, _), (b, _)| key_cmp(a, b, &spec.sort_by));
            partition = decorated.into_iter().map(|(_, doc)| doc).collect();
        }
        let keys: Vec<Vec<Value>> = partition
            .iter()
            .map(|doc| sort_key(doc, &spec.sort_by))
            .collect();
        let len = partition.len();

        let mut augmented = partition.clone();
        for field in &spec.output {
            for i in 0..len {
                let value = window_value(field, &partition, &keys, i, len, spec, options)?;
                assign(&mut augmented[i], &field.field, value);
            }
        }
        out.extend(augmented);
    }
    Ok(out)
}

fn window_value(
    field: &WindowField,
    partition: &[Value],
    keys: &[Vec<Value>],
    i: usize,
    len: usize,
    spec: &WindowSpec,
    options: &Options,
) -> Result<Value> {
    match &field.func {
        WindowFunc::DocumentNumber => Ok(Value::Int(i as i64 + 1)),
        WindowFunc::Rank => {
            let before = keys[..i]
                .iter()
                .filter(|k| key_cmp(k, &keys[i], &spec.sort_by) == Ordering::Less)
                .count();
            // equal keys share the rank of their first occurrence
            let first_equal = keys[..i]
                .iter()
                .position(|k| key_cmp(k, &keys[i], &spec.sort_by) == Ordering::Equal);
            Ok(Value::Int(match first_equal {
                Some(j) => j as i64 + 1,
                None => before as i64 + 1,
            }))
        }
        WindowFunc::DenseRank => {
            let mut distinct = 0i64;
            for j in 1..=i {
                if key_cmp(&keys[j - 1], &keys[j], &spec.sort_by) != Ordering::Equal {
                    distinct += 1;
                }
            }
            Ok(Value::Int(distinct + 1))
        }
        WindowFunc::Shift { expr, by, default } => {
            let target = i as i64 + by;
            if target < 0 || target >= len as i64 {
                return Ok(default.clone());
            }
            let ctx = ExprContext::new(&partition[target as usize], options);
            Ok(compute(expr, &ctx)?.unwrap_or(Value::Null))
        }
        WindowFunc::Acc(acc, expr) => {
            let range = match &field.frame {
                None => Some((0, len - 1)),
                Some(frame) => frame_range(frame, i, len),
            };
            let mut state = AccState::new(*acc);
            if let Some((lo, hi)) = range {
                for doc in &partition[lo..=hi] {
                    let ctx = ExprContext::new(doc, options);
                    state.update(compute(expr, &ctx)?)?;
                }
            }
            Ok(state.finish().unwrap_or(Value::Null))
        }
    }
}
