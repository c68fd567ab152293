//! Projection spec semantics, shared by `$project` and the find-projection.
//!
//! A spec document mixes four kinds of values: `1`/`true` includes a path,
//! `0`/`false` excludes it, an expression computes a new value, and the
//! projection operators `$slice`, `$elemMatch` and the positional `$` carve
//! arrays. Include and exclude are mutually exclusive within one spec, with
//! the single exception that the identity field may be excluded from an
//! include spec.

use crate::ast::{Expr, FieldCond, Predicate};
use crate::error::{Error, Result};
use crate::evaluator::{compute, ExprContext};
use crate::options::Options;
use crate::parser::{parse_expr, parse_predicate};
use crate::path::{assign, remove, resolve};
use crate::query::matches;
use crate::value::{Document, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Output has exactly the listed paths (plus the identity field)
    Include,
    /// Output is the input minus the listed paths
    Exclude,
}

#[derive(Debug, Clone)]
enum Field {
    Include,
    Exclude,
    Compute(Expr),
    Slice { skip: Option<i64>, limit: i64 },
    ElemMatch(Predicate),
    /// `path.$`: first array element matched by the query predicate
    Positional,
}

/// A compiled projection spec.
#[derive(Debug, Clone)]
pub struct Projection {
    mode: Mode,
    id_excluded: bool,
    /// Dotted path to field action, in spec order
    fields: Vec<(String, Field)>,
}

impl Projection {
    pub fn parse(spec: &Value, options: &Options) -> Result<Self> {
        let Value::Object(doc) = spec else {
            return Err(Error::InvalidSpec(format!(
                "a projection must be a document, found {}",
                spec.type_name()
            )));
        };
        if doc.is_empty() {
            return Err(Error::InvalidSpec("projection must not be empty".to_string()));
        }

        let mut fields = Vec::new();
        flatten(doc, String::new(), options, &mut fields)?;

        let id_key = options.id_key();
        let mut id_excluded = false;
        let mut includes = false;
        let mut excludes = false;
        for (path, field) in &fields {
            match field {
                Field::Exclude if path == id_key => id_excluded = true,
                Field::Exclude => excludes = true,
                Field::Include => includes = true,
                Field::Compute(_) => includes = true,
                // the array operators work in either mode
                Field::Slice { .. } | Field::ElemMatch(_) | Field::Positional => {}
            }
        }
        if includes && excludes {
            return Err(Error::InvalidSpec(
                "cannot mix included and excluded fields in one projection".to_string(),
            ));
        }
        if id_excluded {
            fields.retain(|(path, _)| path != id_key);
        }
        Ok(Projection {
            mode: if includes { Mode::Include } else { Mode::Exclude },
            id_excluded,
            fields,
        })
    }

    /// Whether the spec is a pure inclusion list (used by the identity
    /// round-trip property).
    pub fn is_include(&self) -> bool {
        self.mode == Mode::Include
    }

    pub fn apply(
        &self,
        doc: &Value,
        predicate: Option<&Predicate>,
        options: &Options,
    ) -> Result<Value> {
        match self.mode {
            Mode::Exclude => self.apply_exclude(doc, predicate, options),
            Mode::Include => self.apply_include(doc, predicate, options),
        }
    }

    fn apply_exclude(
        &self,
        doc: &Value,
        predicate: Option<&Predicate>,
        options: &Options,
    ) -> Result<Value> {
        let mut out = doc.clone();
        if self.id_excluded {
            remove(&mut out, options.id_key());
        }
        for (path, field) in &self.fields {
            match field {
                Field::Exclude => remove(&mut out, path),
                Field::Slice { skip, limit } => {
                    if let Some(sliced) = slice_at(doc, path, *skip, *limit) {
                        assign(&mut out, path, sliced);
                    }
                }
                Field::ElemMatch(sub) => match elem_match_at(doc, path, sub, options)? {
                    Some(kept) => assign(&mut out, path, kept),
                    None => remove(&mut out, path),
                },
                Field::Positional => {
                    if let Some(kept) = positional_at(doc, path, predicate, options)? {
                        assign(&mut out, path, kept);
                    }
                }
                Field::Include | Field::Compute(_) => unreachable!("include in exclude mode"),
            }
        }
        Ok(out)
    }

    fn apply_include(
        &self,
        doc: &Value,
        predicate: Option<&Predicate>,
        options: &Options,
    ) -> Result<Value> {
        let id_key = options.id_key();
        let mut out = Value::Object(Document::new());
        // the identity field rides along unless suppressed or re-listed
        if !self.id_excluded && !self.fields.iter().any(|(p, _)| p == id_key) {
            if let Some(id) = resolve(doc, id_key) {
                assign(&mut out, id_key, id);
            }
        }
        let ctx = ExprContext::new(doc, options);
        for (path, field) in &self.fields {
            match field {
                Field::Include => {
                    let segs: Vec<&str> = path.split('.').collect();
                    if let Some(picked) = pick(doc, &segs) {
                        merge_into(&mut out, picked);
                    }
                }
                Field::Compute(expr) => {
                    if let Some(v) = compute(expr, &ctx)? {
                        assign(&mut out, path, v);
                    }
                }
                Field::Slice { skip, limit } => {
                    if let Some(sliced) = slice_at(doc, path, *skip, *limit) {
                        assign(&mut out, path, sliced);
                    }
                }
                Field::ElemMatch(sub) => {
                    if let Some(kept) = elem_match_at(doc, path, sub, options)? {
                        assign(&mut out, path, kept);
                    }
                }
                Field::Positional => {
                    if let Some(kept) = positional_at(doc, path, predicate, options)? {
                        assign(&mut out, path, kept);
                    }
                }
                Field::Exclude => unreachable!("exclude in include mode"),
            }
        }
        Ok(out)
    }
}

/// Walks a spec document, flattening nested projection documents into
/// dotted paths.
fn flatten(
    doc: &Document,
    prefix: String,
    options: &Options,
    out: &mut Vec<(String, Field)>,
) -> Result<()> {
    for (key, value) in doc {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        if let Some(base) = path.strip_suffix(".$") {
            if !matches!(value, Value::Int(1) | Value::Bool(true)) {
                return Err(Error::InvalidSpec(
                    "positional projection takes the value 1".to_string(),
                ));
            }
            out.push((base.to_string(), Field::Positional));
            continue;
        }
        match value {
            Value::Object(sub) if is_nested_spec(sub) => flatten(sub, path, options, out)?,
            _ => out.push((path, classify(value, options)?)),
        }
    }
    Ok(())
}

fn classify(value: &Value, options: &Options) -> Result<Field> {
    match value {
        Value::Bool(true) => Ok(Field::Include),
        Value::Bool(false) => Ok(Field::Exclude),
        Value::Int(n) => Ok(if *n != 0 { Field::Include } else { Field::Exclude }),
        Value::Double(n) => Ok(if *n != 0.0 { Field::Include } else { Field::Exclude }),
        Value::Object(doc) => {
            if doc.len() == 1 {
                if let Some(arg) = doc.get("$slice") {
                    return parse_slice(arg);
                }
                if let Some(arg) = doc.get("$elemMatch") {
                    return Ok(Field::ElemMatch(parse_predicate(arg, options)?));
                }
            }
            Ok(Field::Compute(parse_expr(value, options)?))
        }
        other => Ok(Field::Compute(parse_expr(other, options)?)),
    }
}

/// A document counts as a nested projection spec when every terminal value
/// is an include/exclude marker; anything else makes it an expression.
fn is_nested_spec(doc: &Document) -> bool {
    if doc.is_empty() || doc.keys().any(|k| k.starts_with('$')) {
        return false;
    }
    doc.values().all(|v| match v {
        Value::Bool(_) | Value::Int(_) | Value::Double(_) => true,
        Value::Object(sub) => is_nested_spec(sub),
        _ => false,
    })
}

fn parse_slice(arg: &Value) -> Result<Field> {
    match arg {
        Value::Int(n) => Ok(Field::Slice { skip: None, limit: *n }),
        Value::Array(parts) if parts.len() == 2 => {
            let skip = parts[0]
                .as_i64()
                .ok_or_else(|| Error::InvalidSpec("$slice skip must be an integer".to_string()))?;
            let limit = parts[1]
                .as_i64()
                .filter(|n| *n > 0)
                .ok_or_else(|| Error::InvalidSpec("$slice limit must be positive".to_string()))?;
            Ok(Field::Slice { skip: Some(skip), limit })
        }
        _ => Err(Error::InvalidSpec("$slice expects n or [skip, limit]".to_string())),
    }
}

/// Structural pick for include mode: rebuilds the containers along the path
/// so `"a.b"` on `{a: [{b: 1}, {c: 2}]}` yields `{a: [{b: 1}]}`.
fn pick(value: &Value, segs: &[&str]) -> Option<Value> {
    let (seg, rest) = segs.split_first()?;
    match value {
        Value::Object(map) => {
            let child = map.get(*seg)?;
            let picked = if rest.is_empty() {
                child.clone()
            } else {
                pick(child, rest)?
            };
            let mut wrapper = Document::new();
            wrapper.insert(seg.to_string(), picked);
            Some(Value::Object(wrapper))
        }
        Value::Array(items) => {
            let collected: Vec<Value> = items.iter().filter_map(|item| pick(item, segs)).collect();
            Some(Value::Array(collected))
        }
        _ => None,
    }
}

/// Merges a picked fragment into the output, deep-merging documents and
/// zipping arrays so sibling includes land on the same elements.
fn merge_into(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(d), Value::Object(s)) => {
            for (k, v) in s {
                match d.get_mut(&k) {
                    Some(existing) => merge_into(existing, v),
                    None => {
                        d.insert(k, v);
                    }
                }
            }
        }
        (Value::Array(d), Value::Array(s)) => {
            for (i, v) in s.into_iter().enumerate() {
                match d.get_mut(i) {
                    Some(existing) => merge_into(existing, v),
                    None => d.push(v),
                }
            }
        }
        (dst, src) => *dst = src,
    }
}

fn slice_at(doc: &Value, path: &str, skip: Option<i64>, limit: i64) -> Option<Value> {
    let Some(Value::Array(items)) = resolve(doc, path) else {
        return None;
    };
    let sliced: Vec<Value> = match skip {
        None => {
            if limit < 0 {
                let start = items.len().saturating_sub(limit.unsigned_abs() as usize);
                items[start..].to_vec()
            } else {
                items.iter().take(limit as usize).cloned().collect()
            }
        }
        Some(skip) => {
            let start = if skip < 0 {
                items.len().saturating_sub(skip.unsigned_abs() as usize)
            } else {
                (skip as usize).min(items.len())
            };
            items[start..].iter().take(limit as usize).cloned().collect()
        }
    };
    Some(Value::Array(sliced))
}

fn elem_match_at(
    doc: &Value,
    path: &str,
    sub: &Predicate,
    options: &Options,
) -> Result<Option<Value>> {
    let Some(Value::Array(items)) = resolve(doc, path) else {
        return Ok(None);
    };
    for item in items {
        if matches(&item, sub, options)? {
            return Ok(Some(Value::Array(vec![item])));
        }
    }
    Ok(None)
}

/// First array element satisfying the query's condition on this path; falls
/// back to the first element when the query carries no such condition.
fn positional_at(
    doc: &Value,
    path: &str,
    predicate: Option<&Predicate>,
    options: &Options,
) -> Result<Option<Value>> {
    let Some(Value::Array(items)) = resolve(doc, path) else {
        return Ok(None);
    };
    let cond = predicate.and_then(|p| find_cond(p, path));
    for item in &items {
        let hit = match cond {
            Some((cond_path, cond)) => {
                let resolved = if cond_path == path {
                    Some(item.clone())
                } else {
                    resolve(item, &cond_path[path.len() + 1..])
                };
                crate::query::match_field_cond(resolved.as_ref(), cond, options)?
            }
            None => true,
        };
        if hit {
            return Ok(Some(Value::Array(vec![item.clone()])));
        }
    }
    Ok(None)
}

/// Finds the first field condition the predicate applies to the array path
/// or below it.
fn find_cond<'p>(predicate: &'p Predicate, base: &str) -> Option<(&'p str, &'p FieldCond)> {
    match predicate {
        Predicate::Field { path, cond }
            if path == base || path.starts_with(base) && path.as_bytes().get(base.len()) == Some(&b'.') =>
        {
            Some((path.as_str(), cond))
        }
        Predicate::And(branches) => branches.iter().find_map(|p| find_cond(p, base)),
        _ => None,
    }
}
