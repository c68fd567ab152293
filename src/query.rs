//! Query predicate evaluation and the `Query` entry point.
//!
//! Predicate matching follows the implicit-array convention: a comparison
//! against a path that resolves to an array succeeds when any element
//! matches or when the array as a whole does. `$elemMatch` is the stricter
//! form that requires one element to satisfy an entire sub-predicate.

use std::cmp::Ordering;

use crate::ast::{FieldCond, Predicate};
use crate::error::{Error, Result};
use crate::evaluator::{compute, ExprContext};
use crate::options::Options;
use crate::parser::{parse_predicate, parse_expr};
use crate::path::resolve;
use crate::projection::Projection;
use crate::value::{compare, Value};

/// Evaluates a compiled predicate against one document.
pub fn matches(doc: &Value, predicate: &Predicate, options: &Options) -> Result<bool> {
    match predicate {
        Predicate::And(branches) => {
            for p in branches {
                if !matches(doc, p, options)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Predicate::Or(branches) => {
            for p in branches {
                if matches(doc, p, options)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Predicate::Nor(branches) => {
            for p in branches {
                if matches(doc, p, options)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Predicate::Expr(expr) => {
            let ctx = ExprContext::new(doc, options);
            Ok(compute(expr, &ctx)?.map_or(false, |v| v.is_truthy()))
        }
        Predicate::Where(source) => {
            if !options.script_enabled {
                return Err(Error::ScriptDisabled("$where"));
            }
            let script = options
                .script
                .as_ref()
                .ok_or_else(|| Error::InvalidSpec("no script evaluator configured".to_string()))?;
            Ok(script(source, std::slice::from_ref(doc))?.is_truthy())
        }
        Predicate::Field { path, cond } => {
            let resolved = resolve(doc, path);
            match_field_cond(resolved.as_ref(), cond, options)
        }
    }
}

/// Equality in predicate position: direct equality, any-element equality for
/// arrays, regex values matching strings, and null matching missing.
fn eq_matches(resolved: Option<&Value>, target: &Value) -> bool {
    if let Value::Regex { .. } = target {
        return regex_eq(resolved, target);
    }
    match resolved {
        None => matches!(target, Value::Null),
        Some(value) => {
            if compare(value, target) == Ordering::Equal {
                return true;
            }
            match value {
                Value::Array(items) => items
                    .iter()
                    .any(|item| compare(item, target) == Ordering::Equal),
                Value::Null => matches!(target, Value::Null),
                _ => false,
            }
        }
    }
}

fn regex_eq(resolved: Option<&Value>, target: &Value) -> bool {
    let Value::Regex { pattern, options } = target else {
        return false;
    };
    let Ok(re) = crate::parser::compile_regex(pattern, options) else {
        return false;
    };
    match resolved {
        Some(Value::String(s)) => re.is_match(s),
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| item.as_str().is_some_and(|s| re.is_match(s))),
        _ => false,
    }
}

/// Range comparisons only fire within the same type bracket, so `{$gt: 5}`
/// never matches a string.
fn order_matches(resolved: Option<&Value>, target: &Value, accept: fn(Ordering) -> bool) -> bool {
    let Some(value) = resolved else {
        return false;
    };
    let comparable = |v: &Value| {
        (v.is_number() && target.is_number()) || v.type_name() == target.type_name()
    };
    if comparable(value) && accept(compare(value, target)) {
        return true;
    }
    if let Value::Array(items) = value {
        return items
            .iter()
            .any(|item| comparable(item) && accept(compare(item, target)));
    }
    false
}

pub(crate) fn match_field_cond(
    resolved: Option<&Value>,
    cond: &FieldCond,
    options: &Options,
) -> Result<bool> {
    let matched = match cond {
        FieldCond::Eq(target) => eq_matches(resolved, target),
        FieldCond::Ne(target) => !eq_matches(resolved, target),
        FieldCond::Gt(t) => order_matches(resolved, t, |o| o == Ordering::Greater),
        FieldCond::Gte(t) => order_matches(resolved, t, |o| o != Ordering::Less),
        FieldCond::Lt(t) => order_matches(resolved, t, |o| o == Ordering::Less),
        FieldCond::Lte(t) => order_matches(resolved, t, |o| o != Ordering::Greater),
        FieldCond::In(targets) => targets.iter().any(|t| eq_matches(resolved, t)),
        FieldCond::Nin(targets) => !targets.iter().any(|t| eq_matches(resolved, t)),
        FieldCond::Exists(expected) => resolved.is_some() == *expected,
        FieldCond::Type(names) => match resolved {
            Some(v) => names.iter().any(|n| v.matches_type(n)),
            None => false,
        },
        FieldCond::Size(n) => {
            matches!(resolved, Some(Value::Array(items)) if items.len() == *n)
        }
        FieldCond::Mod { divisor, remainder } => {
            let check = |v: &Value| v.as_i64().is_some_and(|n| n % divisor == *remainder);
            match resolved {
                Some(Value::Array(items)) => items.iter().any(check),
                Some(v) => check(v),
                None => false,
            }
        }
        FieldCond::Regex(re) => match resolved {
            Some(Value::String(s)) => re.is_match(s),
            Some(Value::Array(items)) => items
                .iter()
                .any(|item| item.as_str().is_some_and(|s| re.is_match(s))),
            _ => false,
        },
        FieldCond::All(targets) => match resolved {
            Some(_) => targets.iter().all(|t| eq_matches(resolved, t)),
            None => false,
        },
        FieldCond::ElemMatch(sub) => match resolved {
            Some(Value::Array(items)) => {
                let mut any = false;
                for item in items {
                    if matches(item, sub, options)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            _ => false,
        },
        FieldCond::Not(inner) => !match_field_cond(resolved, inner, options)?,
        FieldCond::AllOf(conds) => {
            let mut all = true;
            for c in conds {
                if !match_field_cond(resolved, c, options)? {
                    all = false;
                    break;
                }
            }
            all
        }
    };
    Ok(matched)
}

/// A compiled query: a predicate plus an optional projection.
///
/// ```
/// use nutmeg::{Query, Options, Value};
///
/// let docs: Vec<Value> = vec![
///     serde_json::json!({"a": {"b": 1}}).into(),
///     serde_json::json!({"a": {"b": 2}}).into(),
/// ];
/// let q = Query::new(&serde_json::json!({"a.b": {"$gt": 1}}).into(), Options::new()).unwrap();
/// let found: Vec<_> = q.find(&docs).collect::<Result<_, _>>().unwrap();
/// assert_eq!(found.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Query {
    predicate: Predicate,
    projection: Option<Projection>,
    options: Options,
}

impl Query {
    /// Compiles a filter document. Fails on unknown operators and malformed
    /// operator blocks.
    pub fn new(filter: &Value, options: Options) -> Result<Self> {
        let predicate = parse_predicate(filter, &options)?;
        Ok(Query {
            predicate,
            projection: None,
            options,
        })
    }

    /// Attaches a projection applied by [`find`](Query::find).
    pub fn with_projection(mut self, spec: &Value) -> Result<Self> {
        self.projection = Some(Projection::parse(spec, &self.options)?);
        Ok(self)
    }

    /// Whether one document satisfies the predicate.
    pub fn test(&self, doc: &Value) -> Result<bool> {
        matches(doc, &self.predicate, &self.options)
    }

    /// Lazily yields matching documents, projected if a projection is set.
    pub fn find<'a>(&'a self, docs: &'a [Value]) -> impl Iterator<Item = Result<Value>> + 'a {
        docs.iter().filter_map(move |doc| {
            match self.test(doc) {
                Err(e) => Some(Err(e)),
                Ok(false) => None,
                Ok(true) => match &self.projection {
                    None => Some(Ok(doc.clone())),
                    Some(p) => Some(p.apply(doc, Some(&self.predicate), &self.options)),
                },
            }
        })
    }

    /// The complement of [`find`](Query::find): documents the predicate
    /// rejects, in order.
    pub fn remove(&self, docs: &[Value]) -> Result<Vec<Value>> {
        let mut kept = Vec::new();
        for doc in docs {
            if !self.test(doc)? {
                kept.push(doc.clone());
            }
        }
        Ok(kept)
    }
}

/// One-shot form of [`Query::find`] accepting an optional projection.
pub fn find(
    docs: &[Value],
    filter: &Value,
    projection: Option<&Value>,
    options: Options,
) -> Result<Vec<Value>> {
    let mut query = Query::new(filter, options)?;
    if let Some(spec) = projection {
        query = query.with_projection(spec)?;
    }
    query.find(docs).collect()
}

/// Evaluates a standalone expression spec against a document; the
/// convenience form of the expression dialect.
pub fn compute_expr(doc: &Value, spec: &Value, options: &Options) -> Result<Value> {
    let expr = parse_expr(spec, options)?;
    let ctx = ExprContext::new(doc, options);
    Ok(compute(&expr, &ctx)?.unwrap_or(Value::Null))
}
