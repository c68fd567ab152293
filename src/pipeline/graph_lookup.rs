//! `$graphLookup`: breadth-first traversal of a self-linked collection.
//!
//! Starting from the values of `startWith`, each round matches collection
//! documents whose `connectToField` equals a frontier value, then feeds
//! their `connectFromField` values into the next frontier. Cycles are cut
//! by tracking visited identity values; `maxDepth` bounds the recursion.

use std::collections::HashSet;

use crate::ast::stages::GraphLookupSpec;
use crate::canonical::canonical_key;
use crate::error::{Error, Result};
use crate::evaluator::{compute, ExprContext};
use crate::options::Options;
use crate::path::{assign, resolve};
use crate::query::matches;
use crate::value::{equivalent, Value};

pub fn parse_graph_lookup(spec: &Value, options: &Options) -> Result<GraphLookupSpec> {
    let Value::Object(doc) = spec else {
        return Err(Error::InvalidSpec("$graphLookup expects a document".to_string()));
    };
    let required = |name: &str| -> Result<&Value> {
        doc.get(name)
            .ok_or_else(|| Error::InvalidSpec(format!("$graphLookup requires '{name}'")))
    };
    let string_field = |name: &str| -> Result<String> {
        required(name)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidSpec(format!("$graphLookup '{name}' must be a string")))
    };
    let max_depth = match doc.get("maxDepth") {
        None => None,
        Some(v) => Some(v.as_i64().filter(|n| *n >= 0).ok_or_else(|| {
            Error::InvalidSpec("$graphLookup maxDepth must be a non-negative integer".to_string())
        })? as u32),
    };
    let restrict = match doc.get("restrictSearchWithMatch") {
        None => None,
        Some(filter) => Some(crate::parser::parse_predicate(filter, options)?),
    };
    Ok(GraphLookupSpec {
        from: super::lookup::resolve_collection(required("from")?, "$graphLookup", options)?,
        start_with: crate::parser::parse_expr(required("startWith")?, options)?,
        connect_from_field: string_field("connectFromField")?,
        connect_to_field: string_field("connectToField")?,
        as_field: string_field("as")?,
        max_depth,
        depth_field: match doc.get("depthField") {
            None => None,
            Some(v) => Some(
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| {
                        Error::InvalidSpec("$graphLookup depthField must be a string".to_string())
                    })?,
            ),
        },
        restrict,
    })
}

fn flatten_values(resolved: Option<Value>) -> Vec<Value> {
    match resolved {
        None => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(v) => vec![v],
    }
}

pub fn traverse(spec: &GraphLookupSpec, doc: &Value, options: &Options) -> Result<Value> {
    let ctx = ExprContext::new(doc, options);
    let mut frontier = flatten_values(compute(&spec.start_with, &ctx)?);
    let mut visited: HashSet<String> = HashSet::new();
    let mut found: Vec<Value> = Vec::new();
    let mut depth: u32 = 0;

    while !frontier.is_empty() {
        let mut next = Vec::new();
        for candidate in spec.from.iter() {
            let id = resolve(candidate, options.id_key()).unwrap_or(Value::Null);
            let id_key = canonical_key(&id, None);
            if visited.contains(&id_key) {
                continue;
            }
            let connect_to = flatten_values(resolve(candidate, &spec.connect_to_field));
            let hit = connect_to
                .iter()
                .any(|to| frontier.iter().any(|f| equivalent(to, f)));
            if !hit {
                continue;
            }
            if let Some(pred) = &spec.restrict {
                if !matches(candidate, pred, options)? {
                    continue;
                }
            }
            visited.insert(id_key);
            let mut hit_doc = candidate.clone();
            if let Some(field) = &spec.depth_field {
                assign(&mut hit_doc, field, Value::Int(depth as i64));
            }
            found.push(hit_doc);
            next.extend(flatten_values(resolve(candidate, &spec.connect_from_field)));
        }
        if spec.max_depth.is_some_and(|max| depth >= max) {
            break;
        }
        frontier = next;
        depth += 1;
    }

    let mut out = doc.clone();
    assign(&mut out, &spec.as_field, Value::Array(found));
    Ok(out)
}
