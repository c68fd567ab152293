//! `$lookup`: a left outer join against a named in-memory collection.
//!
//! Both forms are supported: the `localField`/`foreignField` equality join
//! and the generalized `let`/`pipeline` form, which runs a sub-pipeline
//! against the foreign collection with per-document variable bindings.

use std::sync::Arc;

use crate::ast::stages::LookupSpec;
use crate::error::{Error, Result};
use crate::evaluator::{compute, ExprContext};
use crate::options::Options;
use crate::path::{assign, resolve};
use crate::value::{equivalent, Value};

/// Resolves the `from` collection at construction time.
pub fn resolve_collection(spec: &Value, op: &str, options: &Options) -> Result<Arc<Vec<Value>>> {
    match spec {
        Value::String(name) => options
            .collections
            .get(name)
            .cloned()
            .ok_or_else(|| Error::InvalidSpec(format!("{op}: unknown collection '{name}'"))),
        // an inline array of documents doubles as an anonymous collection
        Value::Array(docs) => Ok(Arc::new(docs.clone())),
        other => Err(Error::InvalidSpec(format!(
            "{op} 'from' must be a collection name or an array, found {}",
            other.type_name()
        ))),
    }
}

pub fn parse_lookup(spec: &Value, options: &Options) -> Result<LookupSpec> {
    let Value::Object(doc) = spec else {
        return Err(Error::InvalidSpec("$lookup expects a document".to_string()));
    };
    let from = doc
        .get("from")
        .ok_or_else(|| Error::InvalidSpec("$lookup requires 'from'".to_string()))?;
    let as_field = doc
        .get("as")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::InvalidSpec("$lookup requires a string 'as'".to_string()))?
        .to_string();

    let field = |name: &str| -> Result<Option<String>> {
        match doc.get(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(Error::InvalidSpec(format!("$lookup '{name}' must be a string"))),
        }
    };
    let local_field = field("localField")?;
    let foreign_field = field("foreignField")?;
    if local_field.is_some() != foreign_field.is_some() {
        return Err(Error::InvalidSpec(
            "$lookup needs both localField and foreignField or neither".to_string(),
        ));
    }

    let let_vars = match doc.get("let") {
        None => Vec::new(),
        Some(Value::Object(vars)) => {
            let mut parsed = Vec::with_capacity(vars.len());
            for (name, expr) in vars {
                parsed.push((name.clone(), crate::parser::parse_expr(expr, options)?));
            }
            parsed
        }
        Some(_) => {
            return Err(Error::InvalidSpec("$lookup 'let' must be a document".to_string()));
        }
    };
    let pipeline = match doc.get("pipeline") {
        None => None,
        Some(Value::Array(stages)) => Some(super::compile_stages(stages, options)?),
        Some(_) => {
            return Err(Error::InvalidSpec("$lookup 'pipeline' must be an array".to_string()));
        }
    };
    if local_field.is_none() && pipeline.is_none() {
        return Err(Error::InvalidSpec(
            "$lookup needs localField/foreignField or a pipeline".to_string(),
        ));
    }

    Ok(LookupSpec {
        from: resolve_collection(from, "$lookup", options)?,
        local_field,
        foreign_field,
        let_vars,
        pipeline,
        as_field,
    })
}

/// The values a field contributes to an equality join: array fields match
/// on any element as well as on the array as a whole.
fn join_values(resolved: Option<Value>) -> Vec<Value> {
    match resolved {
        None => vec![Value::Null],
        Some(Value::Array(items)) => {
            let mut values = items.clone();
            values.push(Value::Array(items));
            values
        }
        Some(v) => vec![v],
    }
}

fn equality_matches(spec: &LookupSpec, doc: &Value) -> Vec<Value> {
    let (Some(local), Some(foreign)) = (&spec.local_field, &spec.foreign_field) else {
        return spec.from.as_ref().clone();
    };
    let locals = join_values(resolve(doc, local));
    spec.from
        .iter()
        .filter(|fdoc| {
            let foreigns = join_values(resolve(fdoc, foreign));
            foreigns
                .iter()
                .any(|f| locals.iter().any(|l| equivalent(f, l)))
        })
        .cloned()
        .collect()
}

/// Joins one document: evaluates the match set and assigns it at `as`.
pub fn attach(spec: &LookupSpec, doc: &Value, options: &Options) -> Result<Value> {
    let candidates = equality_matches(spec, doc);
    let matched = match &spec.pipeline {
        None => candidates,
        Some(stages) => {
            let mut sub_options = options.clone();
            let ctx = ExprContext::new(doc, options);
            for (name, expr) in &spec.let_vars {
                let bound = compute(expr, &ctx)?.unwrap_or(Value::Null);
                sub_options.variables.insert(name.clone(), bound);
            }
            super::run_stages(stages, candidates, &sub_options)?
        }
    };
    let mut out = doc.clone();
    assign(&mut out, &spec.as_field, Value::Array(matched));
    Ok(out)
}
