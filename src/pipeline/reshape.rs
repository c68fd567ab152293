//! The streaming reshaping stages: `$addFields`/`$set`, `$unset`,
//! `$replaceRoot`/`$replaceWith`. `$project` lives in the projection module
//! and is only dispatched from here.

use crate::ast::Expr;
use crate::error::{Error, Result};
use crate::evaluator::{compute, ExprContext};
use crate::options::Options;
use crate::parser::parse_expr;
use crate::path::{assign, remove};
use crate::value::Value;

pub fn parse_add_fields(spec: &Value, options: &Options) -> Result<Vec<(String, Expr)>> {
    let Value::Object(doc) = spec else {
        return Err(Error::InvalidSpec("$addFields expects a document".to_string()));
    };
    let mut fields = Vec::with_capacity(doc.len());
    for (path, value) in doc {
        fields.push((path.clone(), parse_expr(value, options)?));
    }
    Ok(fields)
}

pub fn parse_unset(spec: &Value) -> Result<Vec<String>> {
    match spec {
        Value::String(path) => Ok(vec![path.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| Error::InvalidSpec("$unset expects field paths".to_string()))
            })
            .collect(),
        _ => Err(Error::InvalidSpec("$unset expects a path or array of paths".to_string())),
    }
}

/// `$replaceRoot` takes `{newRoot: expr}`; `$replaceWith` is the bare
/// expression shorthand for the same stage.
pub fn parse_replace_root(spec: &Value, options: &Options) -> Result<Expr> {
    match spec {
        Value::Object(doc) if doc.contains_key("newRoot") => {
            parse_expr(doc.get("newRoot").expect("checked above"), options)
        }
        other => parse_expr(other, options),
    }
}

pub fn add_fields(doc: &Value, fields: &[(String, Expr)], options: &Options) -> Result<Value> {
    let mut out = doc.clone();
    let ctx = ExprContext::new(doc, options);
    for (path, expr) in fields {
        match compute(expr, &ctx)? {
            // assigning missing removes the field ($$REMOVE)
            Some(v) => assign(&mut out, path, v),
            None => remove(&mut out, path),
        }
    }
    Ok(out)
}

pub fn unset(doc: &Value, paths: &[String]) -> Value {
    let mut out = doc.clone();
    for path in paths {
        remove(&mut out, path);
    }
    out
}

pub fn replace_root(doc: &Value, expr: &Expr, options: &Options) -> Result<Value> {
    let ctx = ExprContext::new(doc, options);
    match compute(expr, &ctx)? {
        Some(root @ Value::Object(_)) => Ok(root),
        Some(other) => Err(Error::Type(format!(
            "$replaceRoot must produce a document, found {}",
            other.type_name()
        ))),
        None => Err(Error::Type("$replaceRoot must produce a document, found nothing".to_string())),
    }
}
