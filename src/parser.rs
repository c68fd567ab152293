//! Compilation of raw spec documents into the typed AST.
//!
//! Both dialects arrive as plain [`Value`] trees (usually converted from
//! `serde_json`). Compilation is eager: unknown operator names, malformed
//! operator documents and bad regular expressions are reported here, at
//! construction time, rather than at the first pull that happens to touch
//! them.

use regex::RegexBuilder;

use crate::ast::{CompiledRegex, Expr, FieldCond, Predicate};
use crate::error::{Error, Result};
use crate::evaluator;
use crate::operators;
use crate::options::Options;
use crate::value::Value;

/// Compiles an expression spec.
///
/// The `$`-prefix rules decide the shape: `"$path"` is a field reference,
/// `"$$name"` a variable reference, a single-`$`-key document an operator
/// call, and documents/arrays without an operator key are rebuilt
/// structurally.
pub fn parse_expr(spec: &Value, options: &Options) -> Result<Expr> {
    match spec {
        Value::String(s) => {
            if let Some(var) = s.strip_prefix("$$") {
                let (name, path) = match var.split_once('.') {
                    Some((name, rest)) => (name.to_string(), Some(rest.to_string())),
                    None => (var.to_string(), None),
                };
                Ok(Expr::VarRef { name, path })
            } else if let Some(path) = s.strip_prefix('$') {
                Ok(Expr::FieldRef(path.to_string()))
            } else {
                Ok(Expr::Literal(spec.clone()))
            }
        }
        Value::Object(doc) => {
            let dollar_keys = doc.keys().filter(|k| k.starts_with('$')).count();
            if dollar_keys == 0 {
                let mut entries = Vec::with_capacity(doc.len());
                for (k, v) in doc {
                    entries.push((k.clone(), parse_expr(v, options)?));
                }
                return Ok(Expr::Object(entries));
            }
            if doc.len() != 1 {
                return Err(Error::InvalidSpec(format!(
                    "an operator expression must have exactly one field, found {}",
                    doc.len()
                )));
            }
            let (op, arg) = doc.iter().next().expect("len checked above");
            if op == "$literal" {
                return Ok(Expr::Literal(arg.clone()));
            }
            if !evaluator::is_special_form(op)
                && operators::lookup(op).is_none()
                && !options.custom_operators.contains_key(op.as_str())
            {
                return Err(Error::UnknownOperator(op.clone()));
            }
            Ok(Expr::Call {
                op: op.clone(),
                arg: Box::new(parse_expr(arg, options)?),
            })
        }
        Value::Array(items) => {
            let mut parsed = Vec::with_capacity(items.len());
            for item in items {
                parsed.push(parse_expr(item, options)?);
            }
            Ok(Expr::Array(parsed))
        }
        other => Ok(Expr::Literal(other.clone())),
    }
}

/// Compiles a query selector document.
pub fn parse_predicate(spec: &Value, options: &Options) -> Result<Predicate> {
    let Value::Object(doc) = spec else {
        return Err(Error::InvalidSpec(format!(
            "a query filter must be a document, found {}",
            spec.type_name()
        )));
    };

    let mut branches = Vec::new();
    for (key, value) in doc {
        match key.as_str() {
            "$and" | "$or" | "$nor" => {
                let Value::Array(items) = value else {
                    return Err(Error::InvalidSpec(format!("{key} expects an array")));
                };
                if items.is_empty() {
                    return Err(Error::InvalidSpec(format!("{key} expects a non-empty array")));
                }
                let mut parsed = Vec::with_capacity(items.len());
                for item in items {
                    parsed.push(parse_predicate(item, options)?);
                }
                branches.push(match key.as_str() {
                    "$and" => Predicate::And(parsed),
                    "$or" => Predicate::Or(parsed),
                    _ => Predicate::Nor(parsed),
                });
            }
            "$expr" => branches.push(Predicate::Expr(parse_expr(value, options)?)),
            "$where" => {
                let Value::String(src) = value else {
                    return Err(Error::InvalidSpec("$where expects a string".to_string()));
                };
                branches.push(Predicate::Where(src.clone()));
            }
            "$comment" => {}
            _ if key.starts_with('$') => {
                return Err(Error::UnknownOperator(key.clone()));
            }
            path => branches.push(Predicate::Field {
                path: path.to_string(),
                cond: parse_field_cond(value, options)?,
            }),
        }
    }
    Ok(match branches.len() {
        1 => branches.pop().expect("one branch"),
        _ => Predicate::And(branches),
    })
}

/// The condition attached to one selector path: either an operator document
/// (`{"$gt": 5, "$lt": 9}`), a regex, or a literal for direct equality.
fn parse_field_cond(value: &Value, options: &Options) -> Result<FieldCond> {
    if let Some(re) = as_regex_literal(value) {
        return Ok(FieldCond::Regex(compile_regex(&re.0, &re.1)?));
    }
    let Value::Object(doc) = value else {
        return Ok(FieldCond::Eq(value.clone()));
    };
    if doc.is_empty() || !doc.keys().all(|k| k.starts_with('$')) {
        return Ok(FieldCond::Eq(value.clone()));
    }

    let mut conds = Vec::new();
    let mut regex_pattern: Option<String> = None;
    let mut regex_options = String::new();
    for (op, arg) in doc {
        match op.as_str() {
            "$eq" => conds.push(FieldCond::Eq(literal(arg))),
            "$ne" => conds.push(FieldCond::Ne(literal(arg))),
            "$gt" => conds.push(FieldCond::Gt(literal(arg))),
            "$gte" => conds.push(FieldCond::Gte(literal(arg))),
            "$lt" => conds.push(FieldCond::Lt(literal(arg))),
            "$lte" => conds.push(FieldCond::Lte(literal(arg))),
            "$in" | "$nin" => {
                let Value::Array(items) = arg else {
                    return Err(Error::InvalidSpec(format!("{op} expects an array")));
                };
                let values: Vec<Value> = items.iter().map(literal).collect();
                conds.push(if op == "$in" {
                    FieldCond::In(values)
                } else {
                    FieldCond::Nin(values)
                });
            }
            "$exists" => conds.push(FieldCond::Exists(arg.is_truthy())),
            "$type" => {
                let names = match arg {
                    Value::String(s) => vec![s.clone()],
                    Value::Array(items) => items
                        .iter()
                        .map(|v| {
                            v.as_str().map(str::to_string).ok_or_else(|| {
                                Error::InvalidSpec("$type expects type names".to_string())
                            })
                        })
                        .collect::<Result<_>>()?,
                    _ => {
                        return Err(Error::InvalidSpec("$type expects type names".to_string()));
                    }
                };
                conds.push(FieldCond::Type(names));
            }
            "$size" => {
                let n = arg.as_i64().filter(|n| *n >= 0).ok_or_else(|| {
                    Error::InvalidSpec("$size expects a non-negative integer".to_string())
                })?;
                conds.push(FieldCond::Size(n as usize));
            }
            "$mod" => {
                let parts = arg.as_array().filter(|a| a.len() == 2).ok_or_else(|| {
                    Error::InvalidSpec("$mod expects [divisor, remainder]".to_string())
                })?;
                let divisor = parts[0].as_i64().ok_or_else(|| {
                    Error::InvalidSpec("$mod divisor must be numeric".to_string())
                })?;
                if divisor == 0 {
                    return Err(Error::DivisionByZero);
                }
                let remainder = parts[1].as_i64().unwrap_or(0);
                conds.push(FieldCond::Mod { divisor, remainder });
            }
            "$regex" => match arg {
                Value::String(p) => regex_pattern = Some(p.clone()),
                Value::Regex { pattern, options: o } => {
                    regex_pattern = Some(pattern.clone());
                    if regex_options.is_empty() {
                        regex_options = o.clone();
                    }
                }
                _ => {
                    return Err(Error::InvalidSpec("$regex expects a pattern".to_string()));
                }
            },
            "$options" => {
                regex_options = arg
                    .as_str()
                    .ok_or_else(|| Error::InvalidSpec("$options expects a string".to_string()))?
                    .to_string();
            }
            "$all" => {
                let Value::Array(items) = arg else {
                    return Err(Error::InvalidSpec("$all expects an array".to_string()));
                };
                conds.push(FieldCond::All(items.iter().map(literal).collect()));
            }
            "$elemMatch" => {
                conds.push(FieldCond::ElemMatch(Box::new(parse_elem_match(arg, options)?)));
            }
            "$not" => {
                let inner = parse_field_cond(arg, options)?;
                if matches!(inner, FieldCond::Eq(_)) {
                    return Err(Error::InvalidSpec(
                        "$not expects an operator document or a regex".to_string(),
                    ));
                }
                conds.push(FieldCond::Not(Box::new(inner)));
            }
            other => return Err(Error::UnknownOperator(other.to_string())),
        }
    }
    if let Some(pattern) = regex_pattern {
        conds.push(FieldCond::Regex(compile_regex(&pattern, &regex_options)?));
    }
    Ok(match conds.len() {
        1 => conds.pop().expect("one condition"),
        _ => FieldCond::AllOf(conds),
    })
}

/// `$elemMatch` takes either a full selector (element is a document) or a
/// bare operator document applied to the element itself.
fn parse_elem_match(spec: &Value, options: &Options) -> Result<Predicate> {
    if let Value::Object(doc) = spec {
        if !doc.is_empty() && doc.keys().all(|k| k.starts_with('$')) {
            return Ok(Predicate::Field {
                path: String::new(),
                cond: parse_field_cond(spec, options)?,
            });
        }
    }
    parse_predicate(spec, options)
}

/// Extended-form regex literal `{"$regex": "...", "$options": "..."}` or a
/// `Value::Regex`, as used in equality and `$in` positions.
fn as_regex_literal(v: &Value) -> Option<(String, String)> {
    match v {
        Value::Regex { pattern, options } => Some((pattern.clone(), options.clone())),
        Value::Object(doc) => {
            if !doc.contains_key("$regex") || !doc.keys().all(|k| k == "$regex" || k == "$options")
            {
                return None;
            }
            let pattern = doc.get("$regex")?.as_str()?.to_string();
            let options = doc
                .get("$options")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            Some((pattern, options))
        }
        _ => None,
    }
}

/// A comparison value from the spec, normalizing extended regex documents
/// into [`Value::Regex`].
fn literal(v: &Value) -> Value {
    match as_regex_literal(v) {
        Some((pattern, options)) => Value::Regex { pattern, options },
        None => v.clone(),
    }
}

/// Compiles a pattern with the documented flag letters: `i` (case
/// insensitive), `m` (multi line), `s` (dot matches newline), `x` (ignore
/// whitespace).
pub fn compile_regex(pattern: &str, flags: &str) -> Result<CompiledRegex> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'x' => {
                builder.ignore_whitespace(true);
            }
            other => {
                return Err(Error::InvalidSpec(format!(
                    "unsupported regex flag: {other}"
                )));
            }
        }
    }
    Ok(CompiledRegex {
        regex: builder.build()?,
        pattern: pattern.to_string(),
        options: flags.to_string(),
    })
}
