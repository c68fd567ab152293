//! The expression interpreter.
//!
//! [`compute`] walks a compiled [`Expr`] against one document. The
//! evaluation frame carries the pipeline's root document (`$$ROOT`), the
//! document at the current stage (`$$CURRENT`, the target of bare `$path`
//! references) and the variable bindings introduced by `$let`, `$map`,
//! `$filter` and `$reduce`.
//!
//! Missing propagates as `None`: a field reference that resolves to nothing
//! yields `Ok(None)`, document literals omit keys whose value is missing,
//! array literals turn missing elements into null, and most operators see
//! missing arguments as null.
//!
//! Operators that control the evaluation of their own arguments (`$cond`,
//! `$ifNull`, `$switch`, `$and`, `$or` and the variable binders) are
//! interpreted here as special forms; everything else goes through the
//! value-operator registry with its arguments evaluated left to right.

use std::collections::HashMap;

use chrono::Utc;

use crate::ast::Expr;
use crate::error::{Error, Result};
use crate::operators::{self, OpCtx};
use crate::options::Options;
use crate::path;
use crate::value::Value;

/// Evaluation frame: root and current documents plus variable bindings.
#[derive(Debug, Clone)]
pub struct ExprContext<'a> {
    /// The document at which the pipeline began (`$$ROOT`)
    pub root: &'a Value,
    /// The document at this stage (`$$CURRENT`, bare `$path` target)
    pub current: &'a Value,
    /// `$$name` bindings; a `None` value is a binding to missing
    vars: HashMap<String, Option<Value>>,
    pub options: &'a Options,
}

impl<'a> ExprContext<'a> {
    pub fn new(doc: &'a Value, options: &'a Options) -> Self {
        ExprContext {
            root: doc,
            current: doc,
            vars: HashMap::new(),
            options,
        }
    }

    /// A frame with the same root but a different current document.
    pub fn rebase(&self, current: &'a Value) -> Self {
        ExprContext {
            root: self.root,
            current,
            vars: self.vars.clone(),
            options: self.options,
        }
    }

    /// A frame extended with additional variable bindings.
    fn with_vars(&self, bindings: Vec<(String, Option<Value>)>) -> Self {
        let mut vars = self.vars.clone();
        vars.extend(bindings);
        ExprContext {
            root: self.root,
            current: self.current,
            vars,
            options: self.options,
        }
    }

    fn lookup_var(&self, name: &str) -> Result<Option<Value>> {
        if let Some(bound) = self.vars.get(name) {
            return Ok(bound.clone());
        }
        match name {
            "ROOT" => Ok(Some(self.root.clone())),
            "CURRENT" => Ok(Some(self.current.clone())),
            "REMOVE" => Ok(None),
            "NOW" => Ok(Some(Value::Date(Utc::now()))),
            _ => match self.options.variables.get(name) {
                Some(v) => Ok(Some(v.clone())),
                None => Err(Error::InvalidSpec(format!("undefined variable: $${name}"))),
            },
        }
    }
}

/// Operators whose argument evaluation is controlled by the evaluator
/// itself rather than the value-operator registry.
pub fn is_special_form(name: &str) -> bool {
    matches!(
        name,
        "$cond"
            | "$ifNull"
            | "$switch"
            | "$and"
            | "$or"
            | "$let"
            | "$map"
            | "$filter"
            | "$reduce"
            | "$function"
            | "$literal"
    )
}

/// Evaluates an expression within a frame. `Ok(None)` is the missing
/// sentinel.
pub fn compute(expr: &Expr, ctx: &ExprContext<'_>) -> Result<Option<Value>> {
    match expr {
        Expr::Literal(v) => Ok(Some(v.clone())),
        Expr::FieldRef(p) => Ok(path::resolve(ctx.current, p)),
        Expr::VarRef { name, path: sub } => {
            let base = ctx.lookup_var(name)?;
            match (base, sub) {
                (Some(v), Some(p)) => Ok(path::resolve(&v, p)),
                (base, _) => Ok(base),
            }
        }
        Expr::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(compute(item, ctx)?.unwrap_or(Value::Null));
            }
            Ok(Some(Value::Array(out)))
        }
        Expr::Object(entries) => {
            let mut doc = crate::value::Document::new();
            for (key, value_expr) in entries {
                if let Some(v) = compute(value_expr, ctx)? {
                    doc.insert(key.clone(), v);
                }
            }
            Ok(Some(Value::Object(doc)))
        }
        Expr::Call { op, arg } => dispatch(op, arg, ctx),
    }
}

/// As [`compute`], with missing collapsed to null.
pub fn compute_value(expr: &Expr, ctx: &ExprContext<'_>) -> Result<Value> {
    Ok(compute(expr, ctx)?.unwrap_or(Value::Null))
}

fn dispatch(op: &str, arg: &Expr, ctx: &ExprContext<'_>) -> Result<Option<Value>> {
    match op {
        "$cond" => eval_cond(arg, ctx),
        "$ifNull" => eval_if_null(arg, ctx),
        "$switch" => eval_switch(arg, ctx),
        "$and" => eval_and(arg, ctx),
        "$or" => eval_or(arg, ctx),
        "$let" => eval_let(arg, ctx),
        "$map" => eval_map(arg, ctx),
        "$filter" => eval_filter(arg, ctx),
        "$reduce" => eval_reduce(arg, ctx),
        "$function" => eval_function(arg, ctx),
        _ => {
            if let Some(custom) = ctx.options.custom_operators.get(op) {
                let args = eval_args(arg, ctx)?;
                return custom(&args).map(Some);
            }
            match operators::lookup(op) {
                Some(f) => {
                    let args = eval_args(arg, ctx)?;
                    f(&args, &OpCtx { options: ctx.options, current: ctx.current })
                }
                None => Err(Error::UnknownOperator(op.to_string())),
            }
        }
    }
}

/// Argument list for a value operator: an array spec evaluates elementwise,
/// anything else becomes a single argument. Missing arguments are seen as
/// null.
fn eval_args(arg: &Expr, ctx: &ExprContext<'_>) -> Result<Vec<Value>> {
    match arg {
        Expr::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(compute_value(item, ctx)?);
            }
            Ok(out)
        }
        single => Ok(vec![compute_value(single, ctx)?]),
    }
}

fn positional<'e>(arg: &'e Expr, n: usize, op: &str) -> Result<&'e [Expr]> {
    match arg {
        Expr::Array(items) if items.len() == n => Ok(items),
        _ => Err(Error::InvalidSpec(format!("{op} expects {n} arguments"))),
    }
}

fn eval_cond(arg: &Expr, ctx: &ExprContext<'_>) -> Result<Option<Value>> {
    let (cond, then, otherwise) = match arg {
        Expr::Array(_) => {
            let items = positional(arg, 3, "$cond")?;
            (&items[0], &items[1], &items[2])
        }
        Expr::Object(_) => {
            let get = |name: &str| {
                arg.named_arg(name)
                    .ok_or_else(|| Error::InvalidSpec(format!("$cond requires '{name}'")))
            };
            (get("if")?, get("then")?, get("else")?)
        }
        _ => return Err(Error::InvalidSpec("$cond expects an array or document".to_string())),
    };
    let test = compute(cond, ctx)?.map_or(false, |v| v.is_truthy());
    // exactly one branch is evaluated
    compute(if test { then } else { otherwise }, ctx)
}

fn eval_if_null(arg: &Expr, ctx: &ExprContext<'_>) -> Result<Option<Value>> {
    let Expr::Array(items) = arg else {
        return Err(Error::InvalidSpec("$ifNull expects an array".to_string()));
    };
    if items.len() < 2 {
        return Err(Error::InvalidSpec("$ifNull expects at least two arguments".to_string()));
    }
    let mut last = None;
    for (i, item) in items.iter().enumerate() {
        let v = compute(item, ctx)?;
        match v {
            Some(Value::Null) | None => {
                last = v;
                // the fallback is only reached when everything before it
                // was null or missing
                if i + 1 == items.len() {
                    return Ok(last);
                }
            }
            Some(v) => return Ok(Some(v)),
        }
    }
    Ok(last)
}

fn eval_switch(arg: &Expr, ctx: &ExprContext<'_>) -> Result<Option<Value>> {
    let branches = arg
        .named_arg("branches")
        .ok_or_else(|| Error::InvalidSpec("$switch requires 'branches'".to_string()))?;
    let Expr::Array(branches) = branches else {
        return Err(Error::InvalidSpec("$switch branches must be an array".to_string()));
    };
    for branch in branches {
        let case = branch
            .named_arg("case")
            .ok_or_else(|| Error::InvalidSpec("$switch branch requires 'case'".to_string()))?;
        let then = branch
            .named_arg("then")
            .ok_or_else(|| Error::InvalidSpec("$switch branch requires 'then'".to_string()))?;
        if compute(case, ctx)?.map_or(false, |v| v.is_truthy()) {
            return compute(then, ctx);
        }
    }
    match arg.named_arg("default") {
        Some(default) => compute(default, ctx),
        None => Err(Error::Type("$switch found no matching branch and no default".to_string())),
    }
}

fn eval_and(arg: &Expr, ctx: &ExprContext<'_>) -> Result<Option<Value>> {
    let Expr::Array(items) = arg else {
        let v = compute(arg, ctx)?;
        return Ok(Some(Value::Bool(v.map_or(false, |v| v.is_truthy()))));
    };
    for item in items {
        if !compute(item, ctx)?.map_or(false, |v| v.is_truthy()) {
            return Ok(Some(Value::Bool(false)));
        }
    }
    Ok(Some(Value::Bool(true)))
}

fn eval_or(arg: &Expr, ctx: &ExprContext<'_>) -> Result<Option<Value>> {
    let Expr::Array(items) = arg else {
        let v = compute(arg, ctx)?;
        return Ok(Some(Value::Bool(v.map_or(false, |v| v.is_truthy()))));
    };
    for item in items {
        if compute(item, ctx)?.map_or(false, |v| v.is_truthy()) {
            return Ok(Some(Value::Bool(true)));
        }
    }
    Ok(Some(Value::Bool(false)))
}

fn eval_let(arg: &Expr, ctx: &ExprContext<'_>) -> Result<Option<Value>> {
    let vars = arg
        .named_arg("vars")
        .ok_or_else(|| Error::InvalidSpec("$let requires 'vars'".to_string()))?;
    let body = arg
        .named_arg("in")
        .ok_or_else(|| Error::InvalidSpec("$let requires 'in'".to_string()))?;
    let Expr::Object(entries) = vars else {
        return Err(Error::InvalidSpec("$let vars must be a document".to_string()));
    };
    let mut bindings = Vec::with_capacity(entries.len());
    for (name, expr) in entries {
        bindings.push((name.clone(), compute(expr, ctx)?));
    }
    compute(body, &ctx.with_vars(bindings))
}

/// Shared scaffolding for `$map`, `$filter` and `$reduce`: evaluate the
/// input, pass null and missing through as `None`, insist on an array
/// otherwise.
fn input_array(arg: &Expr, ctx: &ExprContext<'_>, op: &str) -> Result<Option<Vec<Value>>> {
    let input = arg
        .named_arg("input")
        .ok_or_else(|| Error::InvalidSpec(format!("{op} requires 'input'")))?;
    match compute(input, ctx)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items)),
        Some(other) => Err(Error::Type(format!(
            "{op} input must be an array, found {}",
            other.type_name()
        ))),
    }
}

fn bind_name(arg: &Expr, op: &str) -> Result<String> {
    match arg.named_arg("as") {
        None => Ok("this".to_string()),
        Some(Expr::Literal(Value::String(name))) => Ok(name.clone()),
        Some(_) => Err(Error::InvalidSpec(format!("{op} 'as' must be a string"))),
    }
}

fn eval_map(arg: &Expr, ctx: &ExprContext<'_>) -> Result<Option<Value>> {
    let Some(items) = input_array(arg, ctx, "$map")? else {
        return Ok(Some(Value::Null));
    };
    let body = arg
        .named_arg("in")
        .ok_or_else(|| Error::InvalidSpec("$map requires 'in'".to_string()))?;
    let name = bind_name(arg, "$map")?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let frame = ctx.with_vars(vec![(name.clone(), Some(item))]);
        out.push(compute(body, &frame)?.unwrap_or(Value::Null));
    }
    Ok(Some(Value::Array(out)))
}

fn eval_filter(arg: &Expr, ctx: &ExprContext<'_>) -> Result<Option<Value>> {
    let Some(items) = input_array(arg, ctx, "$filter")? else {
        return Ok(Some(Value::Null));
    };
    let cond = arg
        .named_arg("cond")
        .ok_or_else(|| Error::InvalidSpec("$filter requires 'cond'".to_string()))?;
    let name = bind_name(arg, "$filter")?;
    let limit = match arg.named_arg("limit") {
        None => None,
        Some(e) => match compute(e, ctx)? {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.as_i64().filter(|n| *n >= 1).ok_or_else(|| {
                Error::InvalidSpec("$filter limit must be a positive integer".to_string())
            })? as usize),
        },
    };
    let mut out = Vec::new();
    for item in items {
        if limit.is_some_and(|l| out.len() >= l) {
            break;
        }
        let frame = ctx.with_vars(vec![(name.clone(), Some(item.clone()))]);
        if compute(cond, &frame)?.map_or(false, |v| v.is_truthy()) {
            out.push(item);
        }
    }
    Ok(Some(Value::Array(out)))
}

fn eval_reduce(arg: &Expr, ctx: &ExprContext<'_>) -> Result<Option<Value>> {
    let Some(items) = input_array(arg, ctx, "$reduce")? else {
        return Ok(Some(Value::Null));
    };
    let initial = arg
        .named_arg("initialValue")
        .ok_or_else(|| Error::InvalidSpec("$reduce requires 'initialValue'".to_string()))?;
    let body = arg
        .named_arg("in")
        .ok_or_else(|| Error::InvalidSpec("$reduce requires 'in'".to_string()))?;
    let mut acc = compute_value(initial, ctx)?;
    for item in items {
        let frame = ctx.with_vars(vec![
            ("value".to_string(), Some(acc)),
            ("this".to_string(), Some(item)),
        ]);
        acc = compute_value(body, &frame)?;
    }
    Ok(Some(acc))
}

fn eval_function(arg: &Expr, ctx: &ExprContext<'_>) -> Result<Option<Value>> {
    if !ctx.options.script_enabled {
        return Err(Error::ScriptDisabled("$function"));
    }
    let script = ctx
        .options
        .script
        .as_ref()
        .ok_or_else(|| Error::InvalidSpec("no script evaluator configured".to_string()))?;
    let body = match arg.named_arg("body") {
        Some(Expr::Literal(Value::String(src))) => src.clone(),
        _ => return Err(Error::InvalidSpec("$function requires a string 'body'".to_string())),
    };
    let args = match arg.named_arg("args") {
        None => Vec::new(),
        Some(e) => match compute(e, ctx)? {
            Some(Value::Array(items)) => items,
            _ => return Err(Error::InvalidSpec("$function 'args' must be an array".to_string())),
        },
    };
    script(&body, &args).map(Some)
}
