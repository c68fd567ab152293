//! Comparison operators over the cross-type total order.
//!
//! When a collation is configured on the options, string comparisons go
//! through it.

use std::cmp::Ordering;

use crate::collation::Collator;
use crate::error::Result;
use crate::operators::{exactly, ok, OpCtx};
use crate::value::{compare_with, Value};

fn ordered(args: &[Value], op: &str, ctx: &OpCtx<'_>) -> Result<Ordering> {
    let args = exactly(args, 2, op)?;
    let collator = ctx.options.collation.as_ref().map(|c| c.collator());
    Ok(compare_with(
        &args[0],
        &args[1],
        collator.as_ref().map(|c| c as &dyn Collator),
    ))
}

pub fn cmp(args: &[Value], ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let n = match ordered(args, "$cmp", ctx)? {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    };
    ok(Value::Int(n))
}

pub fn eq(args: &[Value], ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    ok(Value::Bool(ordered(args, "$eq", ctx)? == Ordering::Equal))
}

pub fn ne(args: &[Value], ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    ok(Value::Bool(ordered(args, "$ne", ctx)? != Ordering::Equal))
}

pub fn gt(args: &[Value], ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    ok(Value::Bool(ordered(args, "$gt", ctx)? == Ordering::Greater))
}

pub fn gte(args: &[Value], ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    ok(Value::Bool(ordered(args, "$gte", ctx)? != Ordering::Less))
}

pub fn lt(args: &[Value], ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    ok(Value::Bool(ordered(args, "$lt", ctx)? == Ordering::Less))
}

pub fn lte(args: &[Value], ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    ok(Value::Bool(ordered(args, "$lte", ctx)? != Ordering::Greater))
}
