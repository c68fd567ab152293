//! Trigonometric operators. All of them work in doubles; null propagates.

use crate::error::{Error, Result};
use crate::operators::{any_null, exactly, expect_number, null, ok, one, OpCtx};
use crate::value::Value;

fn unary(args: &[Value], op: &str, f: fn(f64) -> f64) -> Result<Option<Value>> {
    let v = one(args, op)?;
    if matches!(v, Value::Null) {
        return null();
    }
    ok(Value::Double(f(expect_number(v, op)?)))
}

/// Inverse functions reject inputs outside their domain instead of emitting
/// NaN.
fn unary_bounded(args: &[Value], op: &str, f: fn(f64) -> f64) -> Result<Option<Value>> {
    let v = one(args, op)?;
    if matches!(v, Value::Null) {
        return null();
    }
    let n = expect_number(v, op)?;
    if !(-1.0..=1.0).contains(&n) {
        return Err(Error::Type(format!("{op} input must be in [-1, 1]")));
    }
    ok(Value::Double(f(n)))
}

pub fn sin(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    unary(args, "$sin", f64::sin)
}

pub fn cos(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    unary(args, "$cos", f64::cos)
}

pub fn tan(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    unary(args, "$tan", f64::tan)
}

pub fn asin(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    unary_bounded(args, "$asin", f64::asin)
}

pub fn acos(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    unary_bounded(args, "$acos", f64::acos)
}

pub fn atan(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    unary(args, "$atan", f64::atan)
}

pub fn atan2(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let args = exactly(args, 2, "$atan2")?;
    if any_null(args) {
        return null();
    }
    let y = expect_number(&args[0], "$atan2")?;
    let x = expect_number(&args[1], "$atan2")?;
    ok(Value::Double(y.atan2(x)))
}

pub fn sinh(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    unary(args, "$sinh", f64::sinh)
}

pub fn cosh(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    unary(args, "$cosh", f64::cosh)
}

pub fn tanh(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    unary(args, "$tanh", f64::tanh)
}

pub fn degrees_to_radians(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    unary(args, "$degreesToRadians", f64::to_radians)
}

pub fn radians_to_degrees(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    unary(args, "$radiansToDegrees", f64::to_degrees)
}
