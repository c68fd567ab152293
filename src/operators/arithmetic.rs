//! Arithmetic operators.
//!
//! Numeric results follow the widening ladder: integer-only input stays
//! integer (falling back to double on overflow), a decimal operand makes the
//! result decimal, any double makes it double. Mixed integer/double
//! arithmetic goes through [`Decimal`] internally so that exactness is not
//! lost before the final conversion. Null or missing operands make the
//! result null.

use chrono::Duration;
use rust_decimal::{prelude::FromPrimitive, prelude::ToPrimitive, Decimal, RoundingStrategy};

use crate::error::{Error, Result};
use crate::operators::{any_null, exactly, expect_number, null, ok, one, OpCtx};
use crate::value::Value;

/// A number lifted out of a [`Value`] for type-aware arithmetic.
#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Double(f64),
    Decimal(Decimal),
}

impl Num {
    fn of(v: &Value, op: &str) -> Result<Num> {
        match v {
            Value::Int(n) => Ok(Num::Int(*n)),
            Value::Double(n) => Ok(Num::Double(*n)),
            Value::Decimal(d) => Ok(Num::Decimal(*d)),
            other => Err(Error::Type(format!(
                "{op} expects numbers, found {}",
                other.type_name()
            ))),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Num::Int(n) => Value::Int(n),
            Num::Double(n) => Value::Double(n),
            Num::Decimal(d) => Value::Decimal(d),
        }
    }

    fn to_f64(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Double(n) => n,
            Num::Decimal(d) => d.to_f64().unwrap_or(f64::NAN),
        }
    }

    fn to_decimal(self) -> Option<Decimal> {
        match self {
            Num::Int(n) => Decimal::from_i64(n),
            Num::Double(n) => Decimal::from_f64(n),
            Num::Decimal(d) => Some(d),
        }
    }
}

/// Applies one binary step, widening as needed.
fn step(
    a: Num,
    b: Num,
    int_op: fn(i64, i64) -> Option<i64>,
    f64_op: fn(f64, f64) -> f64,
    dec_op: fn(Decimal, Decimal) -> Option<Decimal>,
) -> Num {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => match int_op(x, y) {
            Some(n) => Num::Int(n),
            None => Num::Double(f64_op(x as f64, y as f64)),
        },
        (Num::Decimal(_), _) | (_, Num::Decimal(_)) => {
            match (a.to_decimal(), b.to_decimal()) {
                (Some(x), Some(y)) => match dec_op(x, y) {
                    Some(d) => Num::Decimal(d),
                    None => Num::Double(f64_op(a.to_f64(), b.to_f64())),
                },
                _ => Num::Double(f64_op(a.to_f64(), b.to_f64())),
            }
        }
        _ => Num::Double(f64_op(a.to_f64(), b.to_f64())),
    }
}

pub fn add(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    if any_null(args) {
        return null();
    }
    // a single date operand turns the sum into date arithmetic
    let mut date = None;
    let mut acc = Num::Int(0);
    for v in args {
        if let Value::Date(dt) = v {
            if date.replace(*dt).is_some() {
                return Err(Error::Type("$add accepts at most one date".to_string()));
            }
            continue;
        }
        acc = step(acc, Num::of(v, "$add")?, i64::checked_add, |x, y| x + y, |x, y| {
            x.checked_add(y)
        });
    }
    match date {
        Some(dt) => {
            let ms = acc.to_f64();
            if !ms.is_finite() {
                return Err(Error::Type("$add produced a non-finite date offset".to_string()));
            }
            ok(Value::Date(dt + Duration::milliseconds(ms as i64)))
        }
        None => ok(acc.into_value()),
    }
}

pub fn subtract(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let args = exactly(args, 2, "$subtract")?;
    if any_null(args) {
        return null();
    }
    match (&args[0], &args[1]) {
        (Value::Date(a), Value::Date(b)) => ok(Value::Int(
            a.timestamp_millis() - b.timestamp_millis(),
        )),
        (Value::Date(a), b) => {
            let ms = expect_number(b, "$subtract")?;
            ok(Value::Date(*a - Duration::milliseconds(ms as i64)))
        }
        (a, b) => {
            let (x, y) = (Num::of(a, "$subtract")?, Num::of(b, "$subtract")?);
            ok(step(x, y, i64::checked_sub, |x, y| x - y, |x, y| x.checked_sub(y)).into_value())
        }
    }
}

pub fn multiply(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    if any_null(args) {
        return null();
    }
    let mut acc = Num::Int(1);
    for v in args {
        acc = step(acc, Num::of(v, "$multiply")?, i64::checked_mul, |x, y| x * y, |x, y| {
            x.checked_mul(y)
        });
    }
    ok(acc.into_value())
}

pub fn divide(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let args = exactly(args, 2, "$divide")?;
    if any_null(args) {
        return null();
    }
    let a = Num::of(&args[0], "$divide")?;
    let b = Num::of(&args[1], "$divide")?;
    if b.to_f64() == 0.0 {
        return Err(Error::DivisionByZero);
    }
    match (a, b) {
        (Num::Decimal(_), _) | (_, Num::Decimal(_)) => {
            match (a.to_decimal(), b.to_decimal()) {
                (Some(x), Some(y)) => match x.checked_div(y) {
                    Some(d) => ok(Value::Decimal(d)),
                    None => ok(Value::Double(a.to_f64() / b.to_f64())),
                },
                _ => ok(Value::Double(a.to_f64() / b.to_f64())),
            }
        }
        _ => ok(Value::Double(a.to_f64() / b.to_f64())),
    }
}

pub fn modulo(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let args = exactly(args, 2, "$mod")?;
    if any_null(args) {
        return null();
    }
    let a = Num::of(&args[0], "$mod")?;
    let b = Num::of(&args[1], "$mod")?;
    if b.to_f64() == 0.0 {
        return Err(Error::DivisionByZero);
    }
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => ok(Value::Int(x % y)),
        (Num::Decimal(_), _) | (_, Num::Decimal(_)) => match (a.to_decimal(), b.to_decimal()) {
            (Some(x), Some(y)) => ok(Value::Decimal(x % y)),
            _ => ok(Value::Double(a.to_f64() % b.to_f64())),
        },
        _ => ok(Value::Double(a.to_f64() % b.to_f64())),
    }
}

pub fn abs(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    match one(args, "$abs")? {
        Value::Null => null(),
        Value::Int(n) => ok(Value::Int(n.abs())),
        Value::Double(n) => ok(Value::Double(n.abs())),
        Value::Decimal(d) => ok(Value::Decimal(d.abs())),
        other => Err(Error::Type(format!("$abs expects a number, found {}", other.type_name()))),
    }
}

fn unary_rounding(
    args: &[Value],
    op: &str,
    f64_op: fn(f64) -> f64,
    dec_op: fn(&Decimal) -> Decimal,
) -> Result<Option<Value>> {
    match one(args, op)? {
        Value::Null => null(),
        Value::Int(n) => ok(Value::Int(*n)),
        Value::Double(n) => ok(Value::Double(f64_op(*n))),
        Value::Decimal(d) => ok(Value::Decimal(dec_op(d))),
        other => Err(Error::Type(format!("{op} expects a number, found {}", other.type_name()))),
    }
}

pub fn ceil(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    unary_rounding(args, "$ceil", f64::ceil, |d| d.ceil())
}

pub fn floor(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    unary_rounding(args, "$floor", f64::floor, |d| d.floor())
}

/// `$trunc` and `$round` share the optional place argument: positive values
/// keep fractional digits, negative values zero out integer digits.
fn to_place(args: &[Value], op: &str) -> Result<i32> {
    if args.len() < 2 {
        return Ok(0);
    }
    let p = args[1]
        .as_i64()
        .filter(|p| (-20..=100).contains(p))
        .ok_or_else(|| Error::InvalidSpec(format!("{op} place must be between -20 and 100")))?;
    Ok(p as i32)
}

fn round_decimal(d: Decimal, place: i32, strategy: RoundingStrategy) -> Decimal {
    if place >= 0 {
        d.round_dp_with_strategy(place as u32, strategy)
    } else {
        let scale = Decimal::from_i64(10i64.pow((-place) as u32)).unwrap_or(Decimal::ONE);
        (d / scale).round_dp_with_strategy(0, strategy) * scale
    }
}

fn rounded(v: &Value, place: i32, op: &str, strategy: RoundingStrategy) -> Result<Option<Value>> {
    match v {
        Value::Null => null(),
        Value::Int(n) => {
            if place >= 0 {
                return ok(Value::Int(*n));
            }
            let d = Decimal::from_i64(*n).unwrap_or_default();
            ok(Value::Int(round_decimal(d, place, strategy).to_i64().unwrap_or(*n)))
        }
        Value::Double(n) => match Decimal::from_f64(*n) {
            Some(d) => ok(Value::Double(
                round_decimal(d, place, strategy).to_f64().unwrap_or(*n),
            )),
            None => ok(Value::Double(*n)),
        },
        Value::Decimal(d) => ok(Value::Decimal(round_decimal(*d, place, strategy))),
        other => Err(Error::Type(format!("{op} expects a number, found {}", other.type_name()))),
    }
}

pub fn trunc(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    if args.is_empty() || args.len() > 2 {
        return Err(Error::InvalidSpec("$trunc expects 1 or 2 arguments".to_string()));
    }
    rounded(&args[0], to_place(args, "$trunc")?, "$trunc", RoundingStrategy::ToZero)
}

pub fn round(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    if args.is_empty() || args.len() > 2 {
        return Err(Error::InvalidSpec("$round expects 1 or 2 arguments".to_string()));
    }
    // banker's rounding, matching the documented midpoint behavior
    rounded(&args[0], to_place(args, "$round")?, "$round", RoundingStrategy::MidpointNearestEven)
}

pub fn sqrt(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let v = one(args, "$sqrt")?;
    if matches!(v, Value::Null) {
        return null();
    }
    let n = expect_number(v, "$sqrt")?;
    if n < 0.0 {
        return Err(Error::Type("$sqrt of a negative number".to_string()));
    }
    ok(Value::Double(n.sqrt()))
}

pub fn pow(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let args = exactly(args, 2, "$pow")?;
    if any_null(args) {
        return null();
    }
    let base = Num::of(&args[0], "$pow")?;
    let exp = Num::of(&args[1], "$pow")?;
    if let (Num::Int(b), Num::Int(e)) = (base, exp) {
        if e >= 0 {
            if let (Ok(e32), b) = (u32::try_from(e), b) {
                if let Some(n) = b.checked_pow(e32) {
                    return ok(Value::Int(n));
                }
            }
        }
    }
    ok(Value::Double(base.to_f64().powf(exp.to_f64())))
}

pub fn exp(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let v = one(args, "$exp")?;
    if matches!(v, Value::Null) {
        return null();
    }
    ok(Value::Double(expect_number(v, "$exp")?.exp()))
}

fn logarithm(n: f64, base: f64, op: &str) -> Result<Option<Value>> {
    if n <= 0.0 {
        return Err(Error::Type(format!("{op} expects a positive number")));
    }
    ok(Value::Double(n.log(base)))
}

pub fn ln(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let v = one(args, "$ln")?;
    if matches!(v, Value::Null) {
        return null();
    }
    logarithm(expect_number(v, "$ln")?, std::f64::consts::E, "$ln")
}

pub fn log(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let args = exactly(args, 2, "$log")?;
    if any_null(args) {
        return null();
    }
    let n = expect_number(&args[0], "$log")?;
    let base = expect_number(&args[1], "$log")?;
    if base <= 0.0 || base == 1.0 {
        return Err(Error::Type("$log base must be positive and not 1".to_string()));
    }
    logarithm(n, base, "$log")
}

pub fn log10(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let v = one(args, "$log10")?;
    if matches!(v, Value::Null) {
        return null();
    }
    logarithm(expect_number(v, "$log10")?, 10.0, "$log10")
}

/// The elements an aggregate expression folds over: a single array argument
/// spreads out, anything else folds the argument list itself.
fn spread(args: &[Value]) -> Vec<Value> {
    match args {
        [Value::Array(items)] => items.clone(),
        _ => args.to_vec(),
    }
}

/// `$sum` in expression position: non-numeric elements are ignored.
pub fn sum(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let mut acc = Num::Int(0);
    for v in spread(args) {
        if v.is_number() {
            acc = step(acc, Num::of(&v, "$sum")?, i64::checked_add, |x, y| x + y, |x, y| {
                x.checked_add(y)
            });
        }
    }
    ok(acc.into_value())
}

pub fn avg(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let mut total = 0.0;
    let mut count = 0u64;
    for v in spread(args) {
        if let Some(n) = v.as_f64() {
            total += n;
            count += 1;
        }
    }
    if count == 0 {
        return null();
    }
    ok(Value::Double(total / count as f64))
}

pub fn min(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let best = spread(args)
        .into_iter()
        .filter(|v| !matches!(v, Value::Null))
        .min_by(crate::value::compare);
    match best {
        Some(v) => ok(v),
        None => null(),
    }
}

pub fn max(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let best = spread(args)
        .into_iter()
        .filter(|v| !matches!(v, Value::Null))
        .max_by(crate::value::compare);
    match best {
        Some(v) => ok(v),
        None => null(),
    }
}
