//! Type inspection and conversion.
//!
//! `$convert` is the general form; `$toInt`, `$toDouble` and the other
//! shorthands delegate to it with no `onError`/`onNull` escape, which makes
//! them part of the raising subset of operators.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::{prelude::FromPrimitive, prelude::ToPrimitive, Decimal};

use crate::error::{Error, Result};
use crate::operators::{null, ok, one, OpCtx};
use crate::value::{date_from_millis, Value};

pub fn type_of(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    ok(Value::String(one(args, "$type")?.type_name().to_string()))
}

pub fn is_number(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    ok(Value::Bool(one(args, "$isNumber")?.is_number()))
}

/// The conversion targets `$convert` understands, by name or numeric code.
fn target_name(to: &Value) -> Result<&'static str> {
    let name = match to {
        Value::String(s) => match s.as_str() {
            "double" => "double",
            "string" => "string",
            "bool" => "bool",
            "date" => "date",
            "int" => "int",
            "long" => "long",
            "decimal" => "decimal",
            other => {
                return Err(Error::InvalidSpec(format!("$convert cannot target '{other}'")));
            }
        },
        Value::Int(code) => match code {
            1 => "double",
            2 => "string",
            8 => "bool",
            9 => "date",
            16 => "int",
            18 => "long",
            19 => "decimal",
            other => {
                return Err(Error::InvalidSpec(format!("$convert cannot target code {other}")));
            }
        },
        other => {
            return Err(Error::InvalidSpec(format!(
                "$convert 'to' must be a type name or code, found {}",
                other.type_name()
            )));
        }
    };
    Ok(name)
}

pub(crate) fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn cast(value: &Value, target: &str) -> Result<Value> {
    let fail = || {
        Error::Type(format!(
            "cannot convert {} to {target}",
            value.type_name()
        ))
    };
    let out = match target {
        "double" => match value {
            Value::Double(n) => Value::Double(*n),
            Value::Int(n) => Value::Double(*n as f64),
            Value::Decimal(d) => Value::Double(d.to_f64().ok_or_else(fail)?),
            Value::Bool(b) => Value::Double(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => Value::Double(s.trim().parse().map_err(|_| fail())?),
            Value::Date(dt) => Value::Double(dt.timestamp_millis() as f64),
            _ => return Err(fail()),
        },
        "int" | "long" => match value {
            Value::Int(n) => Value::Int(*n),
            Value::Double(n) => {
                if n.is_finite() {
                    Value::Int(n.trunc() as i64)
                } else {
                    return Err(fail());
                }
            }
            Value::Decimal(d) => Value::Int(d.trunc().to_i64().ok_or_else(fail)?),
            Value::Bool(b) => Value::Int(i64::from(*b)),
            Value::String(s) => Value::Int(s.trim().parse().map_err(|_| fail())?),
            Value::Date(dt) => Value::Int(dt.timestamp_millis()),
            _ => return Err(fail()),
        },
        "decimal" => match value {
            Value::Decimal(d) => Value::Decimal(*d),
            Value::Int(n) => Value::Decimal(Decimal::from_i64(*n).ok_or_else(fail)?),
            Value::Double(n) => Value::Decimal(Decimal::from_f64(*n).ok_or_else(fail)?),
            Value::Bool(b) => Value::Decimal(if *b { Decimal::ONE } else { Decimal::ZERO }),
            Value::String(s) => Value::Decimal(s.trim().parse().map_err(|_| fail())?),
            Value::Date(dt) => {
                Value::Decimal(Decimal::from_i64(dt.timestamp_millis()).ok_or_else(fail)?)
            }
            _ => return Err(fail()),
        },
        "bool" => Value::Bool(value.is_truthy()),
        "string" => match value {
            Value::String(s) => Value::String(s.clone()),
            Value::Int(n) => Value::String(n.to_string()),
            Value::Double(n) => Value::String(n.to_string()),
            Value::Decimal(d) => Value::String(d.to_string()),
            Value::Bool(b) => Value::String(b.to_string()),
            Value::Date(dt) => {
                Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
            }
            _ => return Err(fail()),
        },
        "date" => match value {
            Value::Date(dt) => Value::Date(*dt),
            Value::Int(n) => date_from_millis(*n).ok_or_else(fail)?,
            Value::Double(n) => date_from_millis(*n as i64).ok_or_else(fail)?,
            Value::Decimal(d) => {
                date_from_millis(d.trunc().to_i64().ok_or_else(fail)?).ok_or_else(fail)?
            }
            Value::String(s) => Value::Date(parse_date_str(s).ok_or_else(fail)?),
            _ => return Err(fail()),
        },
        _ => return Err(fail()),
    };
    Ok(out)
}

pub fn convert(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let doc = match one(args, "$convert")? {
        Value::Object(doc) => doc,
        other => {
            return Err(Error::InvalidSpec(format!(
                "$convert expects a document argument, found {}",
                other.type_name()
            )));
        }
    };
    let input = doc
        .get("input")
        .ok_or_else(|| Error::InvalidSpec("$convert requires 'input'".to_string()))?;
    let to = doc
        .get("to")
        .ok_or_else(|| Error::InvalidSpec("$convert requires 'to'".to_string()))?;
    let target = target_name(to)?;
    if matches!(input, Value::Null) {
        return match doc.get("onNull") {
            Some(v) => ok(v.clone()),
            None => null(),
        };
    }
    match cast(input, target) {
        Ok(v) => ok(v),
        Err(e) => match doc.get("onError") {
            Some(v) => ok(v.clone()),
            None => Err(e),
        },
    }
}

fn shorthand(args: &[Value], op: &str, target: &str) -> Result<Option<Value>> {
    let v = one(args, op)?;
    if matches!(v, Value::Null) {
        return null();
    }
    cast(v, target).map(Some)
}

pub fn to_bool(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let v = one(args, "$toBool")?;
    if matches!(v, Value::Null) {
        return null();
    }
    // string input always converts to true, matching the documented table
    ok(Value::Bool(match v {
        Value::String(_) => true,
        other => other.is_truthy(),
    }))
}

pub fn to_long(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    shorthand(args, "$toLong", "long")
}

pub fn to_double(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    shorthand(args, "$toDouble", "double")
}

pub fn to_decimal(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    shorthand(args, "$toDecimal", "decimal")
}

pub fn to_string(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    shorthand(args, "$toString", "string")
}

pub fn to_date(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    shorthand(args, "$toDate", "date")
}
