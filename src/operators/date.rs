//! Date operators. All computation is in UTC.
//!
//! The part extractors accept either a bare date argument or the keyword
//! form `{date: ...}`. `$dateToString` implements the `%`-code table the
//! format option documents; `$dateFromString` is its parsing inverse.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};

use crate::error::{Error, Result};
use crate::operators::{null, ok, one, OpCtx};
use crate::value::{Document, Value};

/// The date argument of an extraction operator, unwrapping the keyword form.
fn date_arg(args: &[Value], op: &str) -> Result<Option<DateTime<Utc>>> {
    let v = one(args, op)?;
    let v = match v {
        Value::Object(doc) => doc.get("date").unwrap_or(v),
        other => other,
    };
    match v {
        Value::Null => Ok(None),
        Value::Date(dt) => Ok(Some(*dt)),
        other => Err(Error::Type(format!(
            "{op} expects a date, found {}",
            other.type_name()
        ))),
    }
}

fn extract(args: &[Value], op: &str, f: fn(&DateTime<Utc>) -> i64) -> Result<Option<Value>> {
    match date_arg(args, op)? {
        Some(dt) => ok(Value::Int(f(&dt))),
        None => null(),
    }
}

pub fn year(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    extract(args, "$year", |dt| dt.year() as i64)
}

pub fn month(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    extract(args, "$month", |dt| dt.month() as i64)
}

pub fn day_of_month(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    extract(args, "$dayOfMonth", |dt| dt.day() as i64)
}

pub fn hour(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    extract(args, "$hour", |dt| dt.hour() as i64)
}

pub fn minute(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    extract(args, "$minute", |dt| dt.minute() as i64)
}

pub fn second(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    extract(args, "$second", |dt| dt.second() as i64)
}

pub fn millisecond(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    extract(args, "$millisecond", |dt| (dt.timestamp_subsec_millis()) as i64)
}

/// 1 (Sunday) through 7 (Saturday).
pub fn day_of_week(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    extract(args, "$dayOfWeek", |dt| {
        (dt.weekday().num_days_from_sunday() + 1) as i64
    })
}

pub fn day_of_year(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    extract(args, "$dayOfYear", |dt| dt.ordinal() as i64)
}

/// Sunday-based week of the year, 0 through 53.
pub fn week(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    extract(args, "$week", sunday_week)
}

fn sunday_week(dt: &DateTime<Utc>) -> i64 {
    let ordinal = dt.ordinal() as i64;
    let weekday = dt.weekday().num_days_from_sunday() as i64;
    (ordinal - weekday + 6) / 7
}

pub fn iso_week(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    extract(args, "$isoWeek", |dt| dt.iso_week().week() as i64)
}

pub fn iso_week_year(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    extract(args, "$isoWeekYear", |dt| dt.iso_week().year() as i64)
}

/// 1 (Monday) through 7 (Sunday).
pub fn iso_day_of_week(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    extract(args, "$isoDayOfWeek", |dt| {
        dt.weekday().number_from_monday() as i64
    })
}

/// Renders one `%` code; unknown codes are an error so typos fail loudly.
fn render_code(dt: &DateTime<Utc>, code: char, out: &mut String) -> Result<()> {
    match code {
        'Y' => out.push_str(&format!("{:04}", dt.year())),
        'm' => out.push_str(&format!("{:02}", dt.month())),
        'd' => out.push_str(&format!("{:02}", dt.day())),
        'H' => out.push_str(&format!("{:02}", dt.hour())),
        'M' => out.push_str(&format!("{:02}", dt.minute())),
        'S' => out.push_str(&format!("{:02}", dt.second())),
        'L' => out.push_str(&format!("{:03}", dt.timestamp_subsec_millis())),
        'j' => out.push_str(&format!("{:03}", dt.ordinal())),
        'w' => out.push_str(&(dt.weekday().num_days_from_sunday() + 1).to_string()),
        'u' => out.push_str(&dt.weekday().number_from_monday().to_string()),
        'U' => out.push_str(&format!("{:02}", sunday_week(dt))),
        'V' => out.push_str(&format!("{:02}", dt.iso_week().week())),
        'G' => out.push_str(&format!("{:04}", dt.iso_week().year())),
        'z' => out.push_str("+0000"),
        'Z' => out.push('0'),
        '%' => out.push('%'),
        other => {
            return Err(Error::InvalidSpec(format!(
                "unknown format code %{other}"
            )));
        }
    }
    Ok(())
}

pub fn format_date(dt: &DateTime<Utc>, format: &str) -> Result<String> {
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(code) => render_code(dt, code, &mut out)?,
            None => {
                return Err(Error::InvalidSpec(
                    "format string ends with a bare %".to_string(),
                ));
            }
        }
    }
    Ok(out)
}

pub fn date_to_string(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let doc = match one(args, "$dateToString")? {
        Value::Object(doc) => doc,
        other => {
            return Err(Error::InvalidSpec(format!(
                "$dateToString expects a document argument, found {}",
                other.type_name()
            )));
        }
    };
    let date = doc
        .get("date")
        .ok_or_else(|| Error::InvalidSpec("$dateToString requires 'date'".to_string()))?;
    let dt = match date {
        Value::Date(dt) => dt,
        Value::Null => {
            return match doc.get("onNull") {
                Some(v) => ok(v.clone()),
                None => null(),
            };
        }
        other => {
            return Err(Error::Type(format!(
                "$dateToString expects a date, found {}",
                other.type_name()
            )));
        }
    };
    let format = match doc.get("format") {
        None => "%Y-%m-%dT%H:%M:%S.%LZ",
        Some(Value::String(f)) => f.as_str(),
        Some(other) => {
            return Err(Error::InvalidSpec(format!(
                "$dateToString format must be a string, found {}",
                other.type_name()
            )));
        }
    };
    ok(Value::String(format_date(dt, format)?))
}

/// Maps the `%` codes onto their chrono equivalents for parsing.
fn chrono_format(format: &str) -> String {
    format.replace("%L", "%3f")
}

pub fn date_from_string(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let doc = match one(args, "$dateFromString")? {
        Value::Object(doc) => doc,
        other => {
            return Err(Error::InvalidSpec(format!(
                "$dateFromString expects a document argument, found {}",
                other.type_name()
            )));
        }
    };
    let input = doc
        .get("dateString")
        .ok_or_else(|| Error::InvalidSpec("$dateFromString requires 'dateString'".to_string()))?;
    let s = match input {
        Value::String(s) => s,
        Value::Null => {
            return match doc.get("onNull") {
                Some(v) => ok(v.clone()),
                None => null(),
            };
        }
        other => {
            return Err(Error::Type(format!(
                "$dateFromString expects a string, found {}",
                other.type_name()
            )));
        }
    };
    let parsed = match doc.get("format") {
        Some(Value::String(f)) => {
            let f = chrono_format(f);
            NaiveDateTime::parse_from_str(s, &f)
                .map(|naive| naive.and_utc())
                .or_else(|_| {
                    NaiveDate::parse_from_str(s, &f)
                        .map(|d| d.and_hms_opt(0, 0, 0).expect("midnight is valid").and_utc())
                })
                .ok()
        }
        _ => super::type_ops::parse_date_str(s),
    };
    match parsed {
        Some(dt) => ok(Value::Date(dt)),
        None => match doc.get("onError") {
            Some(v) => ok(v.clone()),
            None => Err(Error::Type(format!("cannot parse date from '{s}'"))),
        },
    }
}

pub fn date_to_parts(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let doc = match one(args, "$dateToParts")? {
        Value::Object(doc) => doc,
        other => {
            return Err(Error::InvalidSpec(format!(
                "$dateToParts expects a document argument, found {}",
                other.type_name()
            )));
        }
    };
    let dt = match doc.get("date") {
        Some(Value::Date(dt)) => *dt,
        Some(Value::Null) | None => return null(),
        Some(other) => {
            return Err(Error::Type(format!(
                "$dateToParts expects a date, found {}",
                other.type_name()
            )));
        }
    };
    let iso = doc.get("iso8601").is_some_and(Value::is_truthy);
    let mut parts = Document::new();
    if iso {
        parts.insert("isoWeekYear".to_string(), Value::Int(dt.iso_week().year() as i64));
        parts.insert("isoWeek".to_string(), Value::Int(dt.iso_week().week() as i64));
        parts.insert(
            "isoDayOfWeek".to_string(),
            Value::Int(dt.weekday().number_from_monday() as i64),
        );
    } else {
        parts.insert("year".to_string(), Value::Int(dt.year() as i64));
        parts.insert("month".to_string(), Value::Int(dt.month() as i64));
        parts.insert("day".to_string(), Value::Int(dt.day() as i64));
    }
    parts.insert("hour".to_string(), Value::Int(dt.hour() as i64));
    parts.insert("minute".to_string(), Value::Int(dt.minute() as i64));
    parts.insert("second".to_string(), Value::Int(dt.second() as i64));
    parts.insert(
        "millisecond".to_string(),
        Value::Int(dt.timestamp_subsec_millis() as i64),
    );
    ok(Value::Object(parts))
}
