//! String operators.
//!
//! Byte-indexed and code-point-indexed variants are distinct operators
//! (`$strLenBytes` / `$strLenCP`, `$substrBytes` / `$substrCP`,
//! `$indexOfBytes` / `$indexOfCP`). The regex operators take the keyword
//! form `{input, regex, options}` and compile their pattern per call.

use crate::error::{Error, Result};
use crate::operators::{any_null, exactly, expect_int, expect_string, null, ok, one, OpCtx};
use crate::parser::compile_regex;
use crate::value::{Document, Value};

/// String coercion for the case operators: null folds to the empty string,
/// numbers print themselves.
fn coerce(v: &Value, op: &str) -> Result<String> {
    match v {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.clone()),
        Value::Int(n) => Ok(n.to_string()),
        Value::Double(n) => Ok(n.to_string()),
        Value::Decimal(d) => Ok(d.to_string()),
        other => Err(Error::Type(format!(
            "{op} expects a string, found {}",
            other.type_name()
        ))),
    }
}

/// The single keyword-form argument document.
fn named<'v>(args: &'v [Value], op: &str) -> Result<&'v Document> {
    match one(args, op)? {
        Value::Object(doc) => Ok(doc),
        other => Err(Error::InvalidSpec(format!(
            "{op} expects a document argument, found {}",
            other.type_name()
        ))),
    }
}

pub fn concat(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    if any_null(args) {
        return null();
    }
    let mut out = String::new();
    for v in args {
        out.push_str(expect_string(v, "$concat")?);
    }
    ok(Value::String(out))
}

pub fn to_upper(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    ok(Value::String(coerce(one(args, "$toUpper")?, "$toUpper")?.to_uppercase()))
}

pub fn to_lower(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    ok(Value::String(coerce(one(args, "$toLower")?, "$toLower")?.to_lowercase()))
}

pub fn str_len_bytes(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    ok(Value::Int(expect_string(one(args, "$strLenBytes")?, "$strLenBytes")?.len() as i64))
}

pub fn str_len_cp(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    ok(Value::Int(
        expect_string(one(args, "$strLenCP")?, "$strLenCP")?.chars().count() as i64,
    ))
}

pub fn substr_bytes(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let args = exactly(args, 3, "$substrBytes")?;
    if matches!(args[0], Value::Null) {
        return ok(Value::String(String::new()));
    }
    let s = expect_string(&args[0], "$substrBytes")?;
    let start = expect_int(&args[1], "$substrBytes")?;
    let count = expect_int(&args[2], "$substrBytes")?;
    if start < 0 || start as usize >= s.len() {
        return ok(Value::String(String::new()));
    }
    let start = start as usize;
    let end = if count < 0 {
        s.len()
    } else {
        (start + count as usize).min(s.len())
    };
    match s.get(start..end) {
        Some(sub) => ok(Value::String(sub.to_string())),
        None => Err(Error::Type(
            "$substrBytes range splits a UTF-8 character".to_string(),
        )),
    }
}

pub fn substr_cp(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let args = exactly(args, 3, "$substrCP")?;
    if matches!(args[0], Value::Null) {
        return ok(Value::String(String::new()));
    }
    let s = expect_string(&args[0], "$substrCP")?;
    let start = expect_int(&args[1], "$substrCP")?.max(0) as usize;
    let count = expect_int(&args[2], "$substrCP")?;
    let taken: String = if count < 0 {
        s.chars().skip(start).collect()
    } else {
        s.chars().skip(start).take(count as usize).collect()
    };
    ok(Value::String(taken))
}

pub fn split(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let args = exactly(args, 2, "$split")?;
    if any_null(args) {
        return null();
    }
    let s = expect_string(&args[0], "$split")?;
    let delim = expect_string(&args[1], "$split")?;
    if delim.is_empty() {
        return Err(Error::InvalidSpec("$split delimiter must not be empty".to_string()));
    }
    ok(Value::Array(
        s.split(delim).map(|part| Value::String(part.to_string())).collect(),
    ))
}

fn trim_impl(
    args: &[Value],
    op: &str,
    apply: fn(&str, &dyn Fn(char) -> bool) -> String,
) -> Result<Option<Value>> {
    let doc = named(args, op)?;
    let input = doc
        .get("input")
        .ok_or_else(|| Error::InvalidSpec(format!("{op} requires 'input'")))?;
    if matches!(input, Value::Null) {
        return null();
    }
    let s = expect_string(input, op)?;
    let trimmed = match doc.get("chars") {
        None | Some(Value::Null) => apply(s, &|c: char| c.is_whitespace()),
        Some(chars) => {
            let set: Vec<char> = expect_string(chars, op)?.chars().collect();
            apply(s, &move |c: char| set.contains(&c))
        }
    };
    ok(Value::String(trimmed))
}

pub fn trim(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    trim_impl(args, "$trim", |s, pred| s.trim_matches(pred).to_string())
}

pub fn ltrim(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    trim_impl(args, "$ltrim", |s, pred| s.trim_start_matches(pred).to_string())
}

pub fn rtrim(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    trim_impl(args, "$rtrim", |s, pred| s.trim_end_matches(pred).to_string())
}

fn index_of(args: &[Value], op: &str, by_bytes: bool) -> Result<Option<Value>> {
    if args.len() < 2 || args.len() > 4 {
        return Err(Error::InvalidSpec(format!("{op} expects 2 to 4 arguments")));
    }
    if matches!(args[0], Value::Null) {
        return null();
    }
    let s = expect_string(&args[0], op)?;
    let sub = expect_string(&args[1], op)?;
    let len = if by_bytes { s.len() } else { s.chars().count() };
    let start = match args.get(2) {
        Some(v) => expect_int(v, op)?.max(0) as usize,
        None => 0,
    };
    let end = match args.get(3) {
        Some(v) => (expect_int(v, op)?.max(0) as usize).min(len),
        None => len,
    };
    if start > end {
        return ok(Value::Int(-1));
    }
    let found = if by_bytes {
        match s.get(start..end) {
            Some(window) => window.find(sub).map(|i| start + i),
            None => None,
        }
    } else {
        let window: String = s.chars().skip(start).take(end - start).collect();
        window.find(sub).map(|byte_idx| {
            // translate the byte offset back to a code-point index
            start + window[..byte_idx].chars().count()
        })
    };
    ok(Value::Int(found.map_or(-1, |i| i as i64)))
}

pub fn index_of_bytes(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    index_of(args, "$indexOfBytes", true)
}

pub fn index_of_cp(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    index_of(args, "$indexOfCP", false)
}

pub fn strcasecmp(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let args = exactly(args, 2, "$strcasecmp")?;
    let a = coerce(&args[0], "$strcasecmp")?.to_lowercase();
    let b = coerce(&args[1], "$strcasecmp")?.to_lowercase();
    ok(Value::Int(match a.cmp(&b) {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    }))
}

fn replace_impl(args: &[Value], op: &str, all: bool) -> Result<Option<Value>> {
    let doc = named(args, op)?;
    let get = |name: &str| {
        doc.get(name)
            .ok_or_else(|| Error::InvalidSpec(format!("{op} requires '{name}'")))
    };
    let input = get("input")?;
    let find = get("find")?;
    let replacement = get("replacement")?;
    if matches!(input, Value::Null) || matches!(find, Value::Null) || matches!(replacement, Value::Null)
    {
        return null();
    }
    let s = expect_string(input, op)?;
    let find = expect_string(find, op)?;
    let replacement = expect_string(replacement, op)?;
    ok(Value::String(if all {
        s.replace(find, replacement)
    } else {
        s.replacen(find, replacement, 1)
    }))
}

pub fn replace_one(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    replace_impl(args, "$replaceOne", false)
}

pub fn replace_all(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    replace_impl(args, "$replaceAll", true)
}

/// Pulls `{input, regex, options}` apart and compiles the pattern; a null
/// input or null regex short-circuits to `None`.
fn regex_args<'v>(
    args: &'v [Value],
    op: &str,
) -> Result<Option<(&'v str, crate::ast::CompiledRegex)>> {
    let doc = named(args, op)?;
    let input = doc
        .get("input")
        .ok_or_else(|| Error::InvalidSpec(format!("{op} requires 'input'")))?;
    let regex = doc
        .get("regex")
        .ok_or_else(|| Error::InvalidSpec(format!("{op} requires 'regex'")))?;
    if matches!(input, Value::Null) || matches!(regex, Value::Null) {
        return Ok(None);
    }
    let input = expect_string(input, op)?;
    let extra = match doc.get("options") {
        None | Some(Value::Null) => "",
        Some(v) => expect_string(v, op)?,
    };
    let compiled = match regex {
        Value::String(pattern) => compile_regex(pattern, extra)?,
        Value::Regex { pattern, options } => {
            let mut flags = options.clone();
            for f in extra.chars() {
                if !flags.contains(f) {
                    flags.push(f);
                }
            }
            compile_regex(pattern, &flags)?
        }
        other => {
            return Err(Error::Type(format!(
                "{op} regex must be a string or regex, found {}",
                other.type_name()
            )));
        }
    };
    Ok(Some((input, compiled)))
}

fn match_doc(input: &str, m: regex::Match<'_>, captures: &regex::Captures<'_>) -> Value {
    let mut doc = Document::new();
    doc.insert("match".to_string(), Value::String(m.as_str().to_string()));
    doc.insert(
        "idx".to_string(),
        Value::Int(input[..m.start()].chars().count() as i64),
    );
    let groups: Vec<Value> = captures
        .iter()
        .skip(1)
        .map(|g| match g {
            Some(g) => Value::String(g.as_str().to_string()),
            None => Value::Null,
        })
        .collect();
    doc.insert("captures".to_string(), Value::Array(groups));
    Value::Object(doc)
}

pub fn regex_match(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    match regex_args(args, "$regexMatch")? {
        Some((input, re)) => ok(Value::Bool(re.is_match(input))),
        None => ok(Value::Bool(false)),
    }
}

pub fn regex_find(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let Some((input, re)) = regex_args(args, "$regexFind")? else {
        return null();
    };
    match re.regex.captures(input) {
        Some(caps) => {
            let m = caps.get(0).expect("group 0 always present");
            ok(match_doc(input, m, &caps))
        }
        None => null(),
    }
}

pub fn regex_find_all(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let Some((input, re)) = regex_args(args, "$regexFindAll")? else {
        return ok(Value::Array(Vec::new()));
    };
    let mut out = Vec::new();
    for caps in re.regex.captures_iter(input) {
        let m = caps.get(0).expect("group 0 always present");
        out.push(match_doc(input, m, &caps));
    }
    ok(Value::Array(out))
}
