//! Document operators.
//!
//! `$getField` / `$setField` / `$unsetField` exist for field names that
//! contain dots or start with `$`, which dotted paths cannot address.

use crate::error::{Error, Result};
use crate::operators::{expect_string, null, ok, one, OpCtx};
use crate::value::{Document, Value};

pub fn merge_objects(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let mut merged = Document::new();
    for v in args {
        match v {
            Value::Null => {}
            Value::Object(doc) => {
                for (k, item) in doc {
                    merged.insert(k.clone(), item.clone());
                }
            }
            other => {
                return Err(Error::Type(format!(
                    "$mergeObjects expects documents, found {}",
                    other.type_name()
                )));
            }
        }
    }
    ok(Value::Object(merged))
}

/// `{field, input}` keyword form, or a bare field name operating on the
/// current document.
pub fn get_field(args: &[Value], ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let (field, input) = match one(args, "$getField")? {
        Value::String(name) => (name.clone(), ctx.current.clone()),
        Value::Object(doc) => {
            let field = doc
                .get("field")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::InvalidSpec("$getField requires a string 'field'".to_string()))?
                .to_string();
            let input = doc.get("input").cloned().unwrap_or_else(|| ctx.current.clone());
            (field, input)
        }
        other => {
            return Err(Error::InvalidSpec(format!(
                "$getField expects a field name or document, found {}",
                other.type_name()
            )));
        }
    };
    match input {
        Value::Object(doc) => Ok(doc.get(&field).cloned()),
        Value::Null => null(),
        other => Err(Error::Type(format!(
            "$getField input must be a document, found {}",
            other.type_name()
        ))),
    }
}

fn field_and_input<'v>(args: &'v [Value], op: &str) -> Result<(&'v str, &'v Value, &'v Document)> {
    let doc = match one(args, op)? {
        Value::Object(doc) => doc,
        other => {
            return Err(Error::InvalidSpec(format!(
                "{op} expects a document argument, found {}",
                other.type_name()
            )));
        }
    };
    let field = doc
        .get("field")
        .ok_or_else(|| Error::InvalidSpec(format!("{op} requires 'field'")))?;
    let input = doc
        .get("input")
        .ok_or_else(|| Error::InvalidSpec(format!("{op} requires 'input'")))?;
    Ok((expect_string(field, op)?, input, doc))
}

pub fn set_field(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let (field, input, doc) = field_and_input(args, "$setField")?;
    let value = doc
        .get("value")
        .ok_or_else(|| Error::InvalidSpec("$setField requires 'value'".to_string()))?;
    match input {
        Value::Null => null(),
        Value::Object(obj) => {
            let mut out = obj.clone();
            out.insert(field.to_string(), value.clone());
            ok(Value::Object(out))
        }
        other => Err(Error::Type(format!(
            "$setField input must be a document, found {}",
            other.type_name()
        ))),
    }
}

pub fn unset_field(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    let (field, input, _) = field_and_input(args, "$unsetField")?;
    match input {
        Value::Null => null(),
        Value::Object(obj) => {
            let mut out = obj.clone();
            out.shift_remove(field);
            ok(Value::Object(out))
        }
        other => Err(Error::Type(format!(
            "$unsetField input must be a document, found {}",
            other.type_name()
        ))),
    }
}
