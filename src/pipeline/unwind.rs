//! `$unwind`: one output document per array element, in array order.

use crate::ast::stages::UnwindSpec;
use crate::error::{Error, Result};
use crate::options::Options;
use crate::path::{assign, remove, resolve};
use crate::value::Value;

pub fn parse_unwind(spec: &Value) -> Result<UnwindSpec> {
    let (path, include_array_index, preserve) = match spec {
        Value::String(p) => (p.clone(), None, false),
        Value::Object(doc) => {
            let path = doc
                .get("path")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::InvalidSpec("$unwind requires a string 'path'".to_string()))?
                .to_string();
            let idx = match doc.get("includeArrayIndex") {
                None | Some(Value::Null) => None,
                Some(Value::String(name)) => Some(name.clone()),
                Some(_) => {
                    return Err(Error::InvalidSpec(
                        "$unwind includeArrayIndex must be a field name".to_string(),
                    ));
                }
            };
            let preserve = doc
                .get("preserveNullAndEmptyArrays")
                .is_some_and(Value::is_truthy);
            (path, idx, preserve)
        }
        _ => {
            return Err(Error::InvalidSpec(
                "$unwind expects a path or an options document".to_string(),
            ));
        }
    };
    let path = path
        .strip_prefix('$')
        .ok_or_else(|| Error::InvalidSpec("$unwind path must start with $".to_string()))?
        .to_string();
    Ok(UnwindSpec {
        path,
        include_array_index,
        preserve_null_and_empty: preserve,
    })
}

/// The outputs for one input document.
pub fn expand(spec: &UnwindSpec, doc: &Value, _options: &Options) -> Result<Vec<Value>> {
    let with_index = |mut out: Value, idx: Option<i64>| {
        if let Some(name) = &spec.include_array_index {
            assign(
                &mut out,
                name,
                idx.map_or(Value::Null, Value::Int),
            );
        }
        out
    };

    match resolve(doc, &spec.path) {
        // missing or null: dropped, unless preservation keeps the document
        None | Some(Value::Null) => Ok(if spec.preserve_null_and_empty {
            vec![with_index(doc.clone(), None)]
        } else {
            Vec::new()
        }),
        Some(Value::Array(items)) => {
            if items.is_empty() {
                return Ok(if spec.preserve_null_and_empty {
                    let mut out = doc.clone();
                    remove(&mut out, &spec.path);
                    vec![with_index(out, None)]
                } else {
                    Vec::new()
                });
            }
            let mut outputs = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                let mut out = doc.clone();
                assign(&mut out, &spec.path, item);
                outputs.push(with_index(out, Some(i as i64)));
            }
            Ok(outputs)
        }
        // a non-array value passes through as a single output
        Some(_) => Ok(vec![with_index(doc.clone(), None)]),
    }
}
