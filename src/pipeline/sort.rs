//! `$sort`: stable, collation-aware, blocking.

use std::cmp::Ordering;

use crate::ast::stages::SortSpec;
use crate::collation::Collator;
use crate::error::{Error, Result};
use crate::options::Options;
use crate::path::resolve;
use crate::value::{compare_with, Value};

pub fn parse_sort(spec: &Value) -> Result<SortSpec> {
    let Value::Object(doc) = spec else {
        return Err(Error::InvalidSpec("$sort expects a document".to_string()));
    };
    if doc.is_empty() {
        return Err(Error::InvalidSpec("$sort requires at least one field".to_string()));
    }
    let mut keys = Vec::with_capacity(doc.len());
    for (path, dir) in doc {
        let dir = dir
            .as_i64()
            .filter(|d| *d == 1 || *d == -1)
            .ok_or_else(|| Error::InvalidSpec("$sort directions must be 1 or -1".to_string()))?;
        keys.push((path.clone(), dir as i32));
    }
    Ok(SortSpec { keys })
}

pub fn execute(spec: &SortSpec, docs: Vec<Value>, options: &Options) -> Result<Vec<Value>> {
    let collator = options.collation.as_ref().map(|c| c.collator());
    let collator_ref = collator.as_ref().map(|c| c as &dyn Collator);

    // each sort key is computed exactly once per document, then dropped
    // with the decoration when the stage finishes
    let mut decorated: Vec<(Vec<Value>, Value)> = docs
        .into_iter()
        .map(|doc| {
            let keys = spec
                .keys
                .iter()
                .map(|(path, _)| resolve(&doc, path).unwrap_or(Value::Null))
                .collect();
            (keys, doc)
        })
        .collect();

    decorated.sort_by(|(ka, _), (kb, _)| {
        for (i, (_, dir)) in spec.keys.iter().enumerate() {
            let ord = compare_with(&ka[i], &kb[i], collator_ref);
            if ord != Ordering::Equal {
                return if *dir == -1 { ord.reverse() } else { ord };
            }
        }
        Ordering::Equal
    });

    Ok(decorated.into_iter().map(|(_, doc)| doc).collect())
}
