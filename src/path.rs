//! Dotted-path navigation over documents and arrays.
//!
//! A path like `"a.b.2.c"` is interpreted segment by segment, left to right:
//!
//! - on a document, the segment is a key lookup (a numeric segment matches a
//!   literal key such as `"2"`);
//! - on an array, a numeric segment indexes into it;
//! - on an array, a non-numeric segment **maps** the rest of the path across
//!   every element, collecting the results into a new array and omitting
//!   elements that resolve to nothing. This implicit traversal is what makes
//!   `"items.price"` reach into an array of documents.
//!
//! Unresolved paths are never an error; they yield `None`.

use crate::value::{Document, Value};

/// A single step of a dotted path.
///
/// # Examples
/// - `"user.email"` → `[Field("user"), Field("email")]`
/// - `"items.0.price"` → `[Field("items"), Field("0"), Field("price")]`
///
/// Whether a numeric segment acts as an array index or a literal key is
/// decided by the container it lands on, so segments stay plain strings.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment<'a>(pub &'a str);

impl<'a> Segment<'a> {
    fn as_index(&self) -> Option<usize> {
        if self.0.is_empty() || !self.0.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        self.0.parse().ok()
    }
}

fn split(path: &str) -> Vec<Segment<'_>> {
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('.').map(Segment).collect()
    }
}

/// Resolves `path` against `value`. `None` means the path reaches nothing
/// (the missing sentinel); the empty path resolves to the value itself.
pub fn resolve(value: &Value, path: &str) -> Option<Value> {
    resolve_segments(value, &split(path))
}

fn resolve_segments(current: &Value, segments: &[Segment<'_>]) -> Option<Value> {
    let Some(seg) = segments.first() else {
        return Some(current.clone());
    };
    let rest = &segments[1..];
    match current {
        Value::Object(map) => map.get(seg.0).and_then(|child| resolve_segments(child, rest)),
        Value::Array(items) => match seg.as_index() {
            Some(i) => items.get(i).and_then(|child| resolve_segments(child, rest)),
            None => {
                // implicit traversal: map the remaining path over every element
                let mut collected = Vec::new();
                for item in items {
                    if let Some(v) = resolve_segments(item, segments) {
                        collected.push(v);
                    }
                }
                Some(Value::Array(collected))
            }
        },
        _ => None,
    }
}

/// Assigns `value` at `path`, creating intermediate documents as needed.
///
/// Numeric segments applied to arrays replace or extend (padding with nulls);
/// a non-numeric segment applied to an array replicates the assignment into
/// each element, mirroring the mapping rule of [`resolve`]. Type mismatches
/// along the way are silently skipped.
pub fn assign(target: &mut Value, path: &str, value: Value) {
    let segments = split(path);
    if segments.is_empty() {
        *target = value;
        return;
    }
    assign_segments(target, &segments, &value);
}

fn assign_segments(current: &mut Value, segments: &[Segment<'_>], value: &Value) {
    let seg = &segments[0];
    let rest = &segments[1..];

    if rest.is_empty() {
        match current {
            Value::Object(map) => {
                map.insert(seg.0.to_string(), value.clone());
            }
            Value::Array(items) => match seg.as_index() {
                Some(i) => {
                    if i >= items.len() {
                        items.resize(i + 1, Value::Null);
                    }
                    items[i] = value.clone();
                }
                None => {
                    for item in items {
                        if matches!(item, Value::Object(_) | Value::Array(_)) {
                            assign_segments(item, segments, value);
                        }
                    }
                }
            },
            _ => {}
        }
        return;
    }

    match current {
        Value::Object(map) => {
            let child = map
                .entry(seg.0.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            assign_segments(child, rest, value);
        }
        Value::Array(items) => match seg.as_index() {
            Some(i) => {
                if i >= items.len() {
                    items.resize(i + 1, Value::Null);
                }
                if matches!(items[i], Value::Null) {
                    items[i] = Value::Object(Document::new());
                }
                assign_segments(&mut items[i], rest, value);
            }
            None => {
                for item in items {
                    if matches!(item, Value::Object(_) | Value::Array(_)) {
                        assign_segments(item, segments, value);
                    }
                }
            }
        },
        _ => {}
    }
}

/// Removes the value at `path`. Containers that become empty are left in
/// place; a path that reaches nothing is a silent no-op.
pub fn remove(target: &mut Value, path: &str) {
    let segments = split(path);
    if segments.is_empty() {
        return;
    }
    remove_segments(target, &segments);
}

fn remove_segments(current: &mut Value, segments: &[Segment<'_>]) {
    let seg = &segments[0];
    let rest = &segments[1..];

    if rest.is_empty() {
        match current {
            Value::Object(map) => {
                map.shift_remove(seg.0);
            }
            Value::Array(items) => match seg.as_index() {
                Some(i) => {
                    if i < items.len() {
                        items.remove(i);
                    }
                }
                None => {
                    for item in items {
                        remove_segments(item, segments);
                    }
                }
            },
            _ => {}
        }
        return;
    }

    match current {
        Value::Object(map) => {
            if let Some(child) = map.get_mut(seg.0) {
                remove_segments(child, rest);
            }
        }
        Value::Array(items) => match seg.as_index() {
            Some(i) => {
                if let Some(child) = items.get_mut(i) {
                    remove_segments(child, rest);
                }
            }
            None => {
                for item in items {
                    remove_segments(item, segments);
                }
            }
        },
        _ => {}
    }
}
