//! Deterministic canonical serialization of values.
//!
//! `$group`, `$addToSet` and the set operators need a hash key under which two
//! values collide exactly when they are equal under the canonical order. The
//! writer here produces such a key: numbers are normalized so `1`, `1.0` and
//! `Decimal(1)` serialize identically, strings can be folded through a
//! collation sort key, and document keys keep insertion order (document
//! equality is order-sensitive).
//!
//! The output is a compact JSON-like string. It is an internal format, not
//! meant for interchange.

use base64::Engine as _;

use crate::collation::Collator;
use crate::value::Value;

pub struct KeyWriter<'a> {
    collator: Option<&'a dyn Collator>,
}

impl<'a> KeyWriter<'a> {
    pub fn new(collator: Option<&'a dyn Collator>) -> Self {
        KeyWriter { collator }
    }

    pub fn write(&self, value: &Value) -> String {
        let mut out = String::new();
        self.write_value(value, &mut out);
        out
    }

    fn write_value(&self, value: &Value, out: &mut String) {
        match value {
            Value::Null => out.push_str("null"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Int(_) | Value::Double(_) | Value::Decimal(_) => {
                out.push_str(&canonical_number(value))
            }
            Value::String(s) => {
                out.push('"');
                let folded;
                let text = match self.collator {
                    Some(c) => {
                        folded = c.sort_key(s);
                        folded.as_str()
                    }
                    None => s.as_str(),
                };
                out.push_str(&escape_string(text));
                out.push('"');
            }
            Value::Date(dt) => {
                out.push_str("Date(");
                out.push_str(&dt.timestamp_millis().to_string());
                out.push(')');
            }
            Value::Regex { pattern, options } => {
                out.push('/');
                out.push_str(pattern);
                out.push('/');
                out.push_str(options);
            }
            Value::Binary { subtype, bytes } => {
                out.push_str("Bin(");
                out.push_str(&subtype.to_string());
                out.push(',');
                out.push_str(&base64::engine::general_purpose::STANDARD.encode(bytes));
                out.push(')');
            }
            Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    self.write_value(item, out);
                }
                out.push(']');
            }
            Value::Object(doc) => {
                out.push('{');
                for (i, (k, v)) in doc.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push('"');
                    out.push_str(&escape_string(k));
                    out.push_str("\":");
                    self.write_value(v, out);
                }
                out.push('}');
            }
        }
    }
}

/// One normalized text form per numeric value: integral numbers print without
/// a fraction regardless of variant, so `Int(1)`, `Double(1.0)` and
/// `Decimal(1.0)` all become `"1"`.
fn canonical_number(v: &Value) -> String {
    match v {
        Value::Int(n) => n.to_string(),
        Value::Double(n) => {
            if n.is_nan() {
                "NaN".to_string()
            } else if n.is_infinite() {
                (if *n > 0.0 { "Inf" } else { "-Inf" }).to_string()
            } else if n.fract() == 0.0 && n.abs() < 9.0e15 {
                (*n as i64).to_string()
            } else {
                n.to_string()
            }
        }
        Value::Decimal(d) => {
            let d = d.normalize();
            if d.is_integer() {
                d.trunc().to_string()
            } else {
                d.to_string()
            }
        }
        _ => unreachable!("canonical_number on non-numeric value"),
    }
}

fn escape_string(s: &str) -> String {
    s.chars()
        .flat_map(|c| match c {
            '"' => vec!['\\', '"'],
            '\\' => vec!['\\', '\\'],
            '\n' => vec!['\\', 'n'],
            '\r' => vec!['\\', 'r'],
            '\t' => vec!['\\', 't'],
            c if c.is_control() => format!("\\u{:04x}", c as u32).chars().collect(),
            c => vec![c],
        })
        .collect()
}

/// Canonical hash key for a value, optionally folding strings through a
/// collation sort key.
pub fn canonical_key(value: &Value, collator: Option<&dyn Collator>) -> String {
    KeyWriter::new(collator).write(value)
}
