use std::cmp::Ordering;

use chrono::{DateTime, TimeZone, Utc};
use indexmap::IndexMap;
use rust_decimal::{prelude::FromPrimitive, prelude::ToPrimitive, Decimal};

use crate::collation::Collator;

/// An insertion-ordered mapping from field name to [`Value`].
///
/// Key order is preserved through every transformation unless a stage
/// explicitly reorders (`$project` emits keys in spec order).
pub type Document = IndexMap<String, Value>;

/// A document value used throughout the engine.
///
/// This type represents all JSON types with a distinction between integers
/// and doubles (observable through `$type`), plus the extended scalar types
/// a document database carries: high-precision decimals, dates, regular
/// expressions and binary payloads.
///
/// # Missing fields
///
/// There is deliberately no `Missing` variant. The absence of a field is
/// modelled as the `None` half of an `Option<Value>` at every lookup
/// boundary, so a missing field can never be stored inside a container;
/// assigning a missing value to a path removes the key instead.
///
/// # Examples
///
/// ```
/// use nutmeg::Value;
///
/// let v = Value::from(serde_json::json!({"a": [1, 2.5, "x"]}));
/// assert_eq!(v.type_name(), "object");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Explicit null, distinct from a missing field
    Null,

    /// Boolean (true/false)
    Bool(bool),

    /// 64-bit integer (preserved separately from doubles)
    Int(i64),

    /// Double-precision float
    Double(f64),

    /// Arbitrary-precision decimal
    Decimal(Decimal),

    /// UTF-8 string
    String(String),

    /// Point in time with millisecond precision
    Date(DateTime<Utc>),

    /// Regular expression pattern plus flag string (`i`, `m`, `s`, `x`)
    Regex { pattern: String, options: String },

    /// Opaque byte payload with a subtype tag
    Binary { subtype: u8, bytes: Vec<u8> },

    /// Ordered sequence of values
    Array(Vec<Value>),

    /// Insertion-ordered document
    Object(Document),
}

impl Value {
    /// Truthiness for conditions (`$cond`, `$and`, `$or`, `$switch`).
    ///
    /// Only `null`, `false` and numeric zero are falsy; empty strings,
    /// empty arrays and empty documents are truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Double(n) => *n != 0.0 && !n.is_nan(),
            Value::Decimal(d) => !d.is_zero(),
            _ => true,
        }
    }

    /// True for `Int`, `Double` and `Decimal`.
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Double(_) | Value::Decimal(_))
    }

    /// Numeric view as a double, when the value is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Double(n) => Some(*n),
            Value::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    /// Integer view, accepting doubles and decimals with an integral value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Double(n) if n.fract() == 0.0 => Some(*n as i64),
            Value::Decimal(d) if d.is_integer() => d.to_i64(),
            _ => None,
        }
    }

    /// Decimal view, when the value is numeric.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Int(n) => Decimal::from_i64(*n),
            Value::Double(n) => Decimal::from_f64(*n),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Document> {
        match self {
            Value::Object(d) => Some(d),
            _ => None,
        }
    }

    /// The type name reported by `$type`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "long",
            Value::Double(_) => "double",
            Value::Decimal(_) => "decimal",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Regex { .. } => "regex",
            Value::Binary { .. } => "binData",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Whether this value answers to the given `$type` alias.
    ///
    /// `"number"` covers every numeric variant; 64-bit integers answer to
    /// both `"int"` and `"long"`.
    pub fn matches_type(&self, name: &str) -> bool {
        match name {
            "number" => self.is_number(),
            "int" | "long" => matches!(self, Value::Int(_)),
            other => self.type_name() == other,
        }
    }
}

/// Rank of each type in the cross-type total order, following the BSON
/// canonical comparison order restricted to the variants carried here.
/// All numeric variants share one rank and compare by numeric value.
fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 2,
        Value::Int(_) | Value::Double(_) | Value::Decimal(_) => 3,
        Value::String(_) => 4,
        Value::Object(_) => 5,
        Value::Array(_) => 6,
        Value::Binary { .. } => 7,
        Value::Bool(_) => 9,
        Value::Date(_) => 10,
        Value::Regex { .. } => 12,
    }
}

fn numeric_cmp(a: &Value, b: &Value) -> Ordering {
    if let (Value::Decimal(x), Some(y)) = (a, b.as_decimal()) {
        return x.cmp(&y);
    }
    if let (Some(x), Value::Decimal(y)) = (a.as_decimal(), b) {
        return x.cmp(y);
    }
    let x = a.as_f64().unwrap_or(f64::NAN);
    let y = b.as_f64().unwrap_or(f64::NAN);
    // NaN sorts below every other number so the order stays total
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
    }
}

/// Total order over values: by type rank first, then within the type.
///
/// `Int`, `Double` and `Decimal` compare by numeric value; document
/// comparison is key-order-sensitive.
pub fn compare(a: &Value, b: &Value) -> Ordering {
    compare_with(a, b, None)
}

/// As [`compare`], with string comparisons delegated to a collator.
pub fn compare_with(a: &Value, b: &Value, collator: Option<&dyn Collator>) -> Ordering {
    let (ra, rb) = (type_rank(a), type_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => match collator {
            Some(c) => c.compare(x, y),
            None => x.cmp(y),
        },
        (Value::Date(x), Value::Date(y)) => x.cmp(y),
        (
            Value::Regex { pattern: p1, options: o1 },
            Value::Regex { pattern: p2, options: o2 },
        ) => p1.cmp(p2).then_with(|| o1.cmp(o2)),
        (
            Value::Binary { subtype: s1, bytes: b1 },
            Value::Binary { subtype: s2, bytes: b2 },
        ) => b1
            .len()
            .cmp(&b2.len())
            .then_with(|| s1.cmp(s2))
            .then_with(|| b1.cmp(b2)),
        (Value::Array(x), Value::Array(y)) => {
            for (ea, eb) in x.iter().zip(y.iter()) {
                let ord = compare_with(ea, eb, collator);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            // key-order-sensitive: compare entries pairwise
            for ((ka, va), (kb, vb)) in x.iter().zip(y.iter()) {
                let ord = ka.as_str().cmp(kb.as_str());
                if ord != Ordering::Equal {
                    return ord;
                }
                let ord = compare_with(va, vb, collator);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => numeric_cmp(a, b),
    }
}

/// Semantic equality under the canonical order (`Int(1)` equals
/// `Double(1.0)`, unlike `PartialEq`).
pub fn equivalent(a: &Value, b: &Value) -> bool {
    compare(a, b) == Ordering::Equal
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::Double(u as f64)
                } else {
                    Value::Double(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                let mut doc = Document::new();
                for (k, v) in map {
                    doc.insert(k, Value::from(v));
                }
                Value::Object(doc)
            }
        }
    }
}

impl From<&serde_json::Value> for Value {
    fn from(v: &serde_json::Value) -> Self {
        Value::from(v.clone())
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(n) => serde_json::Value::from(n),
            Value::Double(n) => serde_json::Value::from(n),
            Value::Decimal(d) => match d.to_f64() {
                Some(f) => serde_json::Value::from(f),
                None => serde_json::Value::String(d.to_string()),
            },
            Value::String(s) => serde_json::Value::String(s),
            Value::Date(dt) => serde_json::Value::String(dt.to_rfc3339()),
            Value::Regex { pattern, options } => serde_json::json!({
                "$regex": pattern,
                "$options": options,
            }),
            Value::Binary { subtype, bytes } => {
                use base64::Engine as _;
                serde_json::json!({
                    "$binary": base64::engine::general_purpose::STANDARD.encode(bytes),
                    "$type": subtype,
                })
            }
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::from).collect())
            }
            Value::Object(doc) => {
                let mut map = serde_json::Map::new();
                for (k, v) in doc {
                    map.insert(k, serde_json::Value::from(v));
                }
                serde_json::Value::Object(map)
            }
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

/// Builds a `Value::Date` from milliseconds since the Unix epoch.
pub fn date_from_millis(ms: i64) -> Option<Value> {
    Utc.timestamp_millis_opt(ms).single().map(Value::Date)
}
