//! `$group` and the accumulator table.
//!
//! Groups are keyed by the canonical serialization of the `_id` value
//! (collation-folded for string keys) and emitted in first-occurrence
//! order; no emission order is promised to callers. Accumulator state is
//! updated document by document and finalized once the upstream is
//! exhausted.

use indexmap::IndexMap;
use rust_decimal::{prelude::FromPrimitive, Decimal};

use crate::ast::stages::{AccExpr, Accumulator, GroupSpec};
use crate::ast::Expr;
use crate::canonical::canonical_key;
use crate::collation::Collator;
use crate::error::{Error, Result};
use crate::evaluator::{compute, ExprContext};
use crate::options::Options;
use crate::value::{compare, Document, Value};

/// Widening numeric sum: integer until a double or decimal shows up.
#[derive(Debug, Clone, Default)]
pub(crate) struct NumSum {
    int: i64,
    double: f64,
    decimal: Decimal,
    saw_double: bool,
    saw_decimal: bool,
    overflowed: bool,
}

impl NumSum {
    fn add(&mut self, v: &Value) {
        match v {
            Value::Int(n) => {
                match self.int.checked_add(*n) {
                    Some(sum) => self.int = sum,
                    None => {
                        self.overflowed = true;
                        self.double += self.int as f64 + *n as f64;
                        self.int = 0;
                    }
                }
                if let Some(d) = Decimal::from_i64(*n) {
                    self.decimal += d;
                }
            }
            Value::Double(n) => {
                self.saw_double = true;
                self.double += n;
                if let Some(d) = Decimal::from_f64(*n) {
                    self.decimal += d;
                }
            }
            Value::Decimal(d) => {
                self.saw_decimal = true;
                self.decimal += d;
            }
            _ => {}
        }
    }

    fn finish(&self) -> Value {
        if self.saw_decimal {
            Value::Decimal(self.decimal)
        } else if self.saw_double || self.overflowed {
            Value::Double(self.double + self.int as f64)
        } else {
            Value::Int(self.int)
        }
    }
}

/// Per-group running state for one accumulator.
#[derive(Debug, Clone)]
pub(crate) enum AccState {
    Sum(NumSum),
    Avg { sum: f64, count: u64 },
    Min(Option<Value>),
    Max(Option<Value>),
    /// Captures the first seen value, which may itself be missing
    First(Option<Option<Value>>),
    Last(Option<Option<Value>>),
    Push(Vec<Value>),
    AddToSet(IndexMap<String, Value>),
    /// Welford's online variance
    StdDev { count: u64, mean: f64, m2: f64, sample: bool },
    Merge(Document),
    Count(u64),
}

impl AccState {
    pub fn new(acc: Accumulator) -> AccState {
        match acc {
            Accumulator::Sum => AccState::Sum(NumSum::default()),
            Accumulator::Avg => AccState::Avg { sum: 0.0, count: 0 },
            Accumulator::Min => AccState::Min(None),
            Accumulator::Max => AccState::Max(None),
            Accumulator::First => AccState::First(None),
            Accumulator::Last => AccState::Last(None),
            Accumulator::Push => AccState::Push(Vec::new()),
            Accumulator::AddToSet => AccState::AddToSet(IndexMap::new()),
            Accumulator::StdDevPop => AccState::StdDev { count: 0, mean: 0.0, m2: 0.0, sample: false },
            Accumulator::StdDevSamp => AccState::StdDev { count: 0, mean: 0.0, m2: 0.0, sample: true },
            Accumulator::MergeObjects => AccState::Merge(Document::new()),
            Accumulator::Count => AccState::Count(0),
        }
    }

    pub fn update(&mut self, value: Option<Value>) -> Result<()> {
        match self {
            AccState::Sum(sum) => {
                if let Some(v) = &value {
                    sum.add(v);
                }
            }
            AccState::Avg { sum, count } => {
                if let Some(n) = value.as_ref().and_then(Value::as_f64) {
                    *sum += n;
                    *count += 1;
                }
            }
            AccState::Min(best) => {
                if let Some(v) = value.filter(|v| !matches!(v, Value::Null)) {
                    let better = best
                        .as_ref()
                        .map_or(true, |b| compare(&v, b) == std::cmp::Ordering::Less);
                    if better {
                        *best = Some(v);
                    }
                }
            }
            AccState::Max(best) => {
                if let Some(v) = value.filter(|v| !matches!(v, Value::Null)) {
                    let better = best
                        .as_ref()
                        .map_or(true, |b| compare(&v, b) == std::cmp::Ordering::Greater);
                    if better {
                        *best = Some(v);
                    }
                }
            }
            AccState::First(slot) => {
                if slot.is_none() {
                    *slot = Some(value);
                }
            }
            AccState::Last(slot) => {
                *slot = Some(value);
            }
            AccState::Push(items) => {
                items.push(value.unwrap_or(Value::Null));
            }
            AccState::AddToSet(set) => {
                if let Some(v) = value {
                    set.entry(canonical_key(&v, None)).or_insert(v);
                }
            }
            AccState::StdDev { count, mean, m2, .. } => {
                if let Some(n) = value.as_ref().and_then(Value::as_f64) {
                    *count += 1;
                    let delta = n - *mean;
                    *mean += delta / *count as f64;
                    *m2 += delta * (n - *mean);
                }
            }
            AccState::Merge(merged) => match value {
                Some(Value::Object(doc)) => {
                    for (k, v) in doc {
                        merged.insert(k, v);
                    }
                }
                Some(Value::Null) | None => {}
                Some(other) => {
                    return Err(Error::Type(format!(
                        "$mergeObjects expects documents, found {}",
                        other.type_name()
                    )));
                }
            },
            AccState::Count(n) => *n += 1,
        }
        Ok(())
    }

    /// Final value; `None` omits the output field.
    pub fn finish(self) -> Option<Value> {
        match self {
            AccState::Sum(sum) => Some(sum.finish()),
            AccState::Avg { count: 0, .. } => Some(Value::Null),
            AccState::Avg { sum, count } => Some(Value::Double(sum / count as f64)),
            AccState::Min(best) | AccState::Max(best) => Some(best.unwrap_or(Value::Null)),
            AccState::First(slot) | AccState::Last(slot) => slot.unwrap_or(Some(Value::Null)),
            AccState::Push(items) => Some(Value::Array(items)),
            AccState::AddToSet(set) => Some(Value::Array(set.into_values().collect())),
            AccState::StdDev { count, m2, sample, .. } => Some(match (count, sample) {
                (0, _) | (1, true) => Value::Null,
                (n, false) => Value::Double((m2 / n as f64).sqrt()),
                (n, true) => Value::Double((m2 / (n - 1) as f64).sqrt()),
            }),
            AccState::Merge(doc) => Some(Value::Object(doc)),
            AccState::Count(n) => Some(Value::Int(n as i64)),
        }
    }
}

pub fn accumulator_by_name(name: &str) -> Option<Accumulator> {
    let acc = match name {
        "$sum" => Accumulator::Sum,
        "$avg" => Accumulator::Avg,
        "$min" => Accumulator::Min,
        "$max" => Accumulator::Max,
        "$first" => Accumulator::First,
        "$last" => Accumulator::Last,
        "$push" => Accumulator::Push,
        "$addToSet" => Accumulator::AddToSet,
        "$stdDevPop" => Accumulator::StdDevPop,
        "$stdDevSamp" => Accumulator::StdDevSamp,
        "$mergeObjects" => Accumulator::MergeObjects,
        "$count" => Accumulator::Count,
        _ => return None,
    };
    Some(acc)
}

/// Parses `{name: {$acc: expr}, ...}` output fields, as used by `$group`,
/// `$bucket` and `$bucketAuto`.
pub fn parse_simple_outputs(
    doc: &Document,
    options: &Options,
) -> Result<Vec<(String, Accumulator, Expr)>> {
    let mut out = Vec::with_capacity(doc.len());
    for (name, spec) in doc {
        let (acc, expr) = parse_simple_acc(name, spec, options)?;
        out.push((name.clone(), acc, expr));
    }
    Ok(out)
}

fn parse_simple_acc(name: &str, spec: &Value, options: &Options) -> Result<(Accumulator, Expr)> {
    let Value::Object(body) = spec else {
        return Err(Error::InvalidSpec(format!(
            "accumulator for '{name}' must be a document"
        )));
    };
    if body.len() != 1 {
        return Err(Error::InvalidSpec(format!(
            "accumulator for '{name}' must have exactly one operator"
        )));
    }
    let (op, arg) = body.iter().next().expect("len checked above");
    let acc = accumulator_by_name(op)
        .ok_or_else(|| Error::UnknownOperator(op.clone()))?;
    if acc == Accumulator::Count {
        if !matches!(arg, Value::Object(d) if d.is_empty()) {
            return Err(Error::InvalidSpec("$count takes an empty document".to_string()));
        }
        return Ok((acc, Expr::null()));
    }
    Ok((acc, crate::parser::parse_expr(arg, options)?))
}

pub fn parse_group(spec: &Value, options: &Options) -> Result<GroupSpec> {
    let Value::Object(doc) = spec else {
        return Err(Error::InvalidSpec("$group expects a document".to_string()));
    };
    let id_spec = doc
        .get("_id")
        .ok_or_else(|| Error::InvalidSpec("$group requires '_id'".to_string()))?;
    let id = crate::parser::parse_expr(id_spec, options)?;
    let mut fields = Vec::new();
    for (name, field_spec) in doc {
        if name == "_id" {
            continue;
        }
        if let Value::Object(body) = field_spec {
            if body.len() == 1 {
                if let Some(acc_spec) = body.get("$accumulator") {
                    fields.push((name.clone(), parse_scripted(acc_spec, options)?));
                    continue;
                }
            }
        }
        let (acc, expr) = parse_simple_acc(name, field_spec, options)?;
        fields.push((name.clone(), AccExpr::Simple(acc, expr)));
    }
    Ok(GroupSpec { id, fields })
}

fn parse_scripted(spec: &Value, options: &Options) -> Result<AccExpr> {
    if !options.script_enabled {
        return Err(Error::ScriptDisabled("$accumulator"));
    }
    let Value::Object(doc) = spec else {
        return Err(Error::InvalidSpec("$accumulator expects a document".to_string()));
    };
    let source = |name: &str| -> Result<String> {
        doc.get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidSpec(format!("$accumulator requires a string '{name}'")))
    };
    let args = match doc.get("accumulateArgs") {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| crate::parser::parse_expr(item, options))
            .collect::<Result<_>>()?,
        Some(_) => {
            return Err(Error::InvalidSpec(
                "$accumulator accumulateArgs must be an array".to_string(),
            ));
        }
    };
    Ok(AccExpr::Scripted {
        init: source("init")?,
        accumulate: source("accumulate")?,
        finalize: source("finalize")?,
        args,
    })
}

/// Running state for one output field, simple or scripted.
enum FieldState {
    Simple(AccState),
    Scripted(Value),
}

pub fn execute(spec: &GroupSpec, docs: Vec<Value>, options: &Options) -> Result<Vec<Value>> {
    let collator = options.collation.as_ref().map(|c| c.collator());
    let collator_ref = collator.as_ref().map(|c| c as &dyn Collator);
    let script = options.script.clone();
    let run_script = |src: &str, args: &[Value]| -> Result<Value> {
        match &script {
            Some(f) => f(src, args),
            None => Err(Error::InvalidSpec("no script evaluator configured".to_string())),
        }
    };

    let mut groups: IndexMap<String, (Value, Vec<FieldState>)> = IndexMap::new();
    for doc in &docs {
        let ctx = ExprContext::new(doc, options);
        let id = compute(&spec.id, &ctx)?.unwrap_or(Value::Null);
        let key = canonical_key(&id, collator_ref);
        let entry = match groups.entry(key) {
            indexmap::map::Entry::Occupied(e) => e.into_mut(),
            indexmap::map::Entry::Vacant(e) => {
                let mut states = Vec::with_capacity(spec.fields.len());
                for (_, field) in &spec.fields {
                    states.push(match field {
                        AccExpr::Simple(acc, _) => FieldState::Simple(AccState::new(*acc)),
                        AccExpr::Scripted { init, .. } => {
                            FieldState::Scripted(run_script(init, &[])?)
                        }
                    });
                }
                e.insert((id, states))
            }
        };
        for ((_, field), state) in spec.fields.iter().zip(entry.1.iter_mut()) {
            match (field, state) {
                (AccExpr::Simple(_, expr), FieldState::Simple(acc)) => {
                    acc.update(compute(expr, &ctx)?)?;
                }
                (AccExpr::Scripted { accumulate, args, .. }, FieldState::Scripted(acc)) => {
                    let mut call = Vec::with_capacity(args.len() + 1);
                    call.push(acc.clone());
                    for arg in args {
                        call.push(compute(arg, &ctx)?.unwrap_or(Value::Null));
                    }
                    *acc = run_script(accumulate, &call)?;
                }
                _ => unreachable!("state shape fixed at group creation"),
            }
        }
    }

    let mut out = Vec::with_capacity(groups.len());
    for (_, (id, states)) in groups {
        let mut doc = Document::new();
        doc.insert("_id".to_string(), id);
        for ((name, field), state) in spec.fields.iter().zip(states) {
            match (field, state) {
                (_, FieldState::Simple(acc)) => {
                    if let Some(v) = acc.finish() {
                        doc.insert(name.clone(), v);
                    }
                }
                (AccExpr::Scripted { finalize, .. }, FieldState::Scripted(acc)) => {
                    doc.insert(name.clone(), run_script(finalize, &[acc])?);
                }
                _ => unreachable!("state shape fixed at group creation"),
            }
        }
        out.push(Value::Object(doc));
    }
    Ok(out)
}
