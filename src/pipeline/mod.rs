//! The aggregation pipeline runtime.
//!
//! A pipeline is compiled into a list of [`Stage`]s at construction, then
//! run as a chain of lazy iterators: each stage wraps its upstream and
//! pulls one document at a time. Streaming stages emit as they pull;
//! blocking stages (`$sort`, `$group`, the buckets, `$facet`,
//! `$setWindowFields`) drain their upstream into an owned buffer on the
//! first pull and emit from it. Errors surface at the pull that triggers
//! them and terminate the stream.

pub mod bucket;
pub mod facet;
pub mod graph_lookup;
pub mod group;
pub mod lookup;
pub mod reshape;
pub mod sort;
pub mod unwind;
pub mod window;

use tracing::debug;

use crate::ast::stages::SortSpec;
use crate::ast::{Expr, Stage};
use crate::error::{Error, Result};
use crate::options::{Options, ProcessingMode};
use crate::parser::{parse_expr, parse_predicate};
use crate::projection::Projection;
use crate::query::matches;
use crate::value::{Document, Value};

/// A lazy stream of documents; the item type carries evaluation errors to
/// the consumer at the pull that hit them.
pub type DocStream<'a> = Box<dyn Iterator<Item = Result<Value>> + 'a>;

/// A compiled aggregation pipeline.
///
/// ```
/// use nutmeg::{Aggregator, Options, Value};
///
/// let docs: Vec<Value> = vec![
///     serde_json::json!({"a": [1, 2]}).into(),
///     serde_json::json!({"a": [3]}).into(),
/// ];
/// let agg = Aggregator::new(
///     &serde_json::json!([{"$unwind": "$a"}]).into(),
///     Options::new(),
/// ).unwrap();
/// assert_eq!(agg.run(&docs).unwrap().len(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct Aggregator {
    stages: Vec<Stage>,
    options: Options,
}

impl Aggregator {
    /// Compiles a pipeline spec (an array of single-key stage documents).
    /// All stage specs are validated here, before any document is pulled.
    pub fn new(pipeline: &Value, options: Options) -> Result<Self> {
        let Value::Array(stages) = pipeline else {
            return Err(Error::InvalidSpec(format!(
                "a pipeline must be an array, found {}",
                pipeline.type_name()
            )));
        };
        let stages = compile_stages(stages, &options)?;
        debug!(stages = stages.len(), "compiled aggregation pipeline");
        Ok(Aggregator { stages, options })
    }

    /// Lazily streams results over borrowed documents. Documents are cloned
    /// at ingress: eagerly under `CloneInput`, per pull otherwise.
    pub fn stream<'a>(&'a self, docs: &'a [Value]) -> DocStream<'a> {
        let source: DocStream<'a> = match self.options.processing_mode {
            ProcessingMode::CloneInput => Box::new(docs.to_vec().into_iter().map(Ok)),
            _ => Box::new(docs.iter().map(|doc| Ok(doc.clone()))),
        };
        self.attach_all(source)
    }

    /// Drains [`stream`](Aggregator::stream) into a vector.
    pub fn run(&self, docs: &[Value]) -> Result<Vec<Value>> {
        self.stream(docs).collect()
    }

    /// Zero-copy run over owned documents (the `CloneOff` mode).
    pub fn run_owned(&self, docs: Vec<Value>) -> Result<Vec<Value>> {
        let source: DocStream<'_> = Box::new(docs.into_iter().map(Ok));
        self.attach_all(source).collect()
    }

    fn attach_all<'a>(&'a self, mut stream: DocStream<'a>) -> DocStream<'a> {
        for stage in &self.stages {
            stream = attach(stage, stream, &self.options);
        }
        stream
    }
}

/// Runs compiled stages eagerly over owned documents; used by `$facet`,
/// `$lookup` sub-pipelines and the convenience entry points.
pub(crate) fn run_stages(
    stages: &[Stage],
    docs: Vec<Value>,
    options: &Options,
) -> Result<Vec<Value>> {
    let mut stream: DocStream<'_> = Box::new(docs.into_iter().map(Ok));
    for stage in stages {
        stream = attach(stage, stream, options);
    }
    stream.collect()
}

pub(crate) fn compile_stages(stages: &[Value], options: &Options) -> Result<Vec<Stage>> {
    stages
        .iter()
        .map(|stage| {
            let Value::Object(doc) = stage else {
                return Err(Error::InvalidSpec(format!(
                    "a stage must be a document, found {}",
                    stage.type_name()
                )));
            };
            if doc.len() != 1 {
                return Err(Error::InvalidSpec(format!(
                    "a stage must have exactly one operator, found {}",
                    doc.len()
                )));
            }
            let (name, spec) = doc.iter().next().expect("len checked above");
            compile_stage(name, spec, options)
        })
        .collect()
}

fn compile_stage(name: &str, spec: &Value, options: &Options) -> Result<Stage> {
    let stage = match name {
        "$match" => Stage::Match(parse_predicate(spec, options)?),
        "$project" => Stage::Project(Projection::parse(spec, options)?),
        "$addFields" | "$set" => Stage::AddFields(reshape::parse_add_fields(spec, options)?),
        "$unset" => Stage::Unset(reshape::parse_unset(spec)?),
        "$replaceRoot" | "$replaceWith" => {
            Stage::ReplaceRoot(reshape::parse_replace_root(spec, options)?)
        }
        "$limit" => Stage::Limit(non_negative(spec, "$limit")?),
        "$skip" => Stage::Skip(non_negative(spec, "$skip")?),
        "$count" => match spec {
            Value::String(field) if !field.is_empty() && !field.starts_with('$') => {
                Stage::Count(field.clone())
            }
            _ => {
                return Err(Error::InvalidSpec(
                    "$count expects a non-empty field name".to_string(),
                ));
            }
        },
        "$sort" => Stage::Sort(sort::parse_sort(spec)?),
        "$sortByCount" => Stage::SortByCount(parse_expr(spec, options)?),
        "$group" => Stage::Group(group::parse_group(spec, options)?),
        "$bucket" => Stage::Bucket(bucket::parse_bucket(spec, options)?),
        "$bucketAuto" => Stage::BucketAuto(bucket::parse_bucket_auto(spec, options)?),
        "$unwind" => Stage::Unwind(unwind::parse_unwind(spec)?),
        "$lookup" => Stage::Lookup(lookup::parse_lookup(spec, options)?),
        "$graphLookup" => Stage::GraphLookup(graph_lookup::parse_graph_lookup(spec, options)?),
        "$facet" => Stage::Facet(facet::parse_facet(spec, options)?),
        "$setWindowFields" => Stage::SetWindowFields(window::parse_window_fields(spec, options)?),
        "$out" | "$merge" => {
            let target = match spec {
                Value::String(name) => name.clone(),
                Value::Object(doc) => doc
                    .get("into")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        Error::InvalidSpec(format!("{name} expects a collection name"))
                    })?,
                _ => {
                    return Err(Error::InvalidSpec(format!(
                        "{name} expects a collection name"
                    )));
                }
            };
            if options.sink.is_none() {
                return Err(Error::InvalidSpec(format!(
                    "{name} requires a materialization sink on Options"
                )));
            }
            if name == "$out" {
                Stage::Out(target)
            } else {
                Stage::Merge(target)
            }
        }
        other => return Err(Error::UnknownOperator(other.to_string())),
    };
    Ok(stage)
}

fn non_negative(spec: &Value, op: &str) -> Result<usize> {
    spec.as_i64()
        .filter(|n| *n >= 0)
        .map(|n| n as usize)
        .ok_or_else(|| Error::InvalidSpec(format!("{op} expects a non-negative integer")))
}

/// Wraps an upstream with a blocking computation, deferred to the first
/// pull. The buffer is dropped with the iterator.
fn blocking<'a>(
    input: DocStream<'a>,
    f: impl FnOnce(Vec<Value>) -> Result<Vec<Value>> + 'a,
) -> DocStream<'a> {
    Box::new(Blocking {
        pending: Some((input, Box::new(f))),
        output: Vec::new().into_iter(),
        failed: false,
    })
}

type BlockFn<'a> = Box<dyn FnOnce(Vec<Value>) -> Result<Vec<Value>> + 'a>;

struct Blocking<'a> {
    pending: Option<(DocStream<'a>, BlockFn<'a>)>,
    output: std::vec::IntoIter<Value>,
    failed: bool,
}

impl Iterator for Blocking<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if let Some((input, f)) = self.pending.take() {
            let drained: Result<Vec<Value>> = input.collect();
            match drained.and_then(f) {
                Ok(out) => self.output = out.into_iter(),
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
        self.output.next().map(Ok)
    }
}

/// Streaming document-to-document transform, passing errors through.
fn map_docs<'a>(
    input: DocStream<'a>,
    f: impl Fn(&Value) -> Result<Value> + 'a,
) -> DocStream<'a> {
    Box::new(input.map(move |item| item.and_then(|doc| f(&doc))))
}

fn attach<'a>(stage: &'a Stage, input: DocStream<'a>, options: &'a Options) -> DocStream<'a> {
    match stage {
        Stage::Match(predicate) => Box::new(input.filter_map(move |item| match item {
            Err(e) => Some(Err(e)),
            Ok(doc) => match matches(&doc, predicate, options) {
                Err(e) => Some(Err(e)),
                Ok(true) => Some(Ok(doc)),
                Ok(false) => None,
            },
        })),
        Stage::Project(projection) => {
            map_docs(input, move |doc| projection.apply(doc, None, options))
        }
        Stage::AddFields(fields) => {
            map_docs(input, move |doc| reshape::add_fields(doc, fields, options))
        }
        Stage::Unset(paths) => map_docs(input, move |doc| Ok(reshape::unset(doc, paths))),
        Stage::ReplaceRoot(expr) => {
            map_docs(input, move |doc| reshape::replace_root(doc, expr, options))
        }
        Stage::Limit(n) => Box::new(input.take(*n)),
        Stage::Skip(n) => {
            let mut seen = 0usize;
            Box::new(input.filter_map(move |item| match item {
                Err(e) => Some(Err(e)),
                Ok(doc) => {
                    if seen < *n {
                        seen += 1;
                        None
                    } else {
                        Some(Ok(doc))
                    }
                }
            }))
        }
        Stage::Count(field) => {
            let field = field.clone();
            blocking(input, move |docs| {
                let mut out = Document::new();
                out.insert(field, Value::Int(docs.len() as i64));
                Ok(vec![Value::Object(out)])
            })
        }
        Stage::Sort(spec) => blocking(input, move |docs| sort::execute(spec, docs, options)),
        Stage::SortByCount(expr) => blocking(input, move |docs| {
            sort_by_count(expr, docs, options)
        }),
        Stage::Group(spec) => blocking(input, move |docs| group::execute(spec, docs, options)),
        Stage::Bucket(spec) => {
            blocking(input, move |docs| bucket::execute_bucket(spec, docs, options))
        }
        Stage::BucketAuto(spec) => blocking(input, move |docs| {
            bucket::execute_bucket_auto(spec, docs, options)
        }),
        Stage::Unwind(spec) => Box::new(input.flat_map(move |item| {
            let expanded = match item {
                Err(e) => vec![Err(e)],
                Ok(doc) => match unwind::expand(spec, &doc, options) {
                    Ok(outputs) => outputs.into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(e)],
                },
            };
            expanded.into_iter()
        })),
        Stage::Lookup(spec) => map_docs(input, move |doc| lookup::attach(spec, doc, options)),
        Stage::GraphLookup(spec) => {
            map_docs(input, move |doc| graph_lookup::traverse(spec, doc, options))
        }
        Stage::Facet(facets) => {
            blocking(input, move |docs| facet::execute(facets, docs, options))
        }
        Stage::SetWindowFields(spec) => {
            blocking(input, move |docs| window::execute(spec, docs, options))
        }
        Stage::Out(target) | Stage::Merge(target) => blocking(input, move |docs| {
            let sink = options
                .sink
                .as_ref()
                .ok_or_else(|| Error::InvalidSpec("no materialization sink configured".to_string()))?;
            sink(target, &docs)?;
            Ok(docs)
        }),
    }
}

/// `$sortByCount`: group by the expression, count, sort descending.
fn sort_by_count(expr: &Expr, docs: Vec<Value>, options: &Options) -> Result<Vec<Value>> {
    use crate::ast::stages::{AccExpr, Accumulator, GroupSpec};

    let spec = GroupSpec {
        id: expr.clone(),
        fields: vec![(
            "count".to_string(),
            AccExpr::Simple(Accumulator::Sum, Expr::Literal(Value::Int(1))),
        )],
    };
    let grouped = group::execute(&spec, docs, options)?;
    let sort_spec = SortSpec {
        keys: vec![("count".to_string(), -1)],
    };
    sort::execute(&sort_spec, grouped, options)
}
