use std::sync::Arc;

use crate::ast::expressions::Expr;
use crate::ast::predicates::Predicate;
use crate::projection::Projection;
use crate::value::Value;

/// One compiled aggregation stage.
///
/// Stage specs are validated and parsed when the pipeline is constructed, so
/// malformed specs fail before any document is pulled. Collection references
/// (`$lookup`/`$graphLookup` `from`, `$out`/`$merge` targets) are resolved
/// against the options at the same time.
#[derive(Debug, Clone)]
pub enum Stage {
    Match(Predicate),
    Project(Projection),
    /// `$addFields` / `$set`
    AddFields(Vec<(String, Expr)>),
    Unset(Vec<String>),
    /// `$replaceRoot` / `$replaceWith`
    ReplaceRoot(Expr),
    Limit(usize),
    Skip(usize),
    /// `$count` with the output field name
    Count(String),
    Sort(SortSpec),
    SortByCount(Expr),
    Group(GroupSpec),
    Bucket(BucketSpec),
    BucketAuto(BucketAutoSpec),
    Unwind(UnwindSpec),
    Lookup(LookupSpec),
    GraphLookup(GraphLookupSpec),
    Facet(Vec<(String, Vec<Stage>)>),
    SetWindowFields(WindowSpec),
    /// Terminal materialization into the options sink
    Out(String),
    Merge(String),
}

/// Compound sort key: per-field direction, 1 ascending, -1 descending.
#[derive(Debug, Clone)]
pub struct SortSpec {
    pub keys: Vec<(String, i32)>,
}

/// The accumulators usable in `$group`, bucket outputs and window fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accumulator {
    Sum,
    Avg,
    Min,
    Max,
    First,
    Last,
    Push,
    AddToSet,
    StdDevPop,
    StdDevSamp,
    MergeObjects,
    Count,
}

/// One output field of `$group`: a built-in accumulator over an expression,
/// or a host-scripted accumulator.
#[derive(Debug, Clone)]
pub enum AccExpr {
    Simple(Accumulator, Expr),
    Scripted {
        init: String,
        accumulate: String,
        finalize: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone)]
pub struct GroupSpec {
    pub id: Expr,
    pub fields: Vec<(String, AccExpr)>,
}

#[derive(Debug, Clone)]
pub struct BucketSpec {
    pub group_by: Expr,
    /// Ascending, at least two entries
    pub boundaries: Vec<Value>,
    /// Bucket id for documents outside the boundaries
    pub default: Option<Value>,
    pub output: Vec<(String, Accumulator, Expr)>,
}

#[derive(Debug, Clone)]
pub struct BucketAutoSpec {
    pub group_by: Expr,
    pub buckets: usize,
    pub output: Vec<(String, Accumulator, Expr)>,
}

#[derive(Debug, Clone)]
pub struct UnwindSpec {
    /// Path without the leading `$`
    pub path: String,
    pub include_array_index: Option<String>,
    pub preserve_null_and_empty: bool,
}

#[derive(Debug, Clone)]
pub struct LookupSpec {
    /// Foreign collection, resolved at construction
    pub from: Arc<Vec<Value>>,
    /// Simple equality form
    pub local_field: Option<String>,
    pub foreign_field: Option<String>,
    /// Generalized form: variables visible to the sub-pipeline
    pub let_vars: Vec<(String, Expr)>,
    pub pipeline: Option<Vec<Stage>>,
    pub as_field: String,
}

#[derive(Debug, Clone)]
pub struct GraphLookupSpec {
    pub from: Arc<Vec<Value>>,
    pub start_with: Expr,
    pub connect_from_field: String,
    pub connect_to_field: String,
    pub as_field: String,
    pub max_depth: Option<u32>,
    pub depth_field: Option<String>,
    pub restrict: Option<Predicate>,
}

/// Window frame bound, in document positions relative to the current row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Unbounded,
    Current,
    Offset(i64),
}

#[derive(Debug, Clone)]
pub enum WindowFunc {
    Acc(Accumulator, Expr),
    Rank,
    DenseRank,
    DocumentNumber,
    Shift {
        expr: Expr,
        by: i64,
        default: Value,
    },
}

#[derive(Debug, Clone)]
pub struct WindowField {
    pub field: String,
    pub func: WindowFunc,
    /// Document-position frame; `None` spans the whole partition
    pub frame: Option<(Bound, Bound)>,
}

#[derive(Debug, Clone)]
pub struct WindowSpec {
    pub partition_by: Option<Expr>,
    pub sort_by: Vec<(String, i32)>,
    pub output: Vec<WindowField>,
}
