//! # nutmeg
//!
//! An in-memory query and aggregation engine for JSON-like documents,
//! speaking the familiar `$`-operator dialect: query filters (`$eq`, `$in`,
//! `$elemMatch`, …), computed expressions (`$add`, `$let`, `$map`, `$cond`,
//! …) and aggregation pipelines (`$match`, `$group`, `$sort`, `$unwind`,
//! `$lookup`, `$facet`, …).
//!
//! Documents live in the caller's memory; the engine borrows or clones them
//! per the configured processing mode and evaluates lazily, one document
//! per pull. There is no storage, no indexes, no network.
//!
//! ```
//! use nutmeg::{aggregate, Options, Value};
//!
//! let docs: Vec<Value> = vec![
//!     serde_json::json!({"k": 1, "v": 10}).into(),
//!     serde_json::json!({"k": 1, "v": 20}).into(),
//!     serde_json::json!({"k": 2, "v": 30}).into(),
//! ];
//! let out = aggregate(
//!     &docs,
//!     &serde_json::json!([{"$group": {"_id": "$k", "s": {"$sum": "$v"}}}]).into(),
//!     Options::new(),
//! ).unwrap();
//! assert_eq!(out.len(), 2);
//! ```

pub mod ast;
pub mod canonical;
pub mod collation;
pub mod error;
pub mod evaluator;
pub mod operators;
pub mod options;
pub mod parser;
pub mod path;
pub mod pipeline;
pub mod projection;
pub mod query;
pub mod value;

pub use collation::{Collation, Collator};
pub use error::{Error, Result};
pub use evaluator::{compute, ExprContext};
pub use options::{Options, ProcessingMode};
pub use pipeline::Aggregator;
pub use projection::Projection;
pub use query::{compute_expr, Query};
pub use value::{Document, Value};

/// Runs a pipeline over the documents and collects the results.
pub fn aggregate(docs: &[Value], pipeline: &Value, options: Options) -> Result<Vec<Value>> {
    Aggregator::new(pipeline, options)?.run(docs)
}

/// Filters documents with a query, applying an optional projection.
pub fn find(
    docs: &[Value],
    filter: &Value,
    projection: Option<&Value>,
    options: Options,
) -> Result<Vec<Value>> {
    query::find(docs, filter, projection, options)
}
