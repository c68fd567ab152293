//! Engine options shared by queries and aggregation pipelines.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::collation::Collation;
use crate::error::Result;
use crate::value::Value;

/// How documents enter the engine.
///
/// The iterators always own the documents flowing through them, so the three
/// modes govern the ingress boundary: `CloneInput` deep-copies every document
/// when the stream is created, `CopyInput` (the default) clones each document
/// lazily at the pull that first needs it, and `CloneOff` is the zero-copy
/// mode for callers that move a `Vec` into the run and permit in-place
/// mutation of the stream items. Documents the caller retains are never
/// mutated in any mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingMode {
    CloneInput,
    #[default]
    CopyInput,
    CloneOff,
}

/// Host-provided script evaluator backing `$where`, `$function` and
/// `$accumulator`: receives the source text and evaluated arguments.
pub type ScriptFn = Arc<dyn Fn(&str, &[Value]) -> Result<Value> + Send + Sync>;

/// A caller-registered expression operator.
pub type CustomOp = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// Sink receiving the materialized output of `$out` / `$merge`.
pub type SinkFn = Arc<dyn Fn(&str, &[Value]) -> Result<()> + Send + Sync>;

/// Options accepted by every entry point.
///
/// ```
/// use nutmeg::Options;
///
/// let opts = Options::new().with_variable("threshold", 10i64.into());
/// ```
#[derive(Clone, Default)]
pub struct Options {
    /// String ordering for `$sort`, `$group` keys and collation-aware
    /// operators. Default is case-sensitive byte order.
    pub collation: Option<Collation>,
    /// Ingress cloning behavior.
    pub processing_mode: ProcessingMode,
    /// Name of the identity field, `_id` unless overridden.
    pub id_key: String,
    /// Pre-populated `$$name` bindings.
    pub variables: HashMap<String, Value>,
    /// Whether `$where` / `$function` / `$accumulator` may run at all.
    pub script_enabled: bool,
    /// The evaluator invoked when scripting is enabled.
    pub script: Option<ScriptFn>,
    /// Named in-memory collections for `$lookup` / `$graphLookup`.
    pub collections: HashMap<String, Arc<Vec<Value>>>,
    /// Receives `$out` / `$merge` output.
    pub sink: Option<SinkFn>,
    /// Caller-supplied expression operators, names starting with `$`.
    pub custom_operators: HashMap<String, CustomOp>,
}

impl Options {
    pub fn new() -> Self {
        Options::default()
    }

    /// The identity field name (`_id` unless overridden).
    pub fn id_key(&self) -> &str {
        if self.id_key.is_empty() {
            "_id"
        } else {
            &self.id_key
        }
    }

    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = Some(collation);
        self
    }

    pub fn with_processing_mode(mut self, mode: ProcessingMode) -> Self {
        self.processing_mode = mode;
        self
    }

    pub fn with_id_key(mut self, key: impl Into<String>) -> Self {
        self.id_key = key.into();
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Registers a named collection for `$lookup` / `$graphLookup`.
    pub fn with_collection(mut self, name: impl Into<String>, docs: Vec<Value>) -> Self {
        self.collections.insert(name.into(), Arc::new(docs));
        self
    }

    /// Enables script execution with the given evaluator.
    pub fn with_script(mut self, script: ScriptFn) -> Self {
        self.script_enabled = true;
        self.script = Some(script);
        self
    }

    pub fn with_sink(mut self, sink: SinkFn) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Registers a custom expression operator. The name must start with `$`.
    pub fn with_operator(mut self, name: impl Into<String>, op: CustomOp) -> Self {
        self.custom_operators.insert(name.into(), op);
        self
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("collation", &self.collation)
            .field("processing_mode", &self.processing_mode)
            .field("id_key", &self.id_key())
            .field("variables", &self.variables.keys())
            .field("script_enabled", &self.script_enabled)
            .field("collections", &self.collections.keys())
            .field("custom_operators", &self.custom_operators.keys())
            .finish()
    }
}
