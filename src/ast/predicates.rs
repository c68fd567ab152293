use regex::Regex;

use crate::ast::expressions::Expr;
use crate::value::Value;

/// A regular expression compiled at construction time, keeping the original
/// pattern and flag string for error messages and `$type` reporting.
#[derive(Debug, Clone)]
pub struct CompiledRegex {
    pub regex: Regex,
    pub pattern: String,
    pub options: String,
}

impl CompiledRegex {
    pub fn is_match(&self, s: &str) -> bool {
        self.regex.is_match(s)
    }
}

/// A compiled query predicate: the yes/no dialect used by `$match` and the
/// query entry points.
///
/// A selector document compiles into a conjunction of per-path conditions
/// plus the logical connectives; `$expr` bridges into the expression dialect
/// and `$where` into host scripting.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Every branch must match (also the result of a multi-key selector)
    And(Vec<Predicate>),

    /// At least one branch must match
    Or(Vec<Predicate>),

    /// No branch may match
    Nor(Vec<Predicate>),

    /// An expression evaluated for truthiness against the document
    Expr(Expr),

    /// Host-scripted predicate; the source text runs through the script hook
    Where(String),

    /// A condition applied to the value at a dotted path. An empty path
    /// targets the value itself (used by `$elemMatch` on scalar arrays).
    Field { path: String, cond: FieldCond },
}

/// A single condition on one resolved path.
///
/// Comparison conditions follow the implicit-array rule: when the resolved
/// value is an array, the condition matches if any element matches or if the
/// array as a whole does.
#[derive(Debug, Clone)]
pub enum FieldCond {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    /// `$type` with one or more type names or aliases
    Type(Vec<String>),
    Size(usize),
    Mod { divisor: i64, remainder: i64 },
    Regex(CompiledRegex),
    /// Every listed value must occur in the resolved array
    All(Vec<Value>),
    /// At least one array element satisfies the whole sub-predicate
    ElemMatch(Box<Predicate>),
    /// Negation of an operator block or regex
    Not(Box<FieldCond>),
    /// Conjunction of conditions from one operator document
    AllOf(Vec<FieldCond>),
}
