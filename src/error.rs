use thiserror::Error;

/// Errors raised while compiling a spec or evaluating it against documents.
///
/// Spec-shaped problems (unknown operators, bad arity, disallowed projection
/// mixing) are detected eagerly at construction wherever that is cheap; the
/// remaining kinds surface at the pull that triggers them and terminate the
/// stream.
#[derive(Debug, Error)]
pub enum Error {
    /// An operator name that no registry (built-in or custom) knows.
    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    /// A structurally invalid spec: wrong arity, mixed include/exclude
    /// projection, non-positive bucket count, and similar.
    #[error("invalid spec: {0}")]
    InvalidSpec(String),

    /// An operator applied to a value it cannot work with, for the documented
    /// subset of operators that raise instead of returning null.
    #[error("type error: {0}")]
    Type(String),

    /// `$divide` or `$mod` with a zero divisor.
    #[error("division by zero")]
    DivisionByZero,

    /// `$where`, `$function` or `$accumulator` used without script support
    /// enabled on the options.
    #[error("{0} requires script execution; enable it on Options")]
    ScriptDisabled(&'static str),

    /// A pattern that failed to compile.
    #[error("invalid regular expression: {0}")]
    Regex(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
