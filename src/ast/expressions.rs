use crate::value::Value;

/// A compiled expression, evaluated against one document at a time.
///
/// Built once from a spec document by the parser; the `$`-prefix rules of
/// the spec language decide the variant:
///
/// - a string starting with `$$` is a [variable reference](Expr::VarRef),
/// - a string starting with `$` is a [field reference](Expr::FieldRef),
/// - a document whose sole key starts with `$` is an operator
///   [call](Expr::Call),
/// - any other document or array is rebuilt element by element,
/// - everything else is a literal.
#[derive(Debug, Clone)]
pub enum Expr {
    /// A constant value, emitted as-is
    Literal(Value),

    /// Dotted path into the current document
    ///
    /// # Example
    /// ```text
    /// "$items.price"   →  FieldRef("items.price")
    /// ```
    FieldRef(String),

    /// Variable reference, with an optional path into the bound value
    ///
    /// # Examples
    /// ```text
    /// "$$ROOT"         →  VarRef { name: "ROOT", path: None }
    /// "$$item.price"   →  VarRef { name: "item", path: Some("price") }
    /// ```
    VarRef {
        name: String,
        path: Option<String>,
    },

    /// Operator call. The argument is kept as the raw sub-expression the
    /// spec supplied (an array for positional form, a document for keyword
    /// form, anything for single-argument form); the operator decides how
    /// to take it apart, which is what lets `$cond`, `$let` or `$map`
    /// control evaluation of their own branches.
    Call {
        op: String,
        arg: Box<Expr>,
    },

    /// Array rebuilt elementwise; elements evaluating to missing become null
    Array(Vec<Expr>),

    /// Document rebuilt per key in insertion order; keys whose value
    /// evaluates to missing are omitted
    Object(Vec<(String, Expr)>),
}

impl Expr {
    /// Literal null, used as the default for optional spec slots.
    pub fn null() -> Expr {
        Expr::Literal(Value::Null)
    }

    /// The entry of a keyword-form argument, if present.
    pub fn named_arg(&self, name: &str) -> Option<&Expr> {
        match self {
            Expr::Object(entries) => entries.iter().find(|(k, _)| k == name).map(|(_, e)| e),
            _ => None,
        }
    }
}
