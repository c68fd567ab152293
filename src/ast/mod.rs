//! # Compiled representation of queries and pipelines
//!
//! Specs arrive as plain [`Value`](crate::Value) documents and are compiled
//! once, at construction time, into the tagged sums defined here; evaluation
//! then walks these trees against the document stream without ever touching
//! the raw spec again.
//!
//! - **[expressions]**: the expression dialect (`$add`, `$let`, `$map`,
//!   field paths, variables)
//! - **[predicates]**: the query dialect (`$eq`, `$in`, `$elemMatch`,
//!   logical connectives)
//! - **[stages]**: aggregation stage descriptors with their parsed specs
//!
//! The two dialects overlap (`$expr` embeds an expression inside a
//! predicate) but stay distinct types: a predicate answers yes/no about a
//! document, an expression computes an arbitrary value from one.

pub mod expressions;
pub mod predicates;
pub mod stages;

pub use expressions::Expr;
pub use predicates::{CompiledRegex, FieldCond, Predicate};
pub use stages::Stage;
