//! Boolean operators.
//!
//! `$and` and `$or` short-circuit and are handled by the evaluator; only
//! `$not` takes fully evaluated input.

use crate::error::Result;
use crate::operators::{ok, one, OpCtx};
use crate::value::Value;

pub fn not(args: &[Value], _ctx: &OpCtx<'_>) -> Result<Option<Value>> {
    ok(Value::Bool(!one(args, "$not")?.is_truthy()))
}
