//! The value-operator catalog.
//!
//! Every operator here takes its arguments already evaluated, left to
//! right, and returns a value (or the missing sentinel). Operators that
//! must control their own argument evaluation (`$cond`, `$let` and the
//! other special forms) live in the evaluator instead.
//!
//! The registry is the single [`lookup`] table from operator name to
//! implementation; caller-registered operators are consulted before it by
//! the evaluator's dispatch.

pub mod arithmetic;
pub mod array;
pub mod boolean;
pub mod comparison;
pub mod date;
pub mod object;
pub mod set;
pub mod string;
pub mod trig;
pub mod type_ops;

use crate::error::{Error, Result};
use crate::options::Options;
use crate::value::Value;

/// Context visible to value operators: the engine options (collation) and
/// the document under evaluation (`$getField` with a bare field name).
pub struct OpCtx<'a> {
    pub options: &'a Options,
    pub current: &'a Value,
}

pub type ValueOp = for<'a> fn(&[Value], &OpCtx<'a>) -> Result<Option<Value>>;

/// Resolves a built-in operator name.
pub fn lookup(name: &str) -> Option<ValueOp> {
    let op: ValueOp = match name {
        // arithmetic
        "$add" => arithmetic::add,
        "$subtract" => arithmetic::subtract,
        "$multiply" => arithmetic::multiply,
        "$divide" => arithmetic::divide,
        "$mod" => arithmetic::modulo,
        "$abs" => arithmetic::abs,
        "$ceil" => arithmetic::ceil,
        "$floor" => arithmetic::floor,
        "$trunc" => arithmetic::trunc,
        "$round" => arithmetic::round,
        "$sqrt" => arithmetic::sqrt,
        "$pow" => arithmetic::pow,
        "$exp" => arithmetic::exp,
        "$ln" => arithmetic::ln,
        "$log" => arithmetic::log,
        "$log10" => arithmetic::log10,
        "$sum" => arithmetic::sum,
        "$avg" => arithmetic::avg,
        "$min" => arithmetic::min,
        "$max" => arithmetic::max,

        // trigonometry
        "$sin" => trig::sin,
        "$cos" => trig::cos,
        "$tan" => trig::tan,
        "$asin" => trig::asin,
        "$acos" => trig::acos,
        "$atan" => trig::atan,
        "$atan2" => trig::atan2,
        "$sinh" => trig::sinh,
        "$cosh" => trig::cosh,
        "$tanh" => trig::tanh,
        "$degreesToRadians" => trig::degrees_to_radians,
        "$radiansToDegrees" => trig::radians_to_degrees,

        // comparison
        "$cmp" => comparison::cmp,
        "$eq" => comparison::eq,
        "$ne" => comparison::ne,
        "$gt" => comparison::gt,
        "$gte" => comparison::gte,
        "$lt" => comparison::lt,
        "$lte" => comparison::lte,

        // boolean
        "$not" => boolean::not,

        // strings
        "$concat" => string::concat,
        "$toUpper" => string::to_upper,
        "$toLower" => string::to_lower,
        "$strLenBytes" => string::str_len_bytes,
        "$strLenCP" => string::str_len_cp,
        "$substr" | "$substrBytes" => string::substr_bytes,
        "$substrCP" => string::substr_cp,
        "$split" => string::split,
        "$trim" => string::trim,
        "$ltrim" => string::ltrim,
        "$rtrim" => string::rtrim,
        "$indexOfBytes" => string::index_of_bytes,
        "$indexOfCP" => string::index_of_cp,
        "$strcasecmp" => string::strcasecmp,
        "$replaceOne" => string::replace_one,
        "$replaceAll" => string::replace_all,
        "$regexMatch" => string::regex_match,
        "$regexFind" => string::regex_find,
        "$regexFindAll" => string::regex_find_all,

        // arrays
        "$arrayElemAt" => array::array_elem_at,
        "$first" => array::first,
        "$last" => array::last,
        "$concatArrays" => array::concat_arrays,
        "$slice" => array::slice,
        "$size" => array::size,
        "$reverseArray" => array::reverse_array,
        "$isArray" => array::is_array,
        "$indexOfArray" => array::index_of_array,
        "$range" => array::range,
        "$zip" => array::zip,
        "$in" => array::contains,
        "$arrayToObject" => array::array_to_object,
        "$objectToArray" => array::object_to_array,
        "$sortArray" => array::sort_array,

        // sets
        "$setEquals" => set::set_equals,
        "$setIntersection" => set::set_intersection,
        "$setUnion" => set::set_union,
        "$setDifference" => set::set_difference,
        "$setIsSubset" => set::set_is_subset,
        "$anyElementTrue" => set::any_element_true,
        "$allElementsTrue" => set::all_elements_true,

        // objects
        "$mergeObjects" => object::merge_objects,
        "$getField" => object::get_field,
        "$setField" => object::set_field,
        "$unsetField" => object::unset_field,

        // types and conversions
        "$type" => type_ops::type_of,
        "$isNumber" => type_ops::is_number,
        "$convert" => type_ops::convert,
        "$toBool" => type_ops::to_bool,
        "$toInt" | "$toLong" => type_ops::to_long,
        "$toDouble" => type_ops::to_double,
        "$toDecimal" => type_ops::to_decimal,
        "$toString" => type_ops::to_string,
        "$toDate" => type_ops::to_date,

        // dates
        "$year" => date::year,
        "$month" => date::month,
        "$dayOfMonth" => date::day_of_month,
        "$hour" => date::hour,
        "$minute" => date::minute,
        "$second" => date::second,
        "$millisecond" => date::millisecond,
        "$dayOfWeek" => date::day_of_week,
        "$dayOfYear" => date::day_of_year,
        "$week" => date::week,
        "$isoWeek" => date::iso_week,
        "$isoWeekYear" => date::iso_week_year,
        "$isoDayOfWeek" => date::iso_day_of_week,
        "$dateToString" => date::date_to_string,
        "$dateFromString" => date::date_from_string,
        "$dateToParts" => date::date_to_parts,

        _ => return None,
    };
    Some(op)
}

// ---- shared argument plumbing ----

pub(crate) fn exactly<'v>(args: &'v [Value], n: usize, op: &str) -> Result<&'v [Value]> {
    if args.len() == n {
        Ok(args)
    } else {
        Err(Error::InvalidSpec(format!(
            "{op} expects {n} arguments, found {}",
            args.len()
        )))
    }
}

pub(crate) fn one<'v>(args: &'v [Value], op: &str) -> Result<&'v Value> {
    Ok(&exactly(args, 1, op)?[0])
}

/// True when any argument is null (missing arguments arrive as null).
pub(crate) fn any_null(args: &[Value]) -> bool {
    args.iter().any(|v| matches!(v, Value::Null))
}

pub(crate) fn null() -> Result<Option<Value>> {
    Ok(Some(Value::Null))
}

pub(crate) fn ok(v: Value) -> Result<Option<Value>> {
    Ok(Some(v))
}

pub(crate) fn expect_string<'v>(v: &'v Value, op: &str) -> Result<&'v str> {
    v.as_str()
        .ok_or_else(|| Error::Type(format!("{op} expects a string, found {}", v.type_name())))
}

pub(crate) fn expect_array<'v>(v: &'v Value, op: &str) -> Result<&'v [Value]> {
    v.as_array()
        .ok_or_else(|| Error::Type(format!("{op} expects an array, found {}", v.type_name())))
}

pub(crate) fn expect_number(v: &Value, op: &str) -> Result<f64> {
    v.as_f64()
        .ok_or_else(|| Error::Type(format!("{op} expects a number, found {}", v.type_name())))
}

pub(crate) fn expect_int(v: &Value, op: &str) -> Result<i64> {
    v.as_i64()
        .ok_or_else(|| Error::Type(format!("{op} expects an integer, found {}", v.type_name())))
}
