use nutmeg::{compute_expr, Error, Options, Value};

fn eval(doc: serde_json::Value, spec: serde_json::Value) -> Result<Value, Error> {
    compute_expr(&doc.into(), &spec.into(), &Options::new())
}

fn eval_ok(doc: serde_json::Value, spec: serde_json::Value) -> serde_json::Value {
    eval(doc, spec).unwrap().into()
}

// ========================================================================
// Field and variable references
// ========================================================================

#[test]
fn test_field_reference() {
    assert_eq!(
        eval_ok(serde_json::json!({"a": {"b": 3}}), serde_json::json!("$a.b")),
        serde_json::json!(3)
    );
}

#[test]
fn test_missing_field_is_null_at_the_surface() {
    assert_eq!(
        eval_ok(serde_json::json!({}), serde_json::json!("$nope")),
        serde_json::json!(null)
    );
}

#[test]
fn test_root_variable() {
    assert_eq!(
        eval_ok(serde_json::json!({"a": 1}), serde_json::json!("$$ROOT.a")),
        serde_json::json!(1)
    );
}

#[test]
fn test_document_literal_preserves_key_order_and_drops_missing() {
    let out = eval(
        serde_json::json!({"b": 2}),
        serde_json::json!({"x": "$b", "y": "$nope", "z": 1}),
    )
    .unwrap();
    let Value::Object(map) = out else { panic!("expected document") };
    let keys: Vec<&str> = map.keys().map(String::as_str).collect();
    // y vanished because its value resolved to missing
    assert_eq!(keys, vec!["x", "z"]);
}

#[test]
fn test_array_literal_turns_missing_into_null() {
    assert_eq!(
        eval_ok(serde_json::json!({"a": 1}), serde_json::json!(["$a", "$nope"])),
        serde_json::json!([1, null])
    );
}

// ========================================================================
// Arithmetic
// ========================================================================

#[test]
fn test_add_integers_stay_integers() {
    assert_eq!(
        eval_ok(serde_json::json!({}), serde_json::json!({"$add": [1, 2, 3]})),
        serde_json::json!(6)
    );
}

#[test]
fn test_add_null_propagates() {
    assert_eq!(
        eval_ok(serde_json::json!({}), serde_json::json!({"$add": [1, null]})),
        serde_json::json!(null)
    );
}

#[test]
fn test_subtract_and_multiply() {
    assert_eq!(
        eval_ok(serde_json::json!({"a": 10}), serde_json::json!({"$subtract": ["$a", 4]})),
        serde_json::json!(6)
    );
    assert_eq!(
        eval_ok(serde_json::json!({}), serde_json::json!({"$multiply": [2.5, 4]})),
        serde_json::json!(10.0)
    );
}

#[test]
fn test_divide_by_zero_raises() {
    assert!(matches!(
        eval(serde_json::json!({}), serde_json::json!({"$divide": [1, 0]})),
        Err(Error::DivisionByZero)
    ));
}

#[test]
fn test_mod_keeps_integer_type() {
    assert_eq!(
        eval_ok(serde_json::json!({}), serde_json::json!({"$mod": [7, 3]})),
        serde_json::json!(1)
    );
}

#[test]
fn test_rounding_family() {
    assert_eq!(
        eval_ok(serde_json::json!({}), serde_json::json!({"$ceil": 1.2})),
        serde_json::json!(2.0)
    );
    assert_eq!(
        eval_ok(serde_json::json!({}), serde_json::json!({"$floor": 1.8})),
        serde_json::json!(1.0)
    );
    assert_eq!(
        eval_ok(serde_json::json!({}), serde_json::json!({"$trunc": [1.987, 1]})),
        serde_json::json!(1.9)
    );
    // banker's rounding at the midpoint
    assert_eq!(
        eval_ok(serde_json::json!({}), serde_json::json!({"$round": [2.5]})),
        serde_json::json!(2.0)
    );
}

#[test]
fn test_sum_spreads_a_single_array_argument() {
    assert_eq!(
        eval_ok(
            serde_json::json!({"xs": [1, 2, "skip", 3]}),
            serde_json::json!({"$sum": "$xs"})
        ),
        serde_json::json!(6)
    );
}

#[test]
fn test_avg_ignores_non_numeric() {
    assert_eq!(
        eval_ok(serde_json::json!({"xs": [2, 4, null]}), serde_json::json!({"$avg": "$xs"})),
        serde_json::json!(3.0)
    );
}

// ========================================================================
// Short-circuit conditionals
// ========================================================================

#[test]
fn test_cond_does_not_evaluate_untaken_branch() {
    // the divide-by-zero sits in the branch that must never run
    assert_eq!(
        eval_ok(
            serde_json::json!({}),
            serde_json::json!({"$cond": [false, {"$divide": [1, 0]}, 42]})
        ),
        serde_json::json!(42)
    );
}

#[test]
fn test_cond_keyword_form() {
    assert_eq!(
        eval_ok(
            serde_json::json!({"a": 5}),
            serde_json::json!({"$cond": {"if": {"$gt": ["$a", 3]}, "then": "big", "else": "small"}})
        ),
        serde_json::json!("big")
    );
}

#[test]
fn test_if_null_takes_first_non_null() {
    assert_eq!(
        eval_ok(
            serde_json::json!({}),
            serde_json::json!({"$ifNull": ["$nope", null, "fallback"]})
        ),
        serde_json::json!("fallback")
    );
}

#[test]
fn test_switch_stops_at_first_truthy_case() {
    assert_eq!(
        eval_ok(
            serde_json::json!({"n": 15}),
            serde_json::json!({"$switch": {
                "branches": [
                    {"case": {"$lt": ["$n", 10]}, "then": "small"},
                    {"case": {"$lt": ["$n", 100]}, "then": "medium"}
                ],
                "default": "large"
            }})
        ),
        serde_json::json!("medium")
    );
}

#[test]
fn test_switch_without_matching_branch_or_default_raises() {
    assert!(matches!(
        eval(
            serde_json::json!({}),
            serde_json::json!({"$switch": {"branches": [{"case": false, "then": 1}]}})
        ),
        Err(Error::Type(_))
    ));
}

#[test]
fn test_and_or_short_circuit() {
    assert_eq!(
        eval_ok(
            serde_json::json!({}),
            serde_json::json!({"$and": [false, {"$divide": [1, 0]}]})
        ),
        serde_json::json!(false)
    );
    assert_eq!(
        eval_ok(
            serde_json::json!({}),
            serde_json::json!({"$or": [true, {"$divide": [1, 0]}]})
        ),
        serde_json::json!(true)
    );
}

// ========================================================================
// Variable binders
// ========================================================================

#[test]
fn test_let_binds_and_shadows() {
    assert_eq!(
        eval_ok(
            serde_json::json!({"a": 2}),
            serde_json::json!({"$let": {
                "vars": {"low": 1, "high": {"$add": ["$a", 10]}},
                "in": {"$add": ["$$low", "$$high"]}
            }})
        ),
        serde_json::json!(13)
    );
}

#[test]
fn test_undefined_variable_raises() {
    assert!(matches!(
        eval(serde_json::json!({}), serde_json::json!("$$nope")),
        Err(Error::InvalidSpec(_))
    ));
}

#[test]
fn test_map_with_custom_binding() {
    assert_eq!(
        eval_ok(
            serde_json::json!({"xs": [1, 2, 3]}),
            serde_json::json!({"$map": {"input": "$xs", "as": "x", "in": {"$multiply": ["$$x", 2]}}})
        ),
        serde_json::json!([2, 4, 6])
    );
}

#[test]
fn test_map_null_input_passes_through() {
    assert_eq!(
        eval_ok(
            serde_json::json!({}),
            serde_json::json!({"$map": {"input": "$nope", "in": "$$this"}})
        ),
        serde_json::json!(null)
    );
}

#[test]
fn test_filter_with_limit() {
    assert_eq!(
        eval_ok(
            serde_json::json!({"xs": [1, 5, 2, 8, 3]}),
            serde_json::json!({"$filter": {
                "input": "$xs",
                "cond": {"$lt": ["$$this", 4]},
                "limit": 2
            }})
        ),
        serde_json::json!([1, 2])
    );
}

#[test]
fn test_reduce_threads_value_and_this() {
    assert_eq!(
        eval_ok(
            serde_json::json!({"xs": ["a", "b", "c"]}),
            serde_json::json!({"$reduce": {
                "input": "$xs",
                "initialValue": "",
                "in": {"$concat": ["$$value", "$$this"]}
            }})
        ),
        serde_json::json!("abc")
    );
}

// ========================================================================
// Strings
// ========================================================================

#[test]
fn test_concat_and_case() {
    assert_eq!(
        eval_ok(
            serde_json::json!({"a": "he", "b": "llo"}),
            serde_json::json!({"$toUpper": {"$concat": ["$a", "$b"]}})
        ),
        serde_json::json!("HELLO")
    );
}

#[test]
fn test_split_and_str_len() {
    assert_eq!(
        eval_ok(serde_json::json!({}), serde_json::json!({"$split": ["a,b,c", ","]})),
        serde_json::json!(["a", "b", "c"])
    );
    assert_eq!(
        eval_ok(serde_json::json!({}), serde_json::json!({"$strLenCP": "héllo"})),
        serde_json::json!(5)
    );
    assert_eq!(
        eval_ok(serde_json::json!({}), serde_json::json!({"$strLenBytes": "héllo"})),
        serde_json::json!(6)
    );
}

#[test]
fn test_substr_variants() {
    assert_eq!(
        eval_ok(serde_json::json!({}), serde_json::json!({"$substrCP": ["héllo", 1, 3]})),
        serde_json::json!("éll")
    );
    assert_eq!(
        eval_ok(serde_json::json!({}), serde_json::json!({"$substrBytes": ["hello", 1, 3]})),
        serde_json::json!("ell")
    );
}

#[test]
fn test_trim_with_custom_chars() {
    assert_eq!(
        eval_ok(
            serde_json::json!({}),
            serde_json::json!({"$trim": {"input": "xxhixx", "chars": "x"}})
        ),
        serde_json::json!("hi")
    );
}

#[test]
fn test_regex_match_with_flags() {
    assert_eq!(
        eval_ok(
            serde_json::json!({"s": "Hello World"}),
            serde_json::json!({"$regexMatch": {"input": "$s", "regex": "world", "options": "i"}})
        ),
        serde_json::json!(true)
    );
}

#[test]
fn test_regex_find_reports_captures_and_index() {
    assert_eq!(
        eval_ok(
            serde_json::json!({}),
            serde_json::json!({"$regexFind": {"input": "abc123", "regex": "([0-9]+)"}})
        ),
        serde_json::json!({"match": "123", "idx": 3, "captures": ["123"]})
    );
}

#[test]
fn test_replace_all() {
    assert_eq!(
        eval_ok(
            serde_json::json!({}),
            serde_json::json!({"$replaceAll": {"input": "a-b-c", "find": "-", "replacement": "+"}})
        ),
        serde_json::json!("a+b+c")
    );
}

// ========================================================================
// Arrays and sets
// ========================================================================

#[test]
fn test_array_elem_at_out_of_range_is_missing() {
    // missing surfaces as null at the top level
    assert_eq!(
        eval_ok(serde_json::json!({"xs": [1]}), serde_json::json!({"$arrayElemAt": ["$xs", 5]})),
        serde_json::json!(null)
    );
    assert_eq!(
        eval_ok(serde_json::json!({"xs": [1, 2]}), serde_json::json!({"$arrayElemAt": ["$xs", -1]})),
        serde_json::json!(2)
    );
}

#[test]
fn test_slice_negative_takes_from_the_end() {
    assert_eq!(
        eval_ok(serde_json::json!({}), serde_json::json!({"$slice": [[1, 2, 3, 4], -2]})),
        serde_json::json!([3, 4])
    );
}

#[test]
fn test_range_and_zip() {
    assert_eq!(
        eval_ok(serde_json::json!({}), serde_json::json!({"$range": [0, 6, 2]})),
        serde_json::json!([0, 2, 4])
    );
    assert_eq!(
        eval_ok(
            serde_json::json!({}),
            serde_json::json!({"$zip": {"inputs": [[1, 2], ["a", "b"]]}})
        ),
        serde_json::json!([[1, "a"], [2, "b"]])
    );
}

#[test]
fn test_in_uses_numeric_equality() {
    assert_eq!(
        eval_ok(serde_json::json!({}), serde_json::json!({"$in": [1.0, [3, 1, 2]]})),
        serde_json::json!(true)
    );
}

#[test]
fn test_object_array_round_trip() {
    assert_eq!(
        eval_ok(
            serde_json::json!({"d": {"a": 1, "b": 2}}),
            serde_json::json!({"$arrayToObject": {"$objectToArray": "$d"}})
        ),
        serde_json::json!({"a": 1, "b": 2})
    );
}

#[test]
fn test_set_union_dedupes() {
    assert_eq!(
        eval_ok(
            serde_json::json!({}),
            serde_json::json!({"$setUnion": [[1, 2, 2], [2, 3]]})
        ),
        serde_json::json!([1, 2, 3])
    );
}

#[test]
fn test_set_is_subset() {
    assert_eq!(
        eval_ok(
            serde_json::json!({}),
            serde_json::json!({"$setIsSubset": [[1, 2], [3, 2, 1]]})
        ),
        serde_json::json!(true)
    );
}

#[test]
fn test_sort_array_by_field() {
    assert_eq!(
        eval_ok(
            serde_json::json!({"xs": [{"n": 3}, {"n": 1}, {"n": 2}]}),
            serde_json::json!({"$sortArray": {"input": "$xs", "sortBy": {"n": 1}}})
        ),
        serde_json::json!([{"n": 1}, {"n": 2}, {"n": 3}])
    );
}

// ========================================================================
// Types, conversion, dates
// ========================================================================

#[test]
fn test_type_distinguishes_long_and_double() {
    assert_eq!(
        eval_ok(serde_json::json!({}), serde_json::json!({"$type": 1})),
        serde_json::json!("long")
    );
    assert_eq!(
        eval_ok(serde_json::json!({}), serde_json::json!({"$type": 1.5})),
        serde_json::json!("double")
    );
}

#[test]
fn test_convert_with_on_error() {
    assert_eq!(
        eval_ok(
            serde_json::json!({}),
            serde_json::json!({"$convert": {"input": "abc", "to": "int", "onError": -1}})
        ),
        serde_json::json!(-1)
    );
}

#[test]
fn test_to_int_raises_without_escape() {
    assert!(matches!(
        eval(serde_json::json!({}), serde_json::json!({"$toInt": "abc"})),
        Err(Error::Type(_))
    ));
}

#[test]
fn test_to_string_and_back() {
    assert_eq!(
        eval_ok(serde_json::json!({}), serde_json::json!({"$toString": 42})),
        serde_json::json!("42")
    );
    assert_eq!(
        eval_ok(serde_json::json!({}), serde_json::json!({"$toInt": "42"})),
        serde_json::json!(42)
    );
}

#[test]
fn test_date_parts_from_string() {
    let spec = serde_json::json!({"$let": {
        "vars": {"d": {"$toDate": "2023-07-14T10:20:30.400Z"}},
        "in": {
            "y": {"$year": "$$d"},
            "m": {"$month": "$$d"},
            "day": {"$dayOfMonth": "$$d"},
            "ms": {"$millisecond": "$$d"}
        }
    }});
    assert_eq!(
        eval_ok(serde_json::json!({}), spec),
        serde_json::json!({"y": 2023, "m": 7, "day": 14, "ms": 400})
    );
}

#[test]
fn test_date_to_string_format_codes() {
    let spec = serde_json::json!({"$dateToString": {
        "date": {"$toDate": "2023-01-05T07:08:09.012Z"},
        "format": "%Y/%m/%d %H:%M:%S.%L"
    }});
    assert_eq!(
        eval_ok(serde_json::json!({}), spec),
        serde_json::json!("2023/01/05 07:08:09.012")
    );
}

#[test]
fn test_date_from_string_inverts_date_to_string() {
    let spec = serde_json::json!({"$dateToString": {
        "date": {"$dateFromString": {"dateString": "2021-03-04 05:06:07", "format": "%Y-%m-%d %H:%M:%S"}},
        "format": "%Y-%m-%d %H:%M:%S"
    }});
    assert_eq!(
        eval_ok(serde_json::json!({}), spec),
        serde_json::json!("2021-03-04 05:06:07")
    );
}

// ========================================================================
// Objects and misc
// ========================================================================

#[test]
fn test_merge_objects_later_wins() {
    assert_eq!(
        eval_ok(
            serde_json::json!({}),
            serde_json::json!({"$mergeObjects": [{"a": 1, "b": 1}, null, {"b": 2}]})
        ),
        serde_json::json!({"a": 1, "b": 2})
    );
}

#[test]
fn test_get_field_reaches_dotted_names() {
    assert_eq!(
        eval_ok(
            serde_json::json!({"a.b": 7}),
            serde_json::json!({"$getField": {"field": "a.b", "input": "$$ROOT"}})
        ),
        serde_json::json!(7)
    );
}

#[test]
fn test_literal_is_not_evaluated() {
    assert_eq!(
        eval_ok(serde_json::json!({}), serde_json::json!({"$literal": {"$add": [1, 2]}})),
        serde_json::json!({"$add": [1, 2]})
    );
}

#[test]
fn test_unknown_operator_fails_at_parse() {
    assert!(matches!(
        eval(serde_json::json!({}), serde_json::json!({"$frobnicate": 1})),
        Err(Error::UnknownOperator(_))
    ));
}

#[test]
fn test_custom_operator() {
    use std::sync::Arc;
    let options = Options::new().with_operator(
        "$double",
        Arc::new(|args: &[Value]| {
            Ok(Value::Int(args[0].as_i64().unwrap_or(0) * 2))
        }),
    );
    let out = compute_expr(
        &serde_json::json!({"n": 21}).into(),
        &serde_json::json!({"$double": "$n"}).into(),
        &options,
    )
    .unwrap();
    assert_eq!(out, Value::Int(42));
}
