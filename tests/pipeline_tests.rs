use std::sync::{Arc, Mutex};

use nutmeg::{aggregate, Aggregator, Error, Options, Value};

fn docs(v: serde_json::Value) -> Vec<Value> {
    match Value::from(v) {
        Value::Array(items) => items,
        _ => panic!("fixture must be an array"),
    }
}

fn run(docs_json: serde_json::Value, pipeline: serde_json::Value) -> serde_json::Value {
    run_with(docs_json, pipeline, Options::new())
}

fn run_with(
    docs_json: serde_json::Value,
    pipeline: serde_json::Value,
    options: Options,
) -> serde_json::Value {
    let out = aggregate(&docs(docs_json), &pipeline.into(), options).unwrap();
    serde_json::Value::Array(out.into_iter().map(Into::into).collect())
}

// ========================================================================
// Identity and plumbing
// ========================================================================

#[test]
fn test_empty_pipeline_is_identity() {
    let input = serde_json::json!([{"a": 1}, {"b": 2}]);
    assert_eq!(run(input.clone(), serde_json::json!([])), input);
}

#[test]
fn test_limit_and_skip() {
    let input = serde_json::json!([{"n": 1}, {"n": 2}, {"n": 3}, {"n": 4}]);
    assert_eq!(
        run(input.clone(), serde_json::json!([{"$skip": 1}, {"$limit": 2}])),
        serde_json::json!([{"n": 2}, {"n": 3}])
    );
    assert_eq!(run(input, serde_json::json!([{"$limit": 0}])), serde_json::json!([]));
}

#[test]
fn test_stream_is_lazy_past_limit() {
    // the failing document sits beyond the limit and must never be pulled
    // into the divide
    let input = docs(serde_json::json!([{"a": 1, "b": 1}, {"a": 1, "b": 0}]));
    let agg = Aggregator::new(
        &serde_json::json!([
            {"$addFields": {"q": {"$divide": ["$a", "$b"]}}},
            {"$limit": 1}
        ])
        .into(),
        Options::new(),
    )
    .unwrap();
    let first: Vec<Value> = agg.stream(&input).take(1).collect::<Result<_, _>>().unwrap();
    assert_eq!(first.len(), 1);
}

#[test]
fn test_runtime_error_surfaces_at_the_pull() {
    let input = docs(serde_json::json!([{"a": 1, "b": 0}]));
    let agg = Aggregator::new(
        &serde_json::json!([{"$addFields": {"q": {"$divide": ["$a", "$b"]}}}]).into(),
        Options::new(),
    )
    .unwrap();
    let mut stream = agg.stream(&input);
    assert!(matches!(stream.next(), Some(Err(Error::DivisionByZero))));
}

#[test]
fn test_unknown_stage_fails_at_construction() {
    let err = Aggregator::new(&serde_json::json!([{"$teleport": 1}]).into(), Options::new());
    assert!(matches!(err, Err(Error::UnknownOperator(_))));
}

#[test]
fn test_run_owned_zero_copy_mode() {
    let input = docs(serde_json::json!([{"n": 2}, {"n": 1}]));
    let agg = Aggregator::new(&serde_json::json!([{"$sort": {"n": 1}}]).into(), Options::new())
        .unwrap();
    let out = agg.run_owned(input).unwrap();
    assert_eq!(out.len(), 2);
}

// ========================================================================
// $match / reshaping stages
// ========================================================================

#[test]
fn test_match_filters() {
    assert_eq!(
        run(
            serde_json::json!([{"a": 1}, {"a": 5}]),
            serde_json::json!([{"$match": {"a": {"$gte": 3}}}])
        ),
        serde_json::json!([{"a": 5}])
    );
}

#[test]
fn test_project_output_follows_spec_order() {
    let out = aggregate(
        &docs(serde_json::json!([{"_id": 1, "a": 1, "b": 2}])),
        &serde_json::json!([{"$project": {"b": 1, "a": 1}}]).into(),
        Options::new(),
    )
    .unwrap();
    let Value::Object(map) = &out[0] else { panic!("expected document") };
    let keys: Vec<&str> = map.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["_id", "b", "a"]);
}

#[test]
fn test_project_full_include_is_identity_modulo_id() {
    let input = serde_json::json!([{"_id": 1, "a": 1, "b": {"c": 2}}]);
    assert_eq!(
        run(input.clone(), serde_json::json!([{"$project": {"a": 1, "b": 1}}])),
        input
    );
}

#[test]
fn test_add_fields_and_unset() {
    assert_eq!(
        run(
            serde_json::json!([{"a": 1, "junk": true}]),
            serde_json::json!([
                {"$addFields": {"b": {"$add": ["$a", 1]}}},
                {"$unset": "junk"}
            ])
        ),
        serde_json::json!([{"a": 1, "b": 2}])
    );
}

#[test]
fn test_add_fields_remove_variable_deletes() {
    assert_eq!(
        run(
            serde_json::json!([{"a": 1, "b": 2}]),
            serde_json::json!([{"$addFields": {"b": "$$REMOVE"}}])
        ),
        serde_json::json!([{"a": 1}])
    );
}

#[test]
fn test_replace_root() {
    assert_eq!(
        run(
            serde_json::json!([{"wrap": {"x": 1}}]),
            serde_json::json!([{"$replaceRoot": {"newRoot": "$wrap"}}])
        ),
        serde_json::json!([{"x": 1}])
    );
}

#[test]
fn test_replace_root_rejects_non_documents() {
    let input = docs(serde_json::json!([{"wrap": 5}]));
    let agg = Aggregator::new(
        &serde_json::json!([{"$replaceWith": "$wrap"}]).into(),
        Options::new(),
    )
    .unwrap();
    assert!(matches!(agg.run(&input), Err(Error::Type(_))));
}

// ========================================================================
// $unwind
// ========================================================================

#[test]
fn test_unwind_emits_in_array_order() {
    assert_eq!(
        run(
            serde_json::json!([{"a": [1, 2, 3]}, {"a": [4, 5]}]),
            serde_json::json!([{"$unwind": "$a"}])
        ),
        serde_json::json!([{"a": 1}, {"a": 2}, {"a": 3}, {"a": 4}, {"a": 5}])
    );
}

#[test]
fn test_unwind_drops_null_and_empty_by_default() {
    assert_eq!(
        run(
            serde_json::json!([{"a": []}, {"a": null}, {"b": 1}, {"a": 7}]),
            serde_json::json!([{"$unwind": "$a"}])
        ),
        serde_json::json!([{"a": 7}])
    );
}

#[test]
fn test_unwind_preserve_and_index() {
    assert_eq!(
        run(
            serde_json::json!([{"a": ["x"]}, {"a": null}]),
            serde_json::json!([{"$unwind": {
                "path": "$a",
                "includeArrayIndex": "i",
                "preserveNullAndEmptyArrays": true
            }}])
        ),
        serde_json::json!([{"a": "x", "i": 0}, {"a": null, "i": null}])
    );
}

// ========================================================================
// $sort / $group
// ========================================================================

#[test]
fn test_sort_is_stable_on_equal_keys() {
    assert_eq!(
        run(
            serde_json::json!([
                {"k": 1, "tag": "first"},
                {"k": 0, "tag": "zero"},
                {"k": 1, "tag": "second"}
            ]),
            serde_json::json!([{"$sort": {"k": 1}}])
        ),
        serde_json::json!([
            {"k": 0, "tag": "zero"},
            {"k": 1, "tag": "first"},
            {"k": 1, "tag": "second"}
        ])
    );
}

#[test]
fn test_sort_compound_directions() {
    assert_eq!(
        run(
            serde_json::json!([
                {"a": 1, "b": 1},
                {"a": 2, "b": 9},
                {"a": 1, "b": 5}
            ]),
            serde_json::json!([{"$sort": {"a": 1, "b": -1}}])
        ),
        serde_json::json!([
            {"a": 1, "b": 5},
            {"a": 1, "b": 1},
            {"a": 2, "b": 9}
        ])
    );
}

#[test]
fn test_group_sums_per_key() {
    let out = aggregate(
        &docs(serde_json::json!([
            {"k": 1, "v": 10},
            {"k": 1, "v": 20},
            {"k": 2, "v": 30}
        ])),
        &serde_json::json!([{"$group": {"_id": "$k", "s": {"$sum": "$v"}}}]).into(),
        Options::new(),
    )
    .unwrap();
    // emission order is not part of the contract
    let mut rows: Vec<serde_json::Value> = out.into_iter().map(Into::into).collect();
    rows.sort_by_key(|r| r["_id"].as_i64());
    assert_eq!(
        serde_json::Value::Array(rows),
        serde_json::json!([{"_id": 1, "s": 30}, {"_id": 2, "s": 30}])
    );
}

#[test]
fn test_group_emits_one_doc_per_canonical_id() {
    // 1 and 1.0 are the same key under canonical equality
    let out = aggregate(
        &docs(serde_json::json!([{"k": 1}, {"k": 1.0}, {"k": 2}])),
        &serde_json::json!([{"$group": {"_id": "$k", "n": {"$count": {}}}}]).into(),
        Options::new(),
    )
    .unwrap();
    assert_eq!(out.len(), 2);
}

#[test]
fn test_group_accumulator_spread() {
    let out = aggregate(
        &docs(serde_json::json!([
            {"k": "a", "v": 4},
            {"k": "a", "v": 2},
            {"k": "a", "v": 4}
        ])),
        &serde_json::json!([{"$group": {
            "_id": "$k",
            "lo": {"$min": "$v"},
            "hi": {"$max": "$v"},
            "avg": {"$avg": "$v"},
            "all": {"$push": "$v"},
            "set": {"$addToSet": "$v"},
            "first": {"$first": "$v"},
            "last": {"$last": "$v"}
        }}])
        .into(),
        Options::new(),
    )
    .unwrap();
    assert_eq!(
        serde_json::Value::from(out[0].clone()),
        serde_json::json!({
            "_id": "a",
            "lo": 2, "hi": 4,
            "avg": 10.0 / 3.0,
            "all": [4, 2, 4],
            "set": [4, 2],
            "first": 4, "last": 4
        })
    );
}

#[test]
fn test_group_stddev_welford() {
    let out = aggregate(
        &docs(serde_json::json!([{"v": 2}, {"v": 4}, {"v": 4}, {"v": 4}, {"v": 5}, {"v": 5}, {"v": 7}, {"v": 9}])),
        &serde_json::json!([{"$group": {"_id": null, "sd": {"$stdDevPop": "$v"}}}]).into(),
        Options::new(),
    )
    .unwrap();
    let Value::Object(map) = &out[0] else { panic!("expected document") };
    let Some(Value::Double(sd)) = map.get("sd") else { panic!("expected double") };
    assert!((sd - 2.0).abs() < 1e-9);
}

#[test]
fn test_group_merge_objects() {
    let out = aggregate(
        &docs(serde_json::json!([
            {"d": {"a": 1, "b": 1}},
            {"d": {"b": 2, "c": 3}}
        ])),
        &serde_json::json!([{"$group": {"_id": null, "m": {"$mergeObjects": "$d"}}}]).into(),
        Options::new(),
    )
    .unwrap();
    assert_eq!(
        serde_json::Value::from(out[0].clone()),
        serde_json::json!({"_id": null, "m": {"a": 1, "b": 2, "c": 3}})
    );
}

#[test]
fn test_count_and_sort_by_count() {
    assert_eq!(
        run(
            serde_json::json!([{"t": "x"}, {"t": "y"}, {"t": "x"}]),
            serde_json::json!([{"$count": "total"}])
        ),
        serde_json::json!([{"total": 3}])
    );
    assert_eq!(
        run(
            serde_json::json!([{"t": "x"}, {"t": "y"}, {"t": "x"}]),
            serde_json::json!([{"$sortByCount": "$t"}])
        ),
        serde_json::json!([{"_id": "x", "count": 2}, {"_id": "y", "count": 1}])
    );
}

// ========================================================================
// Buckets
// ========================================================================

#[test]
fn test_bucket_partitions_by_boundaries() {
    assert_eq!(
        run(
            serde_json::json!([{"p": 1}, {"p": 5}, {"p": 12}, {"p": 30}]),
            serde_json::json!([{"$bucket": {
                "groupBy": "$p",
                "boundaries": [0, 10, 20],
                "default": "other",
                "output": {"n": {"$sum": 1}}
            }}])
        ),
        serde_json::json!([
            {"_id": 0, "n": 2},
            {"_id": 10, "n": 1},
            {"_id": "other", "n": 1}
        ])
    );
}

#[test]
fn test_bucket_without_default_rejects_out_of_range() {
    let input = docs(serde_json::json!([{"p": 99}]));
    let agg = Aggregator::new(
        &serde_json::json!([{"$bucket": {"groupBy": "$p", "boundaries": [0, 10]}}]).into(),
        Options::new(),
    )
    .unwrap();
    assert!(matches!(agg.run(&input), Err(Error::Type(_))));
}

#[test]
fn test_bucket_boundaries_must_ascend() {
    let err = Aggregator::new(
        &serde_json::json!([{"$bucket": {"groupBy": "$p", "boundaries": [10, 0]}}]).into(),
        Options::new(),
    );
    assert!(matches!(err, Err(Error::InvalidSpec(_))));
}

#[test]
fn test_bucket_auto_chains_boundaries() {
    // six documents into three buckets: min/max chain 1 -> 3 -> 5 -> 6
    let out = run(
        serde_json::json!([{"_id": 1}, {"_id": 2}, {"_id": 3}, {"_id": 4}, {"_id": 5}, {"_id": 6}]),
        serde_json::json!([{"$bucketAuto": {"groupBy": "$_id", "buckets": 3}}]),
    );
    assert_eq!(
        out,
        serde_json::json!([
            {"_id": {"min": 1, "max": 3}, "count": 2},
            {"_id": {"min": 3, "max": 5}, "count": 2},
            {"_id": {"min": 5, "max": 6}, "count": 2}
        ])
    );
}

#[test]
fn test_bucket_auto_equal_keys_never_span_buckets() {
    let out = aggregate(
        &docs(serde_json::json!([
            {"k": 1}, {"k": 1}, {"k": 1}, {"k": 2}
        ])),
        &serde_json::json!([{"$bucketAuto": {"groupBy": "$k", "buckets": 2}}]).into(),
        Options::new(),
    )
    .unwrap();
    let rows: Vec<serde_json::Value> = out.into_iter().map(Into::into).collect();
    // the run of equal keys is absorbed by the first bucket
    assert_eq!(rows[0]["count"], serde_json::json!(3));
    assert_eq!(rows[1]["count"], serde_json::json!(1));
}

#[test]
fn test_bucket_auto_bucket_count_must_be_positive() {
    let err = Aggregator::new(
        &serde_json::json!([{"$bucketAuto": {"groupBy": "$k", "buckets": 0}}]).into(),
        Options::new(),
    );
    assert!(matches!(err, Err(Error::InvalidSpec(_))));
}

// ========================================================================
// $lookup / $graphLookup / $facet
// ========================================================================

#[test]
fn test_lookup_equality_form() {
    let options = Options::new().with_collection(
        "items",
        docs(serde_json::json!([
            {"sku": "a", "q": 1},
            {"sku": "b", "q": 2},
            {"sku": "a", "q": 3}
        ])),
    );
    assert_eq!(
        run_with(
            serde_json::json!([{"order": 1, "sku": "a"}]),
            serde_json::json!([{"$lookup": {
                "from": "items",
                "localField": "sku",
                "foreignField": "sku",
                "as": "lines"
            }}]),
            options,
        ),
        serde_json::json!([{
            "order": 1, "sku": "a",
            "lines": [{"sku": "a", "q": 1}, {"sku": "a", "q": 3}]
        }])
    );
}

#[test]
fn test_lookup_pipeline_form_with_let() {
    let options = Options::new().with_collection(
        "items",
        docs(serde_json::json!([{"q": 1}, {"q": 5}, {"q": 9}])),
    );
    assert_eq!(
        run_with(
            serde_json::json!([{"min": 4}]),
            serde_json::json!([{"$lookup": {
                "from": "items",
                "let": {"floor": "$min"},
                "pipeline": [{"$match": {"$expr": {"$gt": ["$q", "$$floor"]}}}],
                "as": "big"
            }}]),
            options,
        ),
        serde_json::json!([{"min": 4, "big": [{"q": 5}, {"q": 9}]}])
    );
}

#[test]
fn test_lookup_unknown_collection_fails_at_construction() {
    let err = Aggregator::new(
        &serde_json::json!([{"$lookup": {
            "from": "nope", "localField": "a", "foreignField": "b", "as": "out"
        }}])
        .into(),
        Options::new(),
    );
    assert!(matches!(err, Err(Error::InvalidSpec(_))));
}

#[test]
fn test_graph_lookup_walks_reports_chain() {
    let options = Options::new().with_collection(
        "people",
        docs(serde_json::json!([
            {"_id": 1, "name": "ceo", "boss": null},
            {"_id": 2, "name": "vp", "boss": 1},
            {"_id": 3, "name": "ic", "boss": 2}
        ])),
    );
    let out = aggregate(
        &docs(serde_json::json!([{"start": 3}])),
        &serde_json::json!([{"$graphLookup": {
            "from": "people",
            "startWith": "$start",
            "connectFromField": "boss",
            "connectToField": "_id",
            "as": "chain",
            "depthField": "level"
        }}])
        .into(),
        options,
    )
    .unwrap();
    let row: serde_json::Value = out[0].clone().into();
    let names: Vec<&str> = row["chain"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["ic", "vp", "ceo"]);
    assert_eq!(row["chain"][2]["level"], serde_json::json!(2));
}

#[test]
fn test_graph_lookup_max_depth_stops_the_walk() {
    let options = Options::new().with_collection(
        "people",
        docs(serde_json::json!([
            {"_id": 1, "boss": null},
            {"_id": 2, "boss": 1},
            {"_id": 3, "boss": 2}
        ])),
    );
    let out = aggregate(
        &docs(serde_json::json!([{"start": 3}])),
        &serde_json::json!([{"$graphLookup": {
            "from": "people",
            "startWith": "$start",
            "connectFromField": "boss",
            "connectToField": "_id",
            "maxDepth": 0,
            "as": "chain"
        }}])
        .into(),
        options,
    )
    .unwrap();
    let row: serde_json::Value = out[0].clone().into();
    assert_eq!(row["chain"].as_array().unwrap().len(), 1);
}

#[test]
fn test_facet_runs_sub_pipelines_over_one_upstream() {
    assert_eq!(
        run(
            serde_json::json!([{"v": 1}, {"v": 2}, {"v": 3}]),
            serde_json::json!([{"$facet": {
                "big": [{"$match": {"v": {"$gte": 2}}}, {"$count": "n"}],
                "all": [{"$count": "n"}]
            }}])
        ),
        serde_json::json!([{"big": [{"n": 2}], "all": [{"n": 3}]}])
    );
}

#[test]
fn test_facet_rejects_nested_facet() {
    let err = Aggregator::new(
        &serde_json::json!([{"$facet": {"f": [{"$facet": {"g": []}}]}}]).into(),
        Options::new(),
    );
    assert!(matches!(err, Err(Error::InvalidSpec(_))));
}

// ========================================================================
// $setWindowFields
// ========================================================================

#[test]
fn test_window_running_total() {
    assert_eq!(
        run(
            serde_json::json!([
                {"g": "a", "x": 1},
                {"g": "a", "x": 2},
                {"g": "b", "x": 5}
            ]),
            serde_json::json!([{"$setWindowFields": {
                "partitionBy": "$g",
                "sortBy": {"x": 1},
                "output": {"total": {
                    "$sum": "$x",
                    "window": {"documents": ["unbounded", "current"]}
                }}
            }}])
        ),
        serde_json::json!([
            {"g": "a", "x": 1, "total": 1},
            {"g": "a", "x": 2, "total": 3},
            {"g": "b", "x": 5, "total": 5}
        ])
    );
}

#[test]
fn test_window_rank_family() {
    assert_eq!(
        run(
            serde_json::json!([{"x": 10}, {"x": 20}, {"x": 10}, {"x": 30}]),
            serde_json::json!([{"$setWindowFields": {
                "sortBy": {"x": 1},
                "output": {
                    "r": {"$rank": {}},
                    "dr": {"$denseRank": {}},
                    "n": {"$documentNumber": {}}
                }
            }}])
        ),
        serde_json::json!([
            {"x": 10, "r": 1, "dr": 1, "n": 1},
            {"x": 10, "r": 1, "dr": 1, "n": 2},
            {"x": 20, "r": 3, "dr": 2, "n": 3},
            {"x": 30, "r": 4, "dr": 3, "n": 4}
        ])
    );
}

#[test]
fn test_window_shift() {
    assert_eq!(
        run(
            serde_json::json!([{"x": 1}, {"x": 2}, {"x": 3}]),
            serde_json::json!([{"$setWindowFields": {
                "sortBy": {"x": 1},
                "output": {"prev": {"$shift": {"output": "$x", "by": -1, "default": 0}}}
            }}])
        ),
        serde_json::json!([
            {"x": 1, "prev": 0},
            {"x": 2, "prev": 1},
            {"x": 3, "prev": 2}
        ])
    );
}

#[test]
fn test_window_rank_requires_sort_by() {
    let err = Aggregator::new(
        &serde_json::json!([{"$setWindowFields": {"output": {"r": {"$rank": {}}}}}]).into(),
        Options::new(),
    );
    assert!(matches!(err, Err(Error::InvalidSpec(_))));
}

// ========================================================================
// $out / $merge
// ========================================================================

#[test]
fn test_out_materializes_through_the_sink() {
    let captured: Arc<Mutex<Vec<(String, usize)>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = captured.clone();
    let options = Options::new().with_sink(Arc::new(move |name: &str, docs: &[Value]| {
        seen.lock().unwrap().push((name.to_string(), docs.len()));
        Ok(())
    }));
    let out = run_with(
        serde_json::json!([{"a": 1}, {"a": 2}]),
        serde_json::json!([{"$out": "archive"}]),
        options,
    );
    assert_eq!(out.as_array().unwrap().len(), 2);
    assert_eq!(*captured.lock().unwrap(), vec![("archive".to_string(), 2)]);
}

#[test]
fn test_out_without_sink_fails_at_construction() {
    let err = Aggregator::new(&serde_json::json!([{"$out": "x"}]).into(), Options::new());
    assert!(matches!(err, Err(Error::InvalidSpec(_))));
}

// ========================================================================
// Composition
// ========================================================================

#[test]
fn test_unwind_group_roundup() {
    assert_eq!(
        run(
            serde_json::json!([
                {"tags": ["red", "blue"]},
                {"tags": ["blue"]}
            ]),
            serde_json::json!([
                {"$unwind": "$tags"},
                {"$sortByCount": "$tags"}
            ])
        ),
        serde_json::json!([{"_id": "blue", "count": 2}, {"_id": "red", "count": 1}])
    );
}

#[test]
fn test_match_project_sort_pipeline() {
    assert_eq!(
        run(
            serde_json::json!([
                {"_id": 1, "name": "c", "score": 10},
                {"_id": 2, "name": "a", "score": 30},
                {"_id": 3, "name": "b", "score": 20},
                {"_id": 4, "name": "d", "score": 5}
            ]),
            serde_json::json!([
                {"$match": {"score": {"$gte": 10}}},
                {"$sort": {"score": -1}},
                {"$project": {"_id": 0, "name": 1, "doubled": {"$multiply": ["$score", 2]}}}
            ])
        ),
        serde_json::json!([
            {"name": "a", "doubled": 60},
            {"name": "b", "doubled": 40},
            {"name": "c", "doubled": 20}
        ])
    );
}
