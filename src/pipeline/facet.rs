//! `$facet`: several sub-pipelines over one shared upstream, emitted as a
//! single document with one array field per facet, in spec key order.

use crate::ast::Stage;
use crate::error::{Error, Result};
use crate::options::Options;
use crate::value::{Document, Value};

pub fn parse_facet(spec: &Value, options: &Options) -> Result<Vec<(String, Vec<Stage>)>> {
    let Value::Object(doc) = spec else {
        return Err(Error::InvalidSpec("$facet expects a document".to_string()));
    };
    if doc.is_empty() {
        return Err(Error::InvalidSpec("$facet requires at least one facet".to_string()));
    }
    let mut facets = Vec::with_capacity(doc.len());
    for (name, stages) in doc {
        let Value::Array(stages) = stages else {
            return Err(Error::InvalidSpec(format!("facet '{name}' must be a pipeline array")));
        };
        for stage in stages {
            if let Value::Object(s) = stage {
                if let Some(op) = s.keys().next() {
                    if matches!(op.as_str(), "$facet" | "$out" | "$merge") {
                        return Err(Error::InvalidSpec(format!(
                            "{op} is not allowed inside $facet"
                        )));
                    }
                }
            }
        }
        facets.push((name.clone(), super::compile_stages(stages, options)?));
    }
    Ok(facets)
}

pub fn execute(
    facets: &[(String, Vec<Stage>)],
    docs: Vec<Value>,
    options: &Options,
) -> Result<Vec<Value>> {
    let mut out = Document::new();
    for (name, stages) in facets {
        let results = super::run_stages(stages, docs.clone(), options)?;
        out.insert(name.clone(), Value::Array(results));
    }
    Ok(vec![Value::Object(out)])
}
