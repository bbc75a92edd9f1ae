//! Transformation preview on sample records

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::domain::TransformRules;

use super::{CompiledRules, TransformError};

/// Records shown in a preview
pub const PREVIEW_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preview {
    pub original: Vec<Value>,
    pub transformed: Vec<Value>,
    pub transformations_applied: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Apply transformation rules (no field mapping) to the first sample records
///
/// `sample` is an array of records or a single record. Transformation errors
/// never fail the preview; a sample entry that is not an object does.
pub fn preview(rules: &Value, sample: &Value) -> Result<Preview, TransformError> {
    debug!("preview: called");
    let records: Vec<Value> = match sample {
        Value::Array(items) => items.iter().take(PREVIEW_LIMIT).cloned().collect(),
        Value::Null => Vec::new(),
        single => vec![single.clone()],
    };

    if records.is_empty() {
        debug!("preview: no sample data");
        return Ok(Preview {
            original: Vec::new(),
            transformed: Vec::new(),
            transformations_applied: rules.clone(),
            message: Some("No sample data provided".to_string()),
        });
    }

    let compiled = CompiledRules::compile(&TransformRules::from_value(rules));
    let transformed = records
        .iter()
        .map(|record| compiled.transform_value(record).map(Value::Object))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Preview {
        original: records,
        transformed,
        transformations_applied: rules.clone(),
        message: None,
    })
}
