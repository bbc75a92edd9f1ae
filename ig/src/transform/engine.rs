//! Rule execution
//!
//! Every function call goes through `apply_step`, which absorbs errors and
//! keeps the pre-step value. Transformation never fails a record; only a
//! record that is not an object does.

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::{Record, TransformRules};

use super::error::type_name;
use super::{TransformError, TransformOp, registry};

/// Apply one compiled operation, keeping `value` on any error
pub fn apply_step(op: &TransformOp, value: Value) -> Value {
    match op.apply(&value) {
        Ok(out) => out,
        Err(e) => {
            debug!(op = %op.name(), error = %e, "apply_step: keeping original value");
            value
        }
    }
}

/// Apply a single named function to a value
///
/// Unknown functions and unusable params leave the value untouched.
pub fn apply(value: &Value, function: &str, params: &Map<String, Value>) -> Value {
    debug!(%function, "apply: called");
    match registry::compile(function, params) {
        Ok(op) => apply_step(&op, value.clone()),
        Err(e) => {
            debug!(%function, error = %e, "apply: step skipped");
            value.clone()
        }
    }
}

/// A compiled step; steps that failed to compile are kept so they can be reported
#[derive(Debug, Clone)]
pub struct CompiledStep {
    pub function: String,
    pub op: Result<TransformOp, TransformError>,
}

/// Transformation rules compiled once per job
#[derive(Debug, Clone, Default)]
pub struct CompiledRules {
    fields: IndexMap<String, Vec<CompiledStep>>,
}

impl CompiledRules {
    /// Compile every step; unknown functions are dropped
    pub fn compile(rules: &TransformRules) -> Self {
        debug!(field_count = rules.len(), "CompiledRules::compile: called");
        let mut fields = IndexMap::new();
        for (field, steps) in rules.iter() {
            let compiled: Vec<CompiledStep> = steps
                .iter()
                .filter_map(|step| match registry::lookup(&step.function) {
                    Some(spec) => Some(CompiledStep {
                        function: step.function.clone(),
                        op: spec.compile(&step.params),
                    }),
                    None => {
                        debug!(%field, function = %step.function, "CompiledRules::compile: unknown function skipped");
                        None
                    }
                })
                .collect();
            for step in &compiled {
                if let Err(e) = &step.op {
                    debug!(%field, function = %step.function, error = %e, "CompiledRules::compile: step will be a no-op");
                }
            }
            fields.insert(field.clone(), compiled);
        }
        Self { fields }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of steps that failed to compile
    pub fn invalid_steps(&self) -> usize {
        self.fields.values().flatten().filter(|s| s.op.is_err()).count()
    }

    /// Run a field's chain on a value
    pub fn apply_chain(&self, field: &str, value: Value) -> Value {
        match self.fields.get(field) {
            Some(steps) => run_chain(steps, value),
            None => value,
        }
    }

    /// Transform one record
    ///
    /// Every ruled field is rewritten in rule order; a rule on a missing field
    /// materializes it from null.
    pub fn transform_record(&self, record: &Record) -> Record {
        let mut transformed = record.clone();
        for (field, steps) in &self.fields {
            let value = record.get(field).cloned().unwrap_or(Value::Null);
            transformed.insert(field.clone(), run_chain(steps, value));
        }
        transformed
    }

    /// Transform a raw JSON record, which must be an object
    pub fn transform_value(&self, value: &Value) -> Result<Record, TransformError> {
        match value {
            Value::Object(record) => Ok(self.transform_record(record)),
            other => Err(TransformError::NotAnObject(type_name(other))),
        }
    }
}

fn run_chain(steps: &[CompiledStep], value: Value) -> Value {
    steps.iter().fold(value, |value, step| match &step.op {
        Ok(op) => apply_step(op, value),
        Err(_) => value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TransformStep;
    use serde_json::json;

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_apply_known_values() {
        let p = |v: Value| v.as_object().cloned().unwrap();
        assert_eq!(apply(&json!(3.14159), "round", &p(json!({"decimals": 2}))), json!(3.14));
        assert_eq!(apply(&json!("5"), "multiply", &p(json!({"factor": 2}))), json!(10.0));
        assert_eq!(
            apply(&json!("a,b,c"), "split", &p(json!({"delimiter": ",", "index": 1}))),
            json!("b")
        );
    }

    #[test]
    fn test_apply_errors_keep_original() {
        let p = |v: Value| v.as_object().cloned().unwrap();
        assert_eq!(apply(&json!("abc"), "multiply", &p(json!({"factor": 2}))), json!("abc"));
        assert_eq!(apply(&json!(10), "divide", &p(json!({"divisor": 0}))), json!(10));
        assert_eq!(apply(&json!("x"), "regex_extract", &p(json!({"pattern": "(["}))), json!("x"));
        assert_eq!(apply(&json!("a,b"), "split", &p(json!({"delimiter": ""}))), json!("a,b"));
        assert_eq!(apply(&json!("2024-01-01"), "format_date", &p(json!({"format": "%Q"}))), json!("2024-01-01"));
        assert_eq!(apply(&json!("x"), "no_such_fn", &Map::new()), json!("x"));
    }

    #[test]
    fn test_chain_in_order() {
        let rules = TransformRules::new()
            .with_step("name", TransformStep::new("trim"))
            .with_step("name", TransformStep::new("uppercase"))
            .with_step("name", TransformStep::new("replace").with_param("old", "A").with_param("new", "4"));
        let compiled = CompiledRules::compile(&rules);

        let out = compiled.transform_record(&record(json!({"name": "  alan  ", "age": 3})));
        assert_eq!(out, record(json!({"name": "4L4N", "age": 3})));
    }

    #[test]
    fn test_rule_on_missing_field_materializes() {
        let rules = TransformRules::new().with_step(
            "status",
            TransformStep::new("default_value").with_param("default", "new"),
        );
        let out = CompiledRules::compile(&rules).transform_record(&record(json!({"id": 1})));
        assert_eq!(out, record(json!({"id": 1, "status": "new"})));
    }

    #[test]
    fn test_unknown_and_invalid_steps_skipped() {
        let rules = TransformRules::new()
            .with_step("v", TransformStep::new("bogus"))
            .with_step("v", TransformStep::new("split").with_param("delimiter", ""))
            .with_step("v", TransformStep::new("uppercase"));
        let compiled = CompiledRules::compile(&rules);
        assert_eq!(compiled.invalid_steps(), 1);

        let out = compiled.transform_record(&record(json!({"v": "a,b"})));
        assert_eq!(out["v"], json!("A,B"));
    }

    #[test]
    fn test_transform_value_rejects_non_object() {
        let compiled = CompiledRules::compile(&TransformRules::new());
        assert_eq!(
            compiled.transform_value(&json!([1])).unwrap_err(),
            TransformError::NotAnObject("array")
        );
        assert!(compiled.is_empty());
    }

    #[test]
    fn test_apply_chain_unruled_field() {
        let compiled = CompiledRules::compile(&TransformRules::new().with_step("a", TransformStep::new("lowercase")));
        assert_eq!(compiled.apply_chain("a", json!("X")), json!("x"));
        assert_eq!(compiled.apply_chain("b", json!("X")), json!("X"));
    }
}
