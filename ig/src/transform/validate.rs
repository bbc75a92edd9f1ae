//! Static validation of raw transformation rules
//!
//! Works on the raw JSON so it can report shapes the lenient `TransformRules`
//! parser silently drops. Never executes a function.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::op::text;
use super::registry;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Check rules against the registry
///
/// Errors: shape problems and unknown functions. Warnings: declared params
/// that are absent (they fall back to defaults at execution time).
pub fn validate(rules: &Value) -> ValidationReport {
    debug!("validate: called");
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let Some(fields) = rules.as_object() else {
        return ValidationReport {
            valid: false,
            errors: vec!["Validation error: transformations must be an object".to_string()],
            warnings,
        };
    };

    for (field, steps) in fields {
        let Some(steps) = steps.as_array() else {
            errors.push(format!("Field '{}': transformations must be a list", field));
            continue;
        };

        for (i, step) in steps.iter().enumerate() {
            let Some(step) = step.as_object() else {
                errors.push(format!("Field '{}', rule {}: rule must be a dictionary", field, i));
                continue;
            };

            let function = match step.get("function") {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) if s.is_empty() => None,
                Some(other) => Some(text(other)),
            };
            let Some(function) = function else {
                errors.push(format!("Field '{}', rule {}: 'function' is required", field, i));
                continue;
            };

            let Some(spec) = registry::lookup(&function) else {
                errors.push(format!("Field '{}', rule {}: unknown function '{}'", field, i, function));
                continue;
            };

            let provided = step.get("params").and_then(Value::as_object);
            for param in spec.params {
                if !provided.is_some_and(|p| p.contains_key(*param)) {
                    warnings.push(format!(
                        "Field '{}', rule {}: missing parameter '{}' for function '{}'",
                        field, i, param, function
                    ));
                }
            }
        }
    }

    debug!(error_count = errors.len(), warning_count = warnings.len(), "validate: done");
    ValidationReport {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_function() {
        let report = validate(&json!({"age": [{"function": "unknown_fn"}]}));
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("unknown_fn"));
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_valid_rules() {
        let report = validate(&json!({
            "name": [{"function": "trim"}, {"function": "uppercase"}],
            "price": [{"function": "round", "params": {"decimals": 2}}]
        }));
        assert_eq!(
            report,
            ValidationReport {
                valid: true,
                errors: vec![],
                warnings: vec![],
            }
        );
    }

    #[test]
    fn test_missing_params_are_warnings() {
        let report = validate(&json!({"phone": [{"function": "replace", "params": {"old": "-"}}]}));
        assert!(report.valid);
        assert_eq!(
            report.warnings,
            vec!["Field 'phone', rule 0: missing parameter 'new' for function 'replace'"]
        );
    }

    #[test]
    fn test_shape_errors() {
        let report = validate(&json!({
            "a": "trim",
            "b": ["trim", {"params": {}}, {"function": ""}, {"function": "lowercase"}]
        }));
        assert!(!report.valid);
        assert_eq!(
            report.errors,
            vec![
                "Field 'a': transformations must be a list",
                "Field 'b', rule 0: rule must be a dictionary",
                "Field 'b', rule 1: 'function' is required",
                "Field 'b', rule 2: 'function' is required",
            ]
        );
    }

    #[test]
    fn test_not_an_object() {
        let report = validate(&json!(["trim"]));
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn test_non_object_params_warn_for_every_param() {
        let report = validate(&json!({"d": [{"function": "split", "params": [","]}]}));
        assert!(report.valid);
        assert_eq!(report.warnings.len(), 2);
    }
}
