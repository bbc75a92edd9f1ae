//! Transformation error types

use thiserror::Error;

/// Errors raised while compiling or applying a transformation step
///
/// None of these abort a record: the engine logs them at debug level and
/// keeps the value it had before the failing step.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransformError {
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Invalid parameter '{param}' for {function}: {reason}")]
    InvalidParam {
        function: &'static str,
        param: &'static str,
        reason: String,
    },

    #[error("Cannot convert {0} to a number")]
    NotANumber(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Result is not a finite number")]
    NonFinite,

    #[error("Unrecognized date: {0}")]
    DateParse(String),

    #[error("Invalid date format: {0}")]
    DateFormat(String),

    #[error("Date arithmetic out of range")]
    DateOverflow,

    #[error("No such capture group: {0}")]
    NoSuchGroup(String),

    #[error("Record must be an object, got {0}")]
    NotAnObject(&'static str),
}

impl TransformError {
    pub(crate) fn invalid(function: &'static str, param: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParam {
            function,
            param,
            reason: reason.into(),
        }
    }
}

/// JSON type name, for messages
pub(crate) fn type_name(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
