//! Condition grammar used by the `conditional` function
//!
//! Conditions are prefix-tagged strings evaluated against the current value:
//! `==X`, `!=X`, `contains:X`, `empty`, `not_empty`. Anything else is false.

use serde_json::Value;
use tracing::debug;

use super::op::text;

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals(String),
    NotEquals(String),
    Contains(String),
    Empty,
    NotEmpty,
    /// Empty, unrecognized or non-string condition
    Never,
}

impl Condition {
    /// Parse a raw `condition` parameter
    pub fn parse(raw: &Value) -> Self {
        debug!(?raw, "Condition::parse: called");
        let Some(s) = raw.as_str() else {
            return Self::Never;
        };
        if let Some(rest) = s.strip_prefix("==") {
            Self::Equals(rest.trim().to_string())
        } else if let Some(rest) = s.strip_prefix("!=") {
            Self::NotEquals(rest.trim().to_string())
        } else if let Some(rest) = s.strip_prefix("contains:") {
            Self::Contains(rest.trim().to_string())
        } else if s.starts_with("empty") {
            Self::Empty
        } else if s.starts_with("not_empty") {
            Self::NotEmpty
        } else {
            Self::Never
        }
    }

    pub fn evaluate(&self, value: &Value) -> bool {
        match self {
            Self::Equals(expected) => text(value) == *expected,
            Self::NotEquals(expected) => text(value) != *expected,
            Self::Contains(needle) => text(value).contains(needle.as_str()),
            Self::Empty => is_empty(value),
            Self::NotEmpty => !is_empty(value),
            Self::Never => false,
        }
    }
}

/// Null or the empty string
pub(crate) fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}
