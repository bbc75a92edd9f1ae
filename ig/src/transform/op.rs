//! Typed transformation operations
//!
//! A `TransformStep` (`{function, params}`) compiles once into a `TransformOp`
//! whose variant carries already-validated parameters. Missing parameters take
//! their defaults; parameters of the wrong shape are a compile error.

use regex::Regex;
use serde_json::{Map, Number, Value};
use tracing::debug;

use super::condition::{Condition, is_empty};
use super::dates::ParsedDate;
use super::error::type_name;
use super::TransformError;

type Params = Map<String, Value>;

/// Capture group selector for `regex_extract`
#[derive(Debug, Clone, PartialEq)]
pub enum GroupRef {
    Index(usize),
    Name(String),
}

#[derive(Debug, Clone)]
pub enum TransformOp {
    Uppercase,
    Lowercase,
    Trim,
    Replace { old: String, new: String },
    Substring { start: Option<i64>, end: Option<i64> },
    Concat { separator: String, has_fields: bool },
    Split { delimiter: String, index: i64 },
    FormatDate { format: String },
    AddDays { days: f64 },
    Multiply { factor: f64 },
    Divide { divisor: f64 },
    Round { decimals: i32 },
    DefaultValue { default: Value },
    MapValue { mapping: Map<String, Value> },
    RegexExtract { pattern: Option<Regex>, group: GroupRef },
    Conditional {
        condition: Condition,
        true_value: Option<Value>,
        false_value: Option<Value>,
    },
}

/// Render a value as text: strings verbatim, everything else as JSON
pub fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Numeric cast: numbers, numeric strings and booleans
pub(crate) fn to_f64(value: &Value) -> Result<f64, TransformError> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| TransformError::NotANumber(n.to_string())),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| TransformError::NotANumber(format!("'{}'", s))),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        other => Err(TransformError::NotANumber(type_name(other).to_string())),
    }
}

fn float(n: f64) -> Result<Value, TransformError> {
    Number::from_f64(n).map(Value::Number).ok_or(TransformError::NonFinite)
}

/// Look up a parameter; explicit null counts as absent
fn param<'a>(params: &'a Params, name: &str) -> Option<&'a Value> {
    params.get(name).filter(|v| !v.is_null())
}

fn string_param(
    params: &Params,
    function: &'static str,
    name: &'static str,
    default: &str,
) -> Result<String, TransformError> {
    match param(params, name) {
        None => Ok(default.to_string()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(TransformError::invalid(
            function,
            name,
            format!("expected string, got {}", type_name(other)),
        )),
    }
}

fn int_param(params: &Params, function: &'static str, name: &'static str) -> Result<Option<i64>, TransformError> {
    match param(params, name) {
        None => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| TransformError::invalid(function, name, format!("expected integer, got {}", n))),
        Some(other) => Err(TransformError::invalid(
            function,
            name,
            format!("expected integer, got {}", type_name(other)),
        )),
    }
}

/// Numbers only
fn number_param(params: &Params, function: &'static str, name: &'static str, default: f64) -> Result<f64, TransformError> {
    match param(params, name) {
        None => Ok(default),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| TransformError::invalid(function, name, "not representable as a float")),
        Some(other) => Err(TransformError::invalid(
            function,
            name,
            format!("expected number, got {}", type_name(other)),
        )),
    }
}

/// Numbers or numeric strings, like the value cast
fn castable_param(
    params: &Params,
    function: &'static str,
    name: &'static str,
    default: f64,
) -> Result<f64, TransformError> {
    match param(params, name) {
        None => Ok(default),
        Some(v) => to_f64(v).map_err(|e| TransformError::invalid(function, name, e.to_string())),
    }
}

impl TransformOp {
    pub(crate) fn uppercase(_: &Params) -> Result<Self, TransformError> {
        Ok(Self::Uppercase)
    }

    pub(crate) fn lowercase(_: &Params) -> Result<Self, TransformError> {
        Ok(Self::Lowercase)
    }

    pub(crate) fn trim(_: &Params) -> Result<Self, TransformError> {
        Ok(Self::Trim)
    }

    pub(crate) fn replace(params: &Params) -> Result<Self, TransformError> {
        Ok(Self::Replace {
            old: string_param(params, "replace", "old", "")?,
            new: string_param(params, "replace", "new", "")?,
        })
    }

    pub(crate) fn substring(params: &Params) -> Result<Self, TransformError> {
        Ok(Self::Substring {
            start: int_param(params, "substring", "start")?,
            end: int_param(params, "substring", "end")?,
        })
    }

    pub(crate) fn concat(params: &Params) -> Result<Self, TransformError> {
        let has_fields = matches!(param(params, "fields"), Some(Value::Array(fields)) if !fields.is_empty());
        Ok(Self::Concat {
            separator: string_param(params, "concat", "separator", "")?,
            has_fields,
        })
    }

    pub(crate) fn split(params: &Params) -> Result<Self, TransformError> {
        let delimiter = string_param(params, "split", "delimiter", ",")?;
        if delimiter.is_empty() {
            return Err(TransformError::invalid("split", "delimiter", "must not be empty"));
        }
        Ok(Self::Split {
            delimiter,
            index: int_param(params, "split", "index")?.unwrap_or(0),
        })
    }

    pub(crate) fn format_date(params: &Params) -> Result<Self, TransformError> {
        Ok(Self::FormatDate {
            format: string_param(params, "format_date", "format", "%Y-%m-%d")?,
        })
    }

    pub(crate) fn add_days(params: &Params) -> Result<Self, TransformError> {
        Ok(Self::AddDays {
            days: number_param(params, "add_days", "days", 0.0)?,
        })
    }

    pub(crate) fn multiply(params: &Params) -> Result<Self, TransformError> {
        Ok(Self::Multiply {
            factor: castable_param(params, "multiply", "factor", 1.0)?,
        })
    }

    pub(crate) fn divide(params: &Params) -> Result<Self, TransformError> {
        Ok(Self::Divide {
            divisor: castable_param(params, "divide", "divisor", 1.0)?,
        })
    }

    pub(crate) fn round(params: &Params) -> Result<Self, TransformError> {
        let decimals = int_param(params, "round", "decimals")?.unwrap_or(0);
        let decimals = i32::try_from(decimals)
            .map_err(|_| TransformError::invalid("round", "decimals", format!("{} is out of range", decimals)))?;
        Ok(Self::Round { decimals })
    }

    pub(crate) fn default_value(params: &Params) -> Result<Self, TransformError> {
        let default = match params.get("default") {
            Some(v) => v.clone(),
            None => Value::String(String::new()),
        };
        Ok(Self::DefaultValue { default })
    }

    pub(crate) fn map_value(params: &Params) -> Result<Self, TransformError> {
        match param(params, "mapping") {
            None => Ok(Self::MapValue { mapping: Map::new() }),
            Some(Value::Object(mapping)) => Ok(Self::MapValue {
                mapping: mapping.clone(),
            }),
            Some(other) => Err(TransformError::invalid(
                "map_value",
                "mapping",
                format!("expected object, got {}", type_name(other)),
            )),
        }
    }

    pub(crate) fn regex_extract(params: &Params) -> Result<Self, TransformError> {
        let raw = string_param(params, "regex_extract", "pattern", "")?;
        let pattern = if raw.is_empty() {
            None
        } else {
            let re = Regex::new(&raw).map_err(|e| TransformError::invalid("regex_extract", "pattern", e.to_string()))?;
            Some(re)
        };
        let group = match param(params, "group") {
            None => GroupRef::Index(0),
            Some(Value::String(name)) => GroupRef::Name(name.clone()),
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|i| usize::try_from(i).ok())
                .map(GroupRef::Index)
                .ok_or_else(|| TransformError::invalid("regex_extract", "group", format!("bad group index {}", n)))?,
            Some(other) => {
                return Err(TransformError::invalid(
                    "regex_extract",
                    "group",
                    format!("expected integer or name, got {}", type_name(other)),
                ));
            }
        };
        Ok(Self::RegexExtract { pattern, group })
    }

    pub(crate) fn conditional(params: &Params) -> Result<Self, TransformError> {
        Ok(Self::Conditional {
            condition: Condition::parse(params.get("condition").unwrap_or(&Value::Null)),
            true_value: params.get("true_value").cloned(),
            false_value: params.get("false_value").cloned(),
        })
    }

    /// Registry name of this operation
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uppercase => "uppercase",
            Self::Lowercase => "lowercase",
            Self::Trim => "trim",
            Self::Replace { .. } => "replace",
            Self::Substring { .. } => "substring",
            Self::Concat { .. } => "concat",
            Self::Split { .. } => "split",
            Self::FormatDate { .. } => "format_date",
            Self::AddDays { .. } => "add_days",
            Self::Multiply { .. } => "multiply",
            Self::Divide { .. } => "divide",
            Self::Round { .. } => "round",
            Self::DefaultValue { .. } => "default_value",
            Self::MapValue { .. } => "map_value",
            Self::RegexExtract { .. } => "regex_extract",
            Self::Conditional { .. } => "conditional",
        }
    }

    /// Apply to one value
    ///
    /// Errors are for the caller to absorb; see `engine::apply_step`.
    pub fn apply(&self, value: &Value) -> Result<Value, TransformError> {
        debug!(op = %self.name(), "TransformOp::apply: called");
        if value.is_null() && self.skips_null() {
            return Ok(Value::Null);
        }

        match self {
            Self::Uppercase => Ok(Value::String(text(value).to_uppercase())),
            Self::Lowercase => Ok(Value::String(text(value).to_lowercase())),
            Self::Trim => Ok(Value::String(text(value).trim().to_string())),
            Self::Replace { old, new } => Ok(Value::String(text(value).replace(old.as_str(), new))),
            Self::Substring { start, end } => Ok(Value::String(slice(&text(value), *start, *end))),
            Self::Concat { has_fields, .. } => match value {
                Value::Null if *has_fields => Ok(Value::String(String::new())),
                Value::Null => Ok(Value::Null),
                other => Ok(Value::String(text(other))),
            },
            Self::Split { delimiter, index } => {
                let s = text(value);
                let part = usize::try_from(*index).ok().and_then(|i| s.split(delimiter.as_str()).nth(i));
                match part {
                    Some(part) => Ok(Value::String(part.trim().to_string())),
                    None => Ok(value.clone()),
                }
            }
            Self::FormatDate { format } => match value {
                Value::String(s) => ParsedDate::parse(s)?.format(format).map(Value::String),
                other => Ok(other.clone()),
            },
            Self::AddDays { days } => match value {
                Value::String(s) => Ok(Value::String(ParsedDate::parse(s)?.add_days(*days)?.to_iso())),
                other => Ok(other.clone()),
            },
            Self::Multiply { factor } => float(to_f64(value)? * factor),
            Self::Divide { divisor } => {
                if *divisor == 0.0 {
                    return Err(TransformError::DivisionByZero);
                }
                float(to_f64(value)? / divisor)
            }
            Self::Round { decimals } => float(round_half_even(to_f64(value)?, *decimals)),
            Self::DefaultValue { default } => {
                if is_empty(value) {
                    Ok(default.clone())
                } else {
                    Ok(value.clone())
                }
            }
            Self::MapValue { mapping } => Ok(mapping.get(&text(value)).unwrap_or(value).clone()),
            Self::RegexExtract { pattern, group } => {
                let Some(re) = pattern else {
                    return Ok(value.clone());
                };
                let haystack = text(value);
                let Some(caps) = re.captures(&haystack) else {
                    return Ok(value.clone());
                };
                let found = match group {
                    GroupRef::Index(i) if *i < caps.len() => caps.get(*i),
                    GroupRef::Name(name) if re.capture_names().flatten().any(|n| n == name.as_str()) => caps.name(name),
                    GroupRef::Index(i) => return Err(TransformError::NoSuchGroup(i.to_string())),
                    GroupRef::Name(name) => return Err(TransformError::NoSuchGroup(name.clone())),
                };
                Ok(found.map_or(Value::Null, |m| Value::String(m.as_str().to_string())))
            }
            Self::Conditional {
                condition,
                true_value,
                false_value,
            } => {
                let chosen = if condition.evaluate(value) { true_value } else { false_value };
                Ok(chosen.as_ref().unwrap_or(value).clone())
            }
        }
    }

    /// Operations that leave null untouched
    fn skips_null(&self) -> bool {
        !matches!(
            self,
            Self::Concat { .. } | Self::DefaultValue { .. } | Self::Conditional { .. }
        )
    }
}

/// Character slice with negative indices from the end and clamping
fn slice(s: &str, start: Option<i64>, end: Option<i64>) -> String {
    let len = s.chars().count() as i64;
    let resolve = |i: i64| if i < 0 { (len + i).max(0) } else { i.min(len) };
    let from = start.map_or(0, resolve);
    let to = end.map_or(len, resolve);
    if from >= to {
        return String::new();
    }
    s.chars().skip(from as usize).take((to - from) as usize).collect()
}

fn round_half_even(x: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals.saturating_abs());
    if decimals >= 0 {
        let scaled = x * scale;
        if !scaled.is_finite() {
            return x;
        }
        scaled.round_ties_even() / scale
    } else {
        if !scale.is_finite() {
            return 0.0f64.copysign(x);
        }
        (x / scale).round_ties_even() * scale
    }
}
