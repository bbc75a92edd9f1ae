//! Function registry
//!
//! The built-in transformation functions, in registration order. Each entry
//! declares the parameter names validation checks for and owns the builder
//! that compiles raw params into a typed `TransformOp`.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::{TransformError, TransformOp};

type Builder = fn(&Map<String, Value>) -> Result<TransformOp, TransformError>;

/// One registered transformation function
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// Parameters validation expects; all have defaults at execution time
    pub params: &'static [&'static str],
    #[serde(skip)]
    build: Builder,
}

impl FunctionSpec {
    /// Compile raw params into a typed operation
    pub fn compile(&self, params: &Map<String, Value>) -> Result<TransformOp, TransformError> {
        debug!(function = %self.name, "FunctionSpec::compile: called");
        (self.build)(params)
    }
}

const fn spec(
    name: &'static str,
    description: &'static str,
    params: &'static [&'static str],
    build: Builder,
) -> FunctionSpec {
    FunctionSpec {
        name,
        description,
        params,
        build,
    }
}

static FUNCTIONS: &[FunctionSpec] = &[
    spec("uppercase", "Convert string to uppercase", &[], TransformOp::uppercase),
    spec("lowercase", "Convert string to lowercase", &[], TransformOp::lowercase),
    spec("trim", "Remove leading and trailing whitespace", &[], TransformOp::trim),
    spec("replace", "Replace substring", &["old", "new"], TransformOp::replace),
    spec("substring", "Extract substring", &["start", "end"], TransformOp::substring),
    spec("concat", "Concatenate strings", &["separator"], TransformOp::concat),
    spec("split", "Split string by delimiter", &["delimiter", "index"], TransformOp::split),
    spec("format_date", "Format date", &["format"], TransformOp::format_date),
    spec("add_days", "Add days to date", &["days"], TransformOp::add_days),
    spec("multiply", "Multiply number", &["factor"], TransformOp::multiply),
    spec("divide", "Divide number", &["divisor"], TransformOp::divide),
    spec("round", "Round number", &["decimals"], TransformOp::round),
    spec("default_value", "Set default value if empty", &["default"], TransformOp::default_value),
    spec("map_value", "Map value using dictionary", &["mapping"], TransformOp::map_value),
    spec("regex_extract", "Extract using regex", &["pattern", "group"], TransformOp::regex_extract),
    spec(
        "conditional",
        "Conditional transformation",
        &["condition", "true_value", "false_value"],
        TransformOp::conditional,
    ),
];

/// All registered functions, in registration order
pub fn list_functions() -> &'static [FunctionSpec] {
    FUNCTIONS
}

/// Find a function by name
pub fn lookup(name: &str) -> Option<&'static FunctionSpec> {
    FUNCTIONS.iter().find(|f| f.name == name)
}

/// Compile a named step, failing for unknown functions
pub fn compile(function: &str, params: &Map<String, Value>) -> Result<TransformOp, TransformError> {
    lookup(function)
        .ok_or_else(|| TransformError::UnknownFunction(function.to_string()))?
        .compile(params)
}
