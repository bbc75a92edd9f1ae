//! Transformation rule engine
//!
//! A registry of named, pure, single-value functions and the machinery to
//! apply ordered chains of them per field. Steps compile once into typed
//! `TransformOp`s; execution never fails a record because of a bad value.

mod condition;
mod dates;
mod engine;
mod error;
mod op;
mod preview;
mod registry;
mod validate;

pub use condition::Condition;
pub use engine::{CompiledRules, CompiledStep, apply, apply_step};
pub use error::TransformError;
pub(crate) use error::type_name;
pub use op::{GroupRef, TransformOp, text};
pub use preview::{PREVIEW_LIMIT, Preview, preview};
pub use registry::{FunctionSpec, compile, list_functions, lookup};
pub use validate::{ValidationReport, validate};
