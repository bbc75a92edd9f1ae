//! Domain types for Integrator
//!
//! Core domain types: MappingSpec (with its FieldRule projection), Job and the
//! Record shape that flows through mapping and transformation.

mod id;
mod job;
mod mapping;

pub use id::generate_id;
pub use job::{INTERRUPTED_MESSAGE, Job, JobStatus, JobStatusView, JobTransition, TransitionError};
pub use mapping::{FieldRule, FieldSource, MappingConfig, MappingSpec, MappingSpecError, TransformRules, TransformStep};

/// One record: field name -> value, insertion order preserved
pub type Record = serde_json::Map<String, serde_json::Value>;
