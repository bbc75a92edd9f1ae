//! Integrator - data-integration execution core
//!
//! Integrator moves records from a source connector to a destination
//! connector: each record is reshaped by a field mapping, its fields run
//! through chains of named transformation functions, and the result is
//! delivered in fixed-size batches by a background job whose progress is
//! persisted after every batch.
//!
//! # Core Concepts
//!
//! - **Never lose a value**: a transformation that cannot apply keeps the
//!   original value
//! - **Batches fail atomically**: one bad record fails its whole batch, other
//!   batches still run
//! - **Jobs complete with failures**: check `records_failed`, not only status
//!
//! # Modules
//!
//! - [`transform`] - Function registry, rule engine, validation and preview
//! - [`mapper`] - Field mapping applier
//! - [`batch`] - Batch processor
//! - [`job`] - Job orchestrator
//! - [`state`] - Job state actor and store
//! - [`connector`] - Source and destination connectors
//! - [`catalog`] - Mapping and connector lookup
//! - [`pipeline`] - Pipeline files
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod batch;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod connector;
pub mod domain;
pub mod job;
pub mod mapper;
pub mod pipeline;
pub mod state;
pub mod transform;

// Re-export commonly used types
pub use batch::{BatchProcessor, BatchSummary};
pub use catalog::{Catalog, StaticCatalog};
pub use config::Config;
pub use connector::{ConnectorError, DestinationWriter, SourceReader};
pub use domain::{FieldRule, Job, JobStatus, JobStatusView, MappingConfig, MappingSpec, Record, TransformRules, TransformStep};
pub use job::{JobError, JobManager, JobTaskResult};
pub use mapper::{map_record, map_records};
pub use state::{StateError, StateManager};
pub use transform::{
    Preview, TransformError, ValidationReport, apply as apply_transformation, list_functions as list_available_functions,
    preview as preview_transformation, validate as validate_transformations,
};
