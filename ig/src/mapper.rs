//! Field mapping applier
//!
//! Reshapes a source record into a destination record following a
//! `MappingConfig`. With a non-empty config the output carries exactly the
//! declared destination fields, minus pass-throughs the source lacks.

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::domain::{FieldSource, MappingConfig, Record};
use crate::transform::type_name;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("Record {index} must be an object, got {kind}")]
    NotAnObject { index: usize, kind: &'static str },
}

/// Map one record
///
/// An empty config returns the record unchanged.
pub fn map_record(record: &Record, config: &MappingConfig) -> Record {
    if config.is_empty() {
        return record.clone();
    }

    let mut mapped = Record::new();
    for (dest, source) in config {
        match source {
            FieldSource::Field(name) => {
                mapped.insert(dest.clone(), record.get(name).cloned().unwrap_or(Value::Null));
            }
            FieldSource::WithDefault { source, default } => {
                let value = source.as_ref().and_then(|name| record.get(name)).unwrap_or(default);
                mapped.insert(dest.clone(), value.clone());
            }
            FieldSource::PassThrough(_) => {
                if let Some(value) = record.get(dest) {
                    mapped.insert(dest.clone(), value.clone());
                }
            }
        }
    }
    mapped
}

/// Map a batch of raw JSON records; any non-object fails the whole batch
pub fn map_records(records: &[Value], config: &MappingConfig) -> Result<Vec<Record>, MappingError> {
    debug!(record_count = records.len(), field_count = config.len(), "map_records: called");
    records
        .iter()
        .enumerate()
        .map(|(index, value)| match value {
            Value::Object(record) => Ok(map_record(record, config)),
            other => Err(MappingError::NotAnObject {
                index,
                kind: type_name(other),
            }),
        })
        .collect()
}
