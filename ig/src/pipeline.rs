//! Pipeline files consumed by the `ig` binary
//!
//! A pipeline names one source, one destination and the mapping between them:
//!
//! ```yaml
//! name: customers
//! source:
//!   type: file
//!   path: customers.json
//! destination:
//!   type: file
//!   path: out/customers.jsonl
//!   mode: overwrite
//! mapping_config:
//!   full_name: name
//!   country: { source: country_code, default: US }
//! transformation_rules:
//!   full_name:
//!     - function: trim
//!     - function: uppercase
//! ```
//!
//! YAML or JSON; relative connector paths resolve against the pipeline file's
//! directory.

use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::catalog::StaticCatalog;
use crate::connector::ConnectorConfig;
use crate::domain::{MappingConfig, MappingSpec, TransformRules};
use crate::transform::{self, ValidationReport};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    /// Defaults to the file stem
    #[serde(default)]
    pub name: String,

    pub source: ConnectorConfig,

    pub destination: ConnectorConfig,

    #[serde(default, alias = "mapping-config")]
    pub mapping_config: MappingConfig,

    /// Kept raw so malformed rules can be reported by `validate_rules`
    #[serde(default, alias = "transformation-rules")]
    pub transformation_rules: Value,

    #[serde(skip)]
    base_dir: PathBuf,
}

impl Pipeline {
    /// Load a pipeline file (`.json` parsed as JSON, anything else as YAML)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Pipeline::load: called");
        let content =
            std::fs::read_to_string(path).context(format!("Failed to read pipeline file {}", path.display()))?;

        let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let mut pipeline: Self = if is_json {
            serde_json::from_str(&content).context(format!("Failed to parse pipeline file {}", path.display()))?
        } else {
            serde_yaml::from_str(&content).context(format!("Failed to parse pipeline file {}", path.display()))?
        };

        if pipeline.name.is_empty() {
            pipeline.name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "pipeline".to_string());
        }
        pipeline.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        info!(name = %pipeline.name, path = %path.display(), "Pipeline loaded");
        Ok(pipeline)
    }

    /// Mapping id under which the pipeline registers its MappingSpec
    pub fn mapping_id(&self) -> &str {
        &self.name
    }

    pub fn source_id(&self) -> String {
        format!("{}-source", self.name)
    }

    pub fn destination_id(&self) -> String {
        format!("{}-destination", self.name)
    }

    /// Check the transformation rules without running anything
    pub fn validate_rules(&self) -> ValidationReport {
        debug!(name = %self.name, "Pipeline::validate_rules: called");
        if self.transformation_rules.is_null() {
            return transform::validate(&Value::Object(Default::default()));
        }
        transform::validate(&self.transformation_rules)
    }

    pub fn mapping_spec(&self) -> MappingSpec {
        let mut spec = MappingSpec::new(self.mapping_id(), self.source_id(), self.destination_id())
            .with_rules(TransformRules::from_value(&self.transformation_rules));
        spec.mapping_config = self.mapping_config.clone();
        spec
    }

    /// Catalog holding this pipeline's mapping and connectors
    pub async fn catalog(&self, http_timeout_ms: u64) -> Result<StaticCatalog> {
        debug!(name = %self.name, "Pipeline::catalog: called");
        let source = self
            .source
            .build_source(&self.base_dir, http_timeout_ms)
            .context(format!("Failed to build {} source", self.source.kind()))?;
        let destination = self
            .destination
            .build_destination(&self.base_dir, http_timeout_ms)
            .context(format!("Failed to build {} destination", self.destination.kind()))?;

        let catalog = StaticCatalog::new();
        catalog.insert_mapping(self.mapping_spec()).await;
        catalog.insert_source(self.source_id(), source).await;
        catalog.insert_destination(self.destination_id(), destination).await;
        Ok(catalog)
    }
}
