//! MappingSpec domain type
//!
//! A MappingSpec is the declarative correspondence between a source schema and a
//! destination schema: which source field feeds each destination field, and
//! which transformation steps run on each field afterwards.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Where a destination field takes its value from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldSource {
    /// Plain rename: `"dest": "source_field"`
    Field(String),
    /// `"dest": {"source": "field", "default": ...}`
    WithDefault { source: Option<String>, default: Value },
    /// Anything else: copy `dest` verbatim if the source record carries it
    PassThrough(Value),
}

impl FieldSource {
    /// Source field name this entry reads from, if any
    pub fn source_field(&self) -> Option<&str> {
        match self {
            Self::Field(name) => Some(name),
            Self::WithDefault { source, .. } => source.as_deref(),
            Self::PassThrough(_) => None,
        }
    }
}

impl From<Value> for FieldSource {
    fn from(raw: Value) -> Self {
        match raw {
            Value::String(name) => Self::Field(name),
            Value::Object(mut obj) => Self::WithDefault {
                source: obj.get("source").and_then(Value::as_str).map(str::to_string),
                default: obj.remove("default").unwrap_or(Value::Null),
            },
            other => Self::PassThrough(other),
        }
    }
}

impl<'de> Deserialize<'de> for FieldSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from)
    }
}

/// Ordered destination field -> source mapping
pub type MappingConfig = IndexMap<String, FieldSource>;

/// One named, parameterized value transformation applied to a single field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformStep {
    /// Registry function name
    pub function: String,

    /// Function parameters; unknown keys are ignored
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
}

impl TransformStep {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            params: Map::new(),
        }
    }

    /// Builder method to add a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Ordered field -> transformation chain
///
/// Deserialization is lenient: entries that are not lists and steps that are not
/// objects with a string `function` are dropped. `transform::validate` reports
/// those shapes against the raw JSON instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TransformRules(IndexMap<String, Vec<TransformStep>>);

impl TransformRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw JSON, skipping malformed entries
    pub fn from_value(raw: &Value) -> Self {
        debug!("TransformRules::from_value: called");
        let mut rules = IndexMap::new();
        let Some(fields) = raw.as_object() else {
            debug!("TransformRules::from_value: not an object, no rules");
            return Self(rules);
        };

        for (field, steps) in fields {
            let Some(steps) = steps.as_array() else {
                debug!(%field, "TransformRules::from_value: rules not a list, skipping field");
                continue;
            };
            let parsed: Vec<TransformStep> = steps
                .iter()
                .filter_map(|step| serde_json::from_value(step.clone()).ok())
                .collect();
            rules.insert(field.clone(), parsed);
        }

        Self(rules)
    }

    /// Builder method to append a step to a field's chain
    pub fn with_step(mut self, field: impl Into<String>, step: TransformStep) -> Self {
        self.0.entry(field.into()).or_default().push(step);
        self
    }

    pub fn get(&self, field: &str) -> Option<&[TransformStep]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<TransformStep>)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<'de> Deserialize<'de> for TransformRules {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&raw))
    }
}

/// Flattened per-field view of a MappingSpec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    pub destination_field: String,

    #[serde(default)]
    pub source_field: Option<String>,

    #[serde(default)]
    pub default_value: Value,

    #[serde(default)]
    pub transformations: Vec<TransformStep>,
}

impl FieldRule {
    pub fn new(destination_field: impl Into<String>, source_field: impl Into<String>) -> Self {
        Self {
            destination_field: destination_field.into(),
            source_field: Some(source_field.into()),
            default_value: Value::Null,
            transformations: Vec::new(),
        }
    }

    /// A rule that always yields `default_value`
    pub fn constant(destination_field: impl Into<String>, default_value: impl Into<Value>) -> Self {
        Self {
            destination_field: destination_field.into(),
            source_field: None,
            default_value: default_value.into(),
            transformations: Vec::new(),
        }
    }

    pub fn with_default(mut self, default_value: impl Into<Value>) -> Self {
        self.default_value = default_value.into();
        self
    }

    pub fn with_transformation(mut self, step: TransformStep) -> Self {
        self.transformations.push(step);
        self
    }
}

/// Errors building a MappingSpec
#[derive(Debug, Error, PartialEq)]
pub enum MappingSpecError {
    #[error("Duplicate destination field: {0}")]
    DuplicateDestination(String),
}

/// Field mapping between a source and a destination schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingSpec {
    pub id: String,

    #[serde(default)]
    pub name: String,

    pub source_id: String,

    pub destination_id: String,

    #[serde(default)]
    pub mapping_config: MappingConfig,

    #[serde(default)]
    pub transformation_rules: TransformRules,
}

impl MappingSpec {
    pub fn new(id: impl Into<String>, source_id: impl Into<String>, destination_id: impl Into<String>) -> Self {
        let id = id.into();
        debug!(%id, "MappingSpec::new: called");
        Self {
            name: id.clone(),
            id,
            source_id: source_id.into(),
            destination_id: destination_id.into(),
            mapping_config: MappingConfig::new(),
            transformation_rules: TransformRules::new(),
        }
    }

    /// Builder method to map a destination field from a source field
    pub fn with_field(mut self, destination: impl Into<String>, source: impl Into<String>) -> Self {
        self.mapping_config
            .insert(destination.into(), FieldSource::Field(source.into()));
        self
    }

    /// Builder method to set the transformation rules
    pub fn with_rules(mut self, rules: TransformRules) -> Self {
        self.transformation_rules = rules;
        self
    }

    /// Build the two wire maps from a FieldRule list
    pub fn from_field_rules(
        id: impl Into<String>,
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
        rules: Vec<FieldRule>,
    ) -> Result<Self, MappingSpecError> {
        let mut spec = Self::new(id, source_id, destination_id);
        debug!(id = %spec.id, rule_count = rules.len(), "MappingSpec::from_field_rules: called");

        for rule in rules {
            if spec.mapping_config.contains_key(&rule.destination_field) {
                return Err(MappingSpecError::DuplicateDestination(rule.destination_field));
            }
            let source = match (rule.source_field, rule.default_value) {
                (Some(source), Value::Null) => FieldSource::Field(source),
                (source, default) => FieldSource::WithDefault { source, default },
            };
            if !rule.transformations.is_empty() {
                spec.transformation_rules.0.insert(rule.destination_field.clone(), rule.transformations);
            }
            spec.mapping_config.insert(rule.destination_field, source);
        }

        Ok(spec)
    }

    /// Project the mapping into one FieldRule per destination field
    ///
    /// Transformation chains on fields that are not mapping destinations are
    /// appended as source-less rules.
    pub fn field_rules(&self) -> Vec<FieldRule> {
        debug!(id = %self.id, "MappingSpec::field_rules: called");
        let mut rules: Vec<FieldRule> = self
            .mapping_config
            .iter()
            .map(|(dest, source)| {
                let (source_field, default_value) = match source {
                    FieldSource::Field(name) => (Some(name.clone()), Value::Null),
                    FieldSource::WithDefault { source, default } => (source.clone(), default.clone()),
                    FieldSource::PassThrough(_) => (Some(dest.clone()), Value::Null),
                };
                FieldRule {
                    destination_field: dest.clone(),
                    source_field,
                    default_value,
                    transformations: self.transformation_rules.get(dest).map(<[_]>::to_vec).unwrap_or_default(),
                }
            })
            .collect();

        for (field, steps) in self.transformation_rules.iter() {
            if !self.mapping_config.contains_key(field) {
                rules.push(FieldRule {
                    destination_field: field.clone(),
                    source_field: None,
                    default_value: Value::Null,
                    transformations: steps.clone(),
                });
            }
        }

        rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_source_untagged_forms() {
        let config: MappingConfig = serde_json::from_value(json!({
            "full_name": "name",
            "country": {"source": "country_code", "default": "US"},
            "id": null
        }))
        .unwrap();

        assert_eq!(config["full_name"], FieldSource::Field("name".to_string()));
        assert_eq!(
            config["country"],
            FieldSource::WithDefault {
                source: Some("country_code".to_string()),
                default: json!("US"),
            }
        );
        assert_eq!(config["id"], FieldSource::PassThrough(Value::Null));
    }

    #[test]
    fn test_mapping_config_keeps_order() {
        let config: MappingConfig = serde_json::from_value(json!({"z": "a", "a": "b", "m": "c"})).unwrap();
        let keys: Vec<&String> = config.keys().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_transform_rules_lenient_parse() {
        let rules = TransformRules::from_value(&json!({
            "name": [{"function": "trim"}, "bogus", {"params": {}}],
            "age": "not-a-list",
            "email": [{"function": "lowercase", "params": {"extra": 1}}]
        }));

        assert_eq!(rules.len(), 2);
        assert_eq!(rules.get("name").unwrap(), &[TransformStep::new("trim")]);
        assert!(rules.get("age").is_none());
        assert_eq!(rules.get("email").unwrap()[0].params["extra"], json!(1));
    }

    #[test]
    fn test_transform_rules_non_object() {
        assert!(TransformRules::from_value(&json!([1, 2])).is_empty());
    }

    #[test]
    fn test_mapping_spec_deserialize() {
        let spec: MappingSpec = serde_json::from_value(json!({
            "id": "m1",
            "source_id": "crm",
            "destination_id": "warehouse",
            "mapping_config": {"email": "Email"},
            "transformation_rules": {"email": [{"function": "lowercase"}]}
        }))
        .unwrap();

        assert_eq!(spec.source_id, "crm");
        assert_eq!(spec.mapping_config.len(), 1);
        assert_eq!(spec.transformation_rules.get("email").unwrap().len(), 1);
    }

    #[test]
    fn test_from_field_rules_rejects_duplicates() {
        let result = MappingSpec::from_field_rules(
            "m1",
            "s",
            "d",
            vec![FieldRule::new("email", "Email"), FieldRule::new("email", "mail")],
        );
        assert_eq!(result, Err(MappingSpecError::DuplicateDestination("email".to_string())));
    }

    #[test]
    fn test_field_rules_round_trip() {
        let rules = vec![
            FieldRule::new("email", "Email").with_transformation(TransformStep::new("lowercase")),
            FieldRule::new("country", "cc").with_default("US"),
            FieldRule::constant("origin", "crm"),
        ];
        let spec = MappingSpec::from_field_rules("m1", "s", "d", rules.clone()).unwrap();

        assert_eq!(spec.mapping_config["email"], FieldSource::Field("Email".to_string()));
        assert_eq!(
            spec.mapping_config["origin"],
            FieldSource::WithDefault {
                source: None,
                default: json!("crm"),
            }
        );
        assert_eq!(spec.field_rules(), rules);
    }

    #[test]
    fn test_field_rules_includes_transform_only_fields() {
        let spec = MappingSpec::new("m1", "s", "d")
            .with_field("email", "Email")
            .with_rules(TransformRules::new().with_step("status", TransformStep::new("default_value")));

        let rules = spec.field_rules();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].destination_field, "status");
        assert!(rules[1].source_field.is_none());
    }
}
