//! Core data models for data quality calculation.
//!
//! This module defines the dataset and resource descriptors consumed by the
//! engine, the per-dimension result detail, and the persisted metrics record.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{DqError, Result};
use crate::formats::parse_timestamp;

/// Kind of entity a metrics record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// A single tabular resource
    Resource,
    /// A dataset (package) aggregating its resources
    Package,
}

impl EntityType {
    /// Returns the persisted name of the entity type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Resource => "resource",
            EntityType::Package => "package",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = DqError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "resource" => Ok(EntityType::Resource),
            "package" | "dataset" => Ok(EntityType::Package),
            other => Err(DqError::configuration(format!(
                "Invalid entity type '{}'. Valid types are: resource, package",
                other
            ))),
        }
    }
}

/// One of the six data quality dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    /// Share of populated cells
    Completeness,
    /// Share of distinct values per column
    Uniqueness,
    /// Average delay between measurement and ingestion
    Timeliness,
    /// Share of rows passing table validation
    Validity,
    /// Share of rows flagged accurate
    Accuracy,
    /// Share of values matching the dominant format of their column
    Consistency,
}

impl Dimension {
    /// All dimensions in calculation order.
    pub const ALL: [Dimension; 6] = [
        Dimension::Completeness,
        Dimension::Uniqueness,
        Dimension::Timeliness,
        Dimension::Validity,
        Dimension::Accuracy,
        Dimension::Consistency,
    ];

    /// Returns the stable name used as key in metrics maps.
    pub fn name(&self) -> &'static str {
        match self {
            Dimension::Completeness => "completeness",
            Dimension::Uniqueness => "uniqueness",
            Dimension::Timeliness => "timeliness",
            Dimension::Validity => "validity",
            Dimension::Accuracy => "accuracy",
            Dimension::Consistency => "consistency",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dimension {
    type Err = DqError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_lowercase();
        Dimension::ALL
            .iter()
            .copied()
            .find(|d| d.name() == lower)
            .ok_or_else(|| {
                DqError::configuration(format!(
                    "Invalid dimension '{}'. Valid dimensions are: {}",
                    s,
                    Dimension::ALL
                        .iter()
                        .map(Dimension::name)
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }
}

/// Per-dimension settings extracted from `dq_<dimension>_<key>` resource fields.
pub type DimensionSettings = BTreeMap<Dimension, Map<String, Value>>;

/// Resource descriptor as provided by the dataset catalog.
///
/// Only the fields the engine reads are typed; every other key of the
/// descriptor is preserved in `extra`, which is also where the flattened
/// `dq_<dimension>_<key>` settings live.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource id
    pub id: String,
    /// Owning dataset id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<String>,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Location of the resource data (URL or local path)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// `upload` when the data lives in local storage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_type: Option<String>,
    /// Declared data format (csv, xlsx, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Optional table schema (JSON string or object)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    /// ISO-8601 timestamp of the last data change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    /// ISO-8601 creation timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    /// Every other descriptor field
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Resource {
    /// Creates a resource descriptor with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Builder method to set the last modified timestamp.
    pub fn with_last_modified(mut self, last_modified: impl Into<String>) -> Self {
        self.last_modified = Some(last_modified.into());
        self
    }

    /// Builder method to set a flattened descriptor field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Extracts the per-dimension settings from `dq_<dimension>_<key>` fields.
    pub fn data_quality_settings(&self) -> DimensionSettings {
        let mut settings = DimensionSettings::new();
        for dimension in Dimension::ALL {
            let prefix = format!("dq_{}_", dimension.name());
            for (key, value) in &self.extra {
                if let Some(setting) = key.strip_prefix(&prefix)
                    && !setting.is_empty()
                {
                    settings
                        .entry(dimension)
                        .or_default()
                        .insert(setting.to_string(), value.clone());
                }
            }
        }
        settings
    }

    /// Returns a non-blank string setting for a dimension, if configured.
    pub fn setting(&self, dimension: Dimension, key: &str) -> Option<String> {
        let value = self
            .extra
            .get(&format!("dq_{}_{}", dimension.name(), key))?;
        let text = match value {
            Value::Null => return None,
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        };
        if text.is_empty() { None } else { Some(text) }
    }

    /// Parses `last_modified`, falling back to `created`.
    ///
    /// # Errors
    /// Returns a configuration error when neither timestamp is present or
    /// parseable.
    pub fn last_modified_at(&self) -> Result<NaiveDateTime> {
        let raw = self
            .last_modified
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.created.as_deref().filter(|s| !s.trim().is_empty()))
            .ok_or_else(|| {
                DqError::configuration(format!(
                    "Resource {} has neither last_modified nor created timestamp",
                    self.id
                ))
            })?;
        parse_timestamp(raw).ok_or_else(|| {
            DqError::configuration(format!(
                "Resource {} has an invalid timestamp '{}'",
                self.id, raw
            ))
        })
    }
}

/// Dataset descriptor with its resources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Dataset id
    #[serde(default)]
    pub id: String,
    /// Resources in dataset order
    #[serde(default)]
    pub resources: Vec<Resource>,
}

/// Result detail of one dimension for one resource or dataset.
///
/// The detail always carries `value` on success plus dimension-specific
/// counters; failed calculations carry `failed: true` and `error`; manual
/// overrides carry `manual: true`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DimensionResult(Map<String, Value>);

impl DimensionResult {
    /// Creates an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a failed result with the given error message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self::new()
            .with("failed", true)
            .with("error", error.into())
    }

    /// Builder method to set an entry.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Sets an entry in place.
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Returns an entry.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns the score value, if present and not null.
    pub fn value(&self) -> Option<&Value> {
        self.0.get("value").filter(|v| !v.is_null())
    }

    /// Returns true when the calculation failed.
    pub fn is_failed(&self) -> bool {
        self.flag("failed")
    }

    /// Returns true when the detail was set by a manual override.
    pub fn is_manual(&self) -> bool {
        self.flag("manual")
    }

    /// Returns the failure message, if any.
    pub fn error(&self) -> Option<&str> {
        self.0.get("error").and_then(Value::as_str)
    }

    /// Returns a counter; missing or non-numeric entries contribute 0.
    pub fn count(&self, key: &str) -> u64 {
        match self.0.get(key) {
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
                .unwrap_or(0),
            _ => 0,
        }
    }

    /// Returns true when the result has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrows the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Returns the underlying map.
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    fn flag(&self, key: &str) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(false)
    }
}

impl From<Map<String, Value>> for DimensionResult {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Results keyed by dimension name.
pub type DimensionResults = BTreeMap<String, DimensionResult>;

/// Persisted metrics for one resource or dataset.
///
/// Exactly one record exists per `(entity_type, ref_id)`; the store assigns
/// `id` on first save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    /// Record id, assigned by the store
    pub id: Option<Uuid>,
    /// Entity kind
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Resource or dataset id
    pub ref_id: String,
    /// Resource modification time the metrics were calculated for
    pub resource_last_modified: Option<NaiveDateTime>,
    /// Completeness score (0-100)
    pub completeness: Option<f64>,
    /// Uniqueness score (0-100)
    pub uniqueness: Option<f64>,
    /// Formatted average delay, e.g. `+1 day, 2:00:00`
    pub timeliness: Option<String>,
    /// Validity score (0-100)
    pub validity: Option<f64>,
    /// Accuracy score (0-100)
    pub accuracy: Option<f64>,
    /// Consistency score (0-100)
    pub consistency: Option<f64>,
    /// Detail per dimension name
    pub metrics: DimensionResults,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub modified_at: DateTime<Utc>,
}

impl MetricsRecord {
    /// Creates an empty, unsaved record.
    pub fn new(entity_type: EntityType, ref_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            entity_type,
            ref_id: ref_id.into(),
            resource_last_modified: None,
            completeness: None,
            uniqueness: None,
            timeliness: None,
            validity: None,
            accuracy: None,
            consistency: None,
            metrics: DimensionResults::new(),
            created_at: now,
            modified_at: now,
        }
    }

    /// Returns the scalar value of a dimension as JSON.
    pub fn scalar(&self, dimension: Dimension) -> Option<Value> {
        match dimension {
            Dimension::Timeliness => self.timeliness.clone().map(Value::String),
            other => self.float_slot(other).map(Value::from),
        }
    }

    /// Sets the scalar of a dimension from a result value.
    ///
    /// Timeliness keeps the value's string form; the other dimensions accept
    /// numbers (or numeric strings) and ignore anything else.
    pub fn set_scalar(&mut self, dimension: Dimension, value: &Value) {
        match dimension {
            Dimension::Timeliness => {
                self.timeliness = Some(match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                });
            }
            other => {
                let number = match value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                };
                if let (Some(number), Some(slot)) = (number, self.float_slot_mut(other)) {
                    *slot = Some(number);
                }
            }
        }
    }

    /// Clears the scalar of a dimension.
    pub fn clear_scalar(&mut self, dimension: Dimension) {
        match dimension {
            Dimension::Timeliness => self.timeliness = None,
            other => {
                if let Some(slot) = self.float_slot_mut(other) {
                    *slot = None;
                }
            }
        }
    }

    /// Drops every calculated detail and its scalar. Manual overrides stay.
    pub fn discard_calculated(&mut self) {
        self.metrics.retain(|_, detail| detail.is_manual());
        for dimension in Dimension::ALL {
            if !self.metrics.contains_key(dimension.name()) {
                self.clear_scalar(dimension);
            }
        }
    }

    /// Replaces the metrics map and updates scalars from every result that
    /// carries a value and did not fail.
    pub fn apply_results(&mut self, results: DimensionResults) {
        for (name, result) in &results {
            let Ok(dimension) = name.parse::<Dimension>() else {
                continue;
            };
            if result.is_failed() {
                continue;
            }
            if let Some(value) = result.value() {
                self.set_scalar(dimension, value);
            }
        }
        self.metrics = results;
    }

    fn float_slot(&self, dimension: Dimension) -> Option<f64> {
        match dimension {
            Dimension::Completeness => self.completeness,
            Dimension::Uniqueness => self.uniqueness,
            Dimension::Validity => self.validity,
            Dimension::Accuracy => self.accuracy,
            Dimension::Consistency => self.consistency,
            Dimension::Timeliness => None,
        }
    }

    fn float_slot_mut(&mut self, dimension: Dimension) -> Option<&mut Option<f64>> {
        match dimension {
            Dimension::Completeness => Some(&mut self.completeness),
            Dimension::Uniqueness => Some(&mut self.uniqueness),
            Dimension::Validity => Some(&mut self.validity),
            Dimension::Accuracy => Some(&mut self.accuracy),
            Dimension::Consistency => Some(&mut self.consistency),
            Dimension::Timeliness => None,
        }
    }
}
