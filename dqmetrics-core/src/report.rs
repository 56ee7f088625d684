//! Reporting and manual overrides.
//!
//! Reports expose the stored scores of a dataset or resource. Manual
//! overrides replace the calculated detail of a dimension; the engine keeps
//! them until [`reset_manual`] removes them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DqError, Result};
use crate::models::{Dimension, DimensionResult, DimensionResults, EntityType, MetricsRecord};
use crate::store::MetricsStore;

/// Stored data quality of one dataset or resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Completeness score (0-100)
    pub completeness: Option<f64>,
    /// Uniqueness score (0-100)
    pub uniqueness: Option<f64>,
    /// Formatted average delay
    pub timeliness: Option<String>,
    /// Validity score (0-100)
    pub validity: Option<f64>,
    /// Accuracy score (0-100)
    pub accuracy: Option<f64>,
    /// Consistency score (0-100)
    pub consistency: Option<f64>,
    /// Detail per dimension name
    pub details: DimensionResults,
    /// ISO-8601 time of the last update
    pub calculated_on: String,
}

impl From<MetricsRecord> for QualityReport {
    fn from(record: MetricsRecord) -> Self {
        Self {
            completeness: record.completeness,
            uniqueness: record.uniqueness,
            timeliness: record.timeliness,
            validity: record.validity,
            accuracy: record.accuracy,
            consistency: record.consistency,
            details: record.metrics,
            calculated_on: record.modified_at.to_rfc3339(),
        }
    }
}

/// Returns the stored data quality of a dataset.
///
/// # Errors
/// Returns `NotFound` when the dataset was never calculated.
pub async fn package_data_quality(store: &dyn MetricsStore, dataset_id: &str) -> Result<QualityReport> {
    entity_report(store, EntityType::Package, dataset_id).await
}

/// Returns the stored data quality of a resource.
///
/// # Errors
/// Returns `NotFound` when the resource was never calculated.
pub async fn resource_data_quality(store: &dyn MetricsStore, resource_id: &str) -> Result<QualityReport> {
    entity_report(store, EntityType::Resource, resource_id).await
}

async fn entity_report(
    store: &dyn MetricsStore,
    entity_type: EntityType,
    ref_id: &str,
) -> Result<QualityReport> {
    store
        .get(entity_type, ref_id)
        .await?
        .map(QualityReport::from)
        .ok_or_else(|| DqError::not_found(format!("{entity_type} data quality"), ref_id))
}

/// Stores manual overrides for some dimensions of an entity.
///
/// Each override is a dimension detail holding the dimension's counters and
/// `value`. Overrides are marked `manual: true` and update the dimension
/// scalar. The record is created when missing.
///
/// # Arguments
/// * `overrides` - Detail per dimension name
///
/// # Errors
/// Returns a validation error if any override is malformed; nothing is
/// saved in that case.
pub async fn set_manual_metrics(
    store: &dyn MetricsStore,
    entity_type: EntityType,
    ref_id: &str,
    overrides: &BTreeMap<String, Value>,
) -> Result<MetricsRecord> {
    let mut validated = Vec::with_capacity(overrides.len());
    for (name, detail) in overrides {
        let dimension: Dimension = name.parse()?;
        let Value::Object(detail) = detail else {
            return Err(DqError::validation(format!(
                "Manual {} metric must be an object",
                dimension
            )));
        };
        validate_override(dimension, detail)?;
        validated.push((dimension, detail.clone()));
    }

    let mut record = store.get_or_create(entity_type, ref_id).await?;
    for (dimension, detail) in validated {
        let mut result = DimensionResult::from(detail);
        result.insert("manual", true);
        result.insert("failed", false);
        if let Some(value) = result.value().cloned() {
            record.set_scalar(dimension, &value);
        }
        record.metrics.insert(dimension.name().to_string(), result);
    }
    store.save(&mut record).await?;
    tracing::info!(
        "Stored {} manual metric(s) for {} {}",
        overrides.len(),
        entity_type,
        ref_id
    );
    Ok(record)
}

/// Removes the manual override of one dimension so the next calculation
/// recomputes it. Returns whether an override was removed.
///
/// # Errors
/// Returns `NotFound` when the entity has no record.
pub async fn reset_manual(
    store: &dyn MetricsStore,
    entity_type: EntityType,
    ref_id: &str,
    dimension: Dimension,
) -> Result<bool> {
    let mut record = store
        .get(entity_type, ref_id)
        .await?
        .ok_or_else(|| DqError::not_found(format!("{entity_type} data quality"), ref_id))?;

    let name = dimension.name();
    if !record.metrics.get(name).is_some_and(DimensionResult::is_manual) {
        return Ok(false);
    }
    record.metrics.remove(name);
    record.clear_scalar(dimension);
    store.save(&mut record).await?;
    tracing::info!("Reset manual {} of {} {}", name, entity_type, ref_id);
    Ok(true)
}

/// Counter fields an override of the dimension must carry.
fn required_counters(dimension: Dimension) -> &'static [&'static str] {
    match dimension {
        Dimension::Completeness => &["total", "complete"],
        Dimension::Uniqueness => &["total", "unique"],
        Dimension::Timeliness => &["total", "average", "records"],
        Dimension::Validity => &["total", "valid"],
        Dimension::Accuracy => &["total", "accurate", "inaccurate"],
        Dimension::Consistency => &["total", "consistent"],
    }
}

fn validate_override(dimension: Dimension, detail: &Map<String, Value>) -> Result<()> {
    for counter in required_counters(dimension) {
        match detail.get(*counter) {
            None => {
                return Err(DqError::validation(format!(
                    "Manual {} metric is missing '{}'",
                    dimension, counter
                )));
            }
            Some(value) if !value.as_f64().is_some_and(|n| n >= 0.0) => {
                return Err(DqError::validation(format!(
                    "Manual {} metric field '{}' must be a non-negative number",
                    dimension, counter
                )));
            }
            Some(_) => {}
        }
    }

    let value = detail.get("value").ok_or_else(|| {
        DqError::validation(format!("Manual {} metric is missing 'value'", dimension))
    })?;
    match dimension {
        Dimension::Timeliness => {
            if !value.is_string() {
                return Err(DqError::validation(
                    "Manual timeliness value must be a string",
                ));
            }
        }
        _ => {
            if !value.as_f64().is_some_and(|n| (0.0..=100.0).contains(&n)) {
                return Err(DqError::validation(format!(
                    "Manual {} value must be a number between 0 and 100",
                    dimension
                )));
            }
        }
    }
    Ok(())
}
