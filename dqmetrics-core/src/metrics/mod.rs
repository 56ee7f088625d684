//! Data quality dimensions.
//!
//! Each dimension is a [`Metric`] with two phases:
//! - **per resource**: one full pass over the resource rows produces a
//!   [`DimensionResult`] with the score in `value` plus the counters it was
//!   derived from
//! - **cumulative**: the per-resource results of a dataset are reduced into
//!   one dataset-level result without rescanning any data
//!
//! Ordinary data problems (missing values, unparseable dates, mixed formats)
//! are counted, never raised. A metric reports an unusable configuration as
//! a failed result; any `Err` it returns is turned into a failed result by
//! the orchestrator.
//!
//! # Example
//! ```rust,ignore
//! use dqmetrics_core::metrics::{Completeness, Metric};
//!
//! let result = Completeness.calculate_metric(&resource, &data)?;
//! println!("Completeness: {:.2}%", result.value().and_then(|v| v.as_f64()).unwrap_or(0.0));
//! ```

use std::sync::Arc;

use crate::Result;
use crate::data::ResourceData;
use crate::models::{Dimension, DimensionResult, Resource};
use crate::validation::{SchemaValidator, TableValidator};

mod accuracy;
mod completeness;
mod consistency;
mod timeliness;
mod uniqueness;
mod validity;

pub use accuracy::Accuracy;
pub use completeness::Completeness;
pub use consistency::Consistency;
pub use timeliness::Timeliness;
pub use uniqueness::Uniqueness;
pub use validity::Validity;

/// One data quality dimension.
pub trait Metric: Send + Sync {
    /// The dimension this metric measures.
    fn dimension(&self) -> Dimension;

    /// Stable name used as key in result maps.
    fn name(&self) -> &'static str {
        self.dimension().name()
    }

    /// Measures one resource over a full pass of its rows.
    ///
    /// # Errors
    /// Returns an error only for unexpected conditions; missing settings are
    /// reported as a failed result.
    fn calculate_metric(&self, resource: &Resource, data: &ResourceData)
    -> Result<DimensionResult>;

    /// Reduces per-resource results into a dataset-level result.
    ///
    /// `results` is parallel to `resources`; failed or empty entries
    /// contribute zero to every sum.
    fn calculate_cumulative_metric(
        &self,
        resources: &[Resource],
        results: &[DimensionResult],
    ) -> DimensionResult;
}

/// Builds the metric for a dimension, validating with `validator`.
pub fn metric_for(dimension: Dimension, validator: Arc<dyn TableValidator>) -> Arc<dyn Metric> {
    match dimension {
        Dimension::Completeness => Arc::new(Completeness),
        Dimension::Uniqueness => Arc::new(Uniqueness),
        Dimension::Timeliness => Arc::new(Timeliness),
        Dimension::Validity => Arc::new(Validity::new(validator)),
        Dimension::Accuracy => Arc::new(Accuracy),
        Dimension::Consistency => Arc::new(Consistency),
    }
}

/// Builds the metrics for the given dimensions with the default validator.
pub fn default_metrics(dimensions: &[Dimension]) -> Vec<Arc<dyn Metric>> {
    let validator: Arc<dyn TableValidator> = Arc::new(SchemaValidator::new());
    dimensions
        .iter()
        .map(|d| metric_for(*d, Arc::clone(&validator)))
        .collect()
}

/// `part / total * 100`, or 0 when `total` is 0.
pub(crate) fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Sums a counter over results; missing counters count as 0.
pub(crate) fn sum_counts(results: &[DimensionResult], key: &str) -> u64 {
    results.iter().map(|r| r.count(key)).sum()
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use serde_json::Value;

    use crate::data::{Field, InMemoryTable, ResourceData};

    /// Builds a data view over JSON rows with the given `(column, type)` fields.
    pub(crate) fn data(fields: &[(&str, &str)], rows: Vec<Value>) -> ResourceData {
        let fields: Vec<Field> = fields.iter().map(|(id, t)| Field::new(*id, *t)).collect();
        let table = InMemoryTable::from_json(fields.clone(), rows);
        let total = table.len() as u64;
        ResourceData::new(Arc::new(table), total, fields, 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_guards_zero() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(5, 0), 0.0);
        assert!((percentage(1, 3) - 33.333).abs() < 0.001);
    }

    #[test]
    fn test_default_metrics_follow_dimensions() {
        let metrics = default_metrics(&[Dimension::Validity, Dimension::Completeness]);
        let names: Vec<&str> = metrics.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["validity", "completeness"]);
    }

    #[test]
    fn test_sum_counts_ignores_failed_results() {
        let results = vec![
            DimensionResult::new().with("total", 10),
            DimensionResult::failed("boom"),
            DimensionResult::new(),
            DimensionResult::new().with("total", 5),
        ];
        assert_eq!(sum_counts(&results, "total"), 15);
    }
}
