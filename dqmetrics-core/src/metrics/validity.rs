//! Validity: share of rows passing validation.

use std::sync::Arc;

use super::{Metric, percentage, sum_counts};
use crate::Result;
use crate::data::ResourceData;
use crate::models::{Dimension, DimensionResult, Resource};
use crate::validation::TableValidator;

/// Measures the share of rows that pass validation.
///
/// A validator that cannot run at all (unsupported format, broken schema)
/// yields a failed result carrying its error message.
#[derive(Clone)]
pub struct Validity {
    validator: Arc<dyn TableValidator>,
}

impl std::fmt::Debug for Validity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validity").finish_non_exhaustive()
    }
}

impl Validity {
    /// Creates the metric around a validator.
    pub fn new(validator: Arc<dyn TableValidator>) -> Self {
        Self { validator }
    }
}

fn validity_result(total: u64, valid: u64) -> DimensionResult {
    DimensionResult::new()
        .with("value", percentage(valid, total))
        .with("total", total)
        .with("valid", valid)
}

impl Metric for Validity {
    fn dimension(&self) -> Dimension {
        Dimension::Validity
    }

    fn calculate_metric(&self, resource: &Resource, data: &ResourceData) -> Result<DimensionResult> {
        let report = match self.validator.validate(resource, data) {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("Failed to validate resource {}: {}", resource.id, e);
                return Ok(DimensionResult::failed(e.to_string()));
            }
        };

        let rows = report.row_count();
        let errors = report.error_count();
        let valid = rows.saturating_sub(errors);
        tracing::debug!(
            "Resource {}: {} rows, {} with errors",
            resource.id,
            rows,
            errors
        );
        Ok(validity_result(rows, valid))
    }

    fn calculate_cumulative_metric(
        &self,
        _resources: &[Resource],
        results: &[DimensionResult],
    ) -> DimensionResult {
        validity_result(sum_counts(results, "total"), sum_counts(results, "valid"))
    }
}
