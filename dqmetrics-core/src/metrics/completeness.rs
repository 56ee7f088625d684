//! Completeness: share of populated cells.

use serde_json::Value;

use super::{Metric, percentage, sum_counts};
use crate::Result;
use crate::data::{ResourceData, Row};
use crate::models::{Dimension, DimensionResult, Resource};

/// Measures the share of populated cells.
///
/// A cell is populated unless it is null or a string that is blank after
/// trimming. The expected number of cells is `rows * columns`, using the
/// row total and the column metadata of the source.
#[derive(Debug, Clone, Copy, Default)]
pub struct Completeness;

fn complete_cells(row: &Row) -> u64 {
    row.values()
        .filter(|value| match value {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            _ => true,
        })
        .count() as u64
}

impl Metric for Completeness {
    fn dimension(&self) -> Dimension {
        Dimension::Completeness
    }

    fn calculate_metric(&self, resource: &Resource, data: &ResourceData) -> Result<DimensionResult> {
        let columns = data.fields().len() as u64;
        let rows = data.total();
        let total = columns * rows;
        tracing::debug!(
            "Resource {}: rows={}, columns={}, expected values={}",
            resource.id,
            rows,
            columns,
            total
        );

        let complete: u64 = data.records().map(|row| complete_cells(&row)).sum();
        let value = percentage(complete, total);
        tracing::debug!("Resource {}: completeness {:.2}%", resource.id, value);

        Ok(DimensionResult::new()
            .with("value", value)
            .with("total", total)
            .with("complete", complete))
    }

    fn calculate_cumulative_metric(
        &self,
        _resources: &[Resource],
        results: &[DimensionResult],
    ) -> DimensionResult {
        let total = sum_counts(results, "total");
        let complete = sum_counts(results, "complete");
        DimensionResult::new()
            .with("value", percentage(complete, total))
            .with("total", total)
            .with("complete", complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::test_support::data;
    use serde_json::json;

    #[test]
    fn test_completeness_counts_blank_and_null() {
        let data = data(
            &[("a", "text"), ("b", "text")],
            vec![
                json!({"a": "x", "b": null}),
                json!({"a": "  ", "b": "y"}),
                json!({"a": "z", "b": 0}),
            ],
        );
        let result = Completeness
            .calculate_metric(&Resource::new("r1"), &data)
            .unwrap();

        assert_eq!(result.count("total"), 6);
        assert_eq!(result.count("complete"), 4);
        let value = result.value().and_then(Value::as_f64).unwrap();
        assert!((value - 66.666).abs() < 0.01);
    }

    #[test]
    fn test_completeness_empty_resource() {
        let data = data(&[("a", "text")], vec![]);
        let result = Completeness
            .calculate_metric(&Resource::new("r1"), &data)
            .unwrap();
        assert_eq!(result.value(), Some(&json!(0.0)));
        assert_eq!(result.count("total"), 0);
    }

    #[test]
    fn test_completeness_cumulative() {
        let results = vec![
            DimensionResult::new().with("total", 4).with("complete", 4),
            DimensionResult::new().with("total", 8).with("complete", 6),
            DimensionResult::failed("no data"),
        ];
        let result = Completeness.calculate_cumulative_metric(&[], &results);
        assert_eq!(result.count("total"), 12);
        assert_eq!(result.count("complete"), 10);
        let value = result.value().and_then(Value::as_f64).unwrap();
        assert!((value - 83.333).abs() < 0.01);

        let empty = Completeness.calculate_cumulative_metric(&[], &[]);
        assert_eq!(empty.value(), Some(&json!(0.0)));
    }
}
