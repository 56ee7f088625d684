//! Accuracy: share of checked records flagged accurate.

use serde_json::Value;

use super::{Metric, percentage, sum_counts};
use crate::Result;
use crate::data::ResourceData;
use crate::models::{Dimension, DimensionResult, Resource};

/// Flag values (lowercase) marking a record accurate.
const ACCURATE_FLAGS: [&str; 5] = ["1", "yes", "accurate", "t", "true"];

/// Measures the share of accurate records among records that were checked.
///
/// Setting `dq_accuracy_column` names the flag column. Blank flags mean the
/// record was not checked and are excluded; any other flag that is not an
/// accurate marker counts as inaccurate.
#[derive(Debug, Clone, Copy, Default)]
pub struct Accuracy;

fn flag_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    };
    if text.is_empty() { None } else { Some(text) }
}

fn accuracy_result(accurate: u64, inaccurate: u64) -> DimensionResult {
    let total = accurate + inaccurate;
    DimensionResult::new()
        .with("value", percentage(accurate, total))
        .with("total", total)
        .with("accurate", accurate)
        .with("inaccurate", inaccurate)
}

impl Metric for Accuracy {
    fn dimension(&self) -> Dimension {
        Dimension::Accuracy
    }

    fn calculate_metric(&self, resource: &Resource, data: &ResourceData) -> Result<DimensionResult> {
        let Some(column) = resource.setting(Dimension::Accuracy, "column") else {
            tracing::error!(
                "Cannot calculate accuracy of resource {}: no accuracy column is specified",
                resource.id
            );
            return Ok(DimensionResult::failed("Missing accuracy column."));
        };

        let mut accurate: u64 = 0;
        let mut inaccurate: u64 = 0;
        for row in data.records() {
            let Some(flag) = row.get(&column).and_then(flag_text) else {
                continue;
            };
            if ACCURATE_FLAGS.contains(&flag.to_lowercase().as_str()) {
                accurate += 1;
            } else {
                inaccurate += 1;
            }
        }

        tracing::debug!(
            "Resource {}: accurate={}, inaccurate={}",
            resource.id,
            accurate,
            inaccurate
        );
        Ok(accuracy_result(accurate, inaccurate))
    }

    fn calculate_cumulative_metric(
        &self,
        _resources: &[Resource],
        results: &[DimensionResult],
    ) -> DimensionResult {
        accuracy_result(
            sum_counts(results, "accurate"),
            sum_counts(results, "inaccurate"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::test_support::data;
    use serde_json::json;

    fn resource() -> Resource {
        Resource::new("r1").with_field("dq_accuracy_column", "checked")
    }

    #[test]
    fn test_accuracy_flags() {
        let data = data(
            &[("checked", "text")],
            vec![
                json!({"checked": "T"}),
                json!({"checked": "F"}),
                json!({"checked": ""}),
                json!({"checked": "t"}),
                json!({"checked": "yes"}),
            ],
        );
        let result = Accuracy.calculate_metric(&resource(), &data).unwrap();
        assert_eq!(result.count("accurate"), 3);
        assert_eq!(result.count("inaccurate"), 1);
        assert_eq!(result.count("total"), 4);
        assert_eq!(result.value(), Some(&json!(75.0)));
    }

    #[test]
    fn test_accuracy_non_string_flags() {
        let data = data(
            &[("checked", "int")],
            vec![
                json!({"checked": 1}),
                json!({"checked": 0}),
                json!({"checked": true}),
                json!({"checked": null}),
                json!({"other": "yes"}),
            ],
        );
        let result = Accuracy.calculate_metric(&resource(), &data).unwrap();
        assert_eq!(result.count("accurate"), 2);
        assert_eq!(result.count("inaccurate"), 1);
    }

    #[test]
    fn test_accuracy_missing_column_fails() {
        let result = Accuracy
            .calculate_metric(&Resource::new("r1"), &data(&[], vec![]))
            .unwrap();
        assert!(result.is_failed());
        assert_eq!(result.error(), Some("Missing accuracy column."));
    }

    #[test]
    fn test_accuracy_cumulative() {
        let results = vec![
            DimensionResult::new().with("accurate", 3).with("inaccurate", 1),
            DimensionResult::failed("Missing accuracy column."),
            DimensionResult::new().with("accurate", 1).with("inaccurate", 3),
        ];
        let result = Accuracy.calculate_cumulative_metric(&[], &results);
        assert_eq!(result.count("total"), 8);
        assert_eq!(result.value(), Some(&json!(50.0)));

        let empty = Accuracy.calculate_cumulative_metric(&[], &[]);
        assert_eq!(empty.value(), Some(&json!(0.0)));
    }
}
