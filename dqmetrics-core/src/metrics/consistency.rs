//! Consistency: share of values written in their column's dominant format.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::Value;

use super::{Metric, percentage, sum_counts};
use crate::Result;
use crate::data::ResourceData;
use crate::formats::{detect_date_format, detect_numeric_format};
use crate::models::{Dimension, DimensionResult, Resource};

/// Format label for values no known layout matches.
const UNKNOWN_FORMAT: &str = "unknown";

/// Measures how consistently the values of each column are formatted.
///
/// Values are classified by the declared column type: `timestamp` columns
/// by date layout, `numeric` and `int` columns by number layout, `text` and
/// `string` columns all fall in one class named after the type. The most
/// frequent class of a column, other than `unknown`, counts as consistent.
/// Nulls and columns of other types are not counted.
#[derive(Debug, Clone, Copy, Default)]
pub struct Consistency;

/// How values of a column type are classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Classifier {
    Date,
    Numeric,
    Text,
}

impl Classifier {
    fn for_type(field_type: &str) -> Option<Self> {
        match field_type {
            "timestamp" => Some(Classifier::Date),
            "numeric" | "int" => Some(Classifier::Numeric),
            "string" | "text" => Some(Classifier::Text),
            _ => None,
        }
    }

    fn classify(self, field_type: &str, value: &Value) -> String {
        let format = match self {
            Classifier::Date => match value {
                Value::String(s) => detect_date_format(s),
                other => detect_date_format(&other.to_string()),
            },
            Classifier::Numeric => detect_numeric_format(value),
            Classifier::Text => return field_type.to_string(),
        };
        format.unwrap_or(UNKNOWN_FORMAT).to_string()
    }
}

/// Per-column tally.
#[derive(Debug, Default, Serialize)]
struct ColumnReport {
    count: u64,
    formats: BTreeMap<String, u64>,
    consistent: u64,
}

impl Metric for Consistency {
    fn dimension(&self) -> Dimension {
        Dimension::Consistency
    }

    fn calculate_metric(&self, resource: &Resource, data: &ResourceData) -> Result<DimensionResult> {
        let field_types: HashMap<&str, &str> = data
            .fields()
            .iter()
            .map(|f| (f.id.as_str(), f.field_type.as_str()))
            .collect();
        let mut report: BTreeMap<String, ColumnReport> = data
            .fields()
            .iter()
            .map(|f| (f.id.clone(), ColumnReport::default()))
            .collect();

        for row in data.records() {
            for (column, value) in &row {
                if value.is_null() {
                    continue;
                }
                let Some(&field_type) = field_types.get(column.as_str()) else {
                    continue;
                };
                let Some(classifier) = Classifier::for_type(field_type) else {
                    continue;
                };
                let Some(column_report) = report.get_mut(column) else {
                    continue;
                };
                *column_report
                    .formats
                    .entry(classifier.classify(field_type, value))
                    .or_default() += 1;
                column_report.count += 1;
            }
        }

        let mut total: u64 = 0;
        let mut consistent: u64 = 0;
        for column_report in report.values_mut() {
            column_report.consistent = column_report
                .formats
                .iter()
                .filter(|(format, _)| format.as_str() != UNKNOWN_FORMAT)
                .map(|(_, count)| *count)
                .max()
                .unwrap_or(0);
            total += column_report.count;
            consistent += column_report.consistent;
        }

        let value = percentage(consistent, total);
        tracing::debug!(
            "Resource {}: {} consistent of {} values ({:.2}%)",
            resource.id,
            consistent,
            total,
            value
        );

        let report = serde_json::to_value(&report)
            .map_err(|e| crate::error::DqError::serialization("consistency report", e))?;
        Ok(DimensionResult::new()
            .with("value", value)
            .with("total", total)
            .with("consistent", consistent)
            .with("report", report))
    }

    fn calculate_cumulative_metric(
        &self,
        _resources: &[Resource],
        results: &[DimensionResult],
    ) -> DimensionResult {
        let total = sum_counts(results, "total");
        let consistent = sum_counts(results, "consistent");
        DimensionResult::new()
            .with("value", percentage(consistent, total))
            .with("total", total)
            .with("consistent", consistent)
    }
}
