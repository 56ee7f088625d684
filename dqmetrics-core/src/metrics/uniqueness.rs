//! Uniqueness: share of distinct values per column.

use std::collections::{BTreeMap, HashSet};

use serde_json::{Map, Value};

use super::{Metric, percentage, sum_counts};
use crate::Result;
use crate::data::ResourceData;
use crate::models::{Dimension, DimensionResult, Resource};

/// Measures the share of distinct values per column.
///
/// The resource score is `sum(distinct per column) / sum(values per column)`.
/// The cumulative score sums those counters over resources, so equal values
/// in different resources are still counted once per resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uniqueness;

/// Hashable identity of a cell value.
///
/// Numbers compare by numeric value (`1` equals `1.0`); values of different
/// JSON types never compare equal (`"1"` differs from `1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ValueKey {
    Null,
    Bool(bool),
    Int(i128),
    Float(u64),
    Text(String),
    Composite(String),
}

impl ValueKey {
    fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueKey::Null,
            Value::Bool(b) => ValueKey::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ValueKey::Int(i128::from(i))
                } else if let Some(u) = n.as_u64() {
                    ValueKey::Int(i128::from(u))
                } else {
                    let f = n.as_f64().unwrap_or(f64::NAN);
                    if f.fract() == 0.0 && f.abs() < 1e18 {
                        ValueKey::Int(f as i128)
                    } else {
                        ValueKey::Float(f.to_bits())
                    }
                }
            }
            Value::String(s) => ValueKey::Text(s.clone()),
            other => ValueKey::Composite(other.to_string()),
        }
    }
}

impl Metric for Uniqueness {
    fn dimension(&self) -> Dimension {
        Dimension::Uniqueness
    }

    fn calculate_metric(&self, resource: &Resource, data: &ResourceData) -> Result<DimensionResult> {
        let mut columns: BTreeMap<String, (u64, HashSet<ValueKey>)> = BTreeMap::new();
        for row in data.records() {
            for (column, value) in &row {
                let (total, distinct) = columns.entry(column.clone()).or_default();
                *total += 1;
                distinct.insert(ValueKey::of(value));
            }
        }

        let mut report = Map::new();
        let mut total: u64 = 0;
        let mut unique: u64 = 0;
        for (column, (column_total, distinct)) in &columns {
            let column_unique = distinct.len() as u64;
            total += column_total;
            unique += column_unique;
            report.insert(
                column.clone(),
                serde_json::json!({
                    "total": column_total,
                    "unique": column_unique,
                    "value": percentage(column_unique, *column_total),
                }),
            );
        }

        let value = percentage(unique, total);
        tracing::debug!(
            "Resource {}: {} unique of {} values ({:.2}%)",
            resource.id,
            unique,
            total,
            value
        );

        Ok(DimensionResult::new()
            .with("value", value)
            .with("total", total)
            .with("unique", unique)
            .with("columns", report))
    }

    fn calculate_cumulative_metric(
        &self,
        _resources: &[Resource],
        results: &[DimensionResult],
    ) -> DimensionResult {
        let total = sum_counts(results, "total");
        let unique = sum_counts(results, "unique");
        DimensionResult::new()
            .with("value", percentage(unique, total))
            .with("total", total)
            .with("unique", unique)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::test_support::data;
    use serde_json::json;

    fn as_f64(result: &DimensionResult) -> f64 {
        result.value().and_then(Value::as_f64).unwrap()
    }

    #[test]
    fn test_uniqueness_per_column() {
        let data = data(
            &[("col1", "text"), ("col2", "int")],
            vec![
                json!({"col1": "A", "col2": 1}),
                json!({"col1": "B", "col2": 2}),
                json!({"col1": "C", "col2": 1}),
                json!({"col1": "A", "col2": 2}),
                json!({"col1": "B", "col2": 1}),
                json!({"col1": "C", "col2": 2}),
            ],
        );
        let result = Uniqueness
            .calculate_metric(&Resource::new("r1"), &data)
            .unwrap();

        assert_eq!(result.count("total"), 12);
        assert_eq!(result.count("unique"), 5);
        assert!((as_f64(&result) - 41.666).abs() < 0.01);

        let columns = result.get("columns").unwrap();
        assert_eq!(columns["col1"]["unique"], json!(3));
        assert!((columns["col1"]["value"].as_f64().unwrap() - 50.0).abs() < 1e-9);
        assert_eq!(columns["col2"]["unique"], json!(2));
        assert_eq!(columns["col2"]["total"], json!(6));
        assert!((columns["col2"]["value"].as_f64().unwrap() - 33.333).abs() < 0.01);
    }

    #[test]
    fn test_value_identity_follows_json_types() {
        let data = data(
            &[("v", "numeric")],
            vec![
                json!({"v": 1}),
                json!({"v": 1.0}),
                json!({"v": "1"}),
                json!({"v": null}),
                json!({"v": null}),
            ],
        );
        let result = Uniqueness
            .calculate_metric(&Resource::new("r1"), &data)
            .unwrap();
        // 1 == 1.0, "1" distinct, null counted once
        assert_eq!(result.count("unique"), 3);
        assert_eq!(result.count("total"), 5);
    }

    #[test]
    fn test_uniqueness_empty_and_cumulative() {
        let empty = Uniqueness
            .calculate_metric(&Resource::new("r1"), &data(&[], vec![]))
            .unwrap();
        assert_eq!(empty.value(), Some(&json!(0.0)));

        let results = vec![
            DimensionResult::new().with("total", 12).with("unique", 5),
            DimensionResult::new().with("total", 8).with("unique", 8),
        ];
        let cumulative = Uniqueness.calculate_cumulative_metric(&[], &results);
        assert_eq!(cumulative.count("total"), 20);
        assert_eq!(cumulative.count("unique"), 13);
        assert!((as_f64(&cumulative) - 65.0).abs() < 1e-9);
        assert!(cumulative.get("columns").is_none());
    }
}
