//! Timeliness: average delay between measurement and ingestion.

use serde_json::Value;

use super::{Metric, sum_counts};
use crate::Result;
use crate::data::ResourceData;
use crate::formats::{format_duration, parse_timestamp, parse_with_format};
use crate::models::{Dimension, DimensionResult, Resource};

/// Measures the average delay between when a record was measured and when
/// the resource holding it was last modified.
///
/// Settings: `dq_timeliness_column` names the measurement time column;
/// `dq_timeliness_date_format` optionally gives its strptime format.
/// Values that do not parse, and measurement times after the resource
/// modification time, are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timeliness;

fn empty_result() -> DimensionResult {
    DimensionResult::new()
        .with("value", "")
        .with("total", 0)
        .with("average", 0)
        .with("records", 0)
}

fn delay_result(total: i64, average: i64, records: u64) -> DimensionResult {
    DimensionResult::new()
        .with("value", format!("+{}", format_duration(average)))
        .with("total", total)
        .with("average", average)
        .with("records", records)
}

impl Metric for Timeliness {
    fn dimension(&self) -> Dimension {
        Dimension::Timeliness
    }

    fn calculate_metric(&self, resource: &Resource, data: &ResourceData) -> Result<DimensionResult> {
        let Some(column) = resource.setting(Dimension::Timeliness, "column") else {
            tracing::warn!(
                "No column for record entry date defined for resource {}",
                resource.id
            );
            return Ok(DimensionResult::failed("No date column defined in settings"));
        };
        let date_format = resource.setting(Dimension::Timeliness, "date_format");
        let ingested = resource.last_modified_at()?;

        let mut measured: u64 = 0;
        let mut total_seconds = 0.0_f64;
        for row in data.records() {
            let Some(Value::String(raw)) = row.get(&column) else {
                continue;
            };
            if raw.is_empty() {
                continue;
            }
            let parsed = match &date_format {
                Some(format) => parse_with_format(raw, format),
                None => parse_timestamp(raw),
            };
            let Some(recorded) = parsed else {
                tracing::debug!("Failed to parse date value '{}'", raw);
                continue;
            };
            if recorded > ingested {
                tracing::warn!(
                    "Record date {} of resource {} is after the resource was modified",
                    recorded,
                    resource.id
                );
                continue;
            }
            let delta = ingested - recorded;
            total_seconds += delta.num_milliseconds() as f64 / 1000.0;
            measured += 1;
        }

        if measured == 0 {
            return Ok(empty_result());
        }
        let total = total_seconds.round() as i64;
        let average = total / measured as i64;
        tracing::debug!(
            "Resource {}: measured {} of {} records, total delay {}s, average {}s",
            resource.id,
            measured,
            data.total(),
            total,
            average
        );
        Ok(delay_result(total, average, measured))
    }

    fn calculate_cumulative_metric(
        &self,
        _resources: &[Resource],
        results: &[DimensionResult],
    ) -> DimensionResult {
        let total = sum_counts(results, "total");
        let records = sum_counts(results, "records");
        if records == 0 {
            return empty_result();
        }
        let average = (total as f64 / records as f64).round() as i64;
        delay_result(total as i64, average, records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::test_support::data;
    use serde_json::json;

    fn resource() -> Resource {
        Resource::new("r1")
            .with_last_modified("2023-01-02T00:00:00.000000")
            .with_field("dq_timeliness_column", "measured")
    }

    #[test]
    fn test_timeliness_average_delay() {
        let data = data(
            &[("measured", "timestamp")],
            vec![
                json!({"measured": "2023-01-01T00:00:00"}),
                json!({"measured": "2023-01-01T12:00:00"}),
                json!({"measured": "garbage"}),
                json!({"measured": ""}),
                json!({"measured": null}),
                // after the modification time
                json!({"measured": "2023-01-03T00:00:00"}),
            ],
        );
        let result = Timeliness.calculate_metric(&resource(), &data).unwrap();

        assert_eq!(result.count("records"), 2);
        assert_eq!(result.count("total"), 129_600);
        assert_eq!(result.count("average"), 64_800);
        assert_eq!(result.value(), Some(&json!("+18:00:00")));
    }

    #[test]
    fn test_timeliness_with_explicit_format() {
        let resource = resource().with_field("dq_timeliness_date_format", "%d/%m/%Y");
        let data = data(
            &[("measured", "text")],
            vec![json!({"measured": "30/12/2022"}), json!({"measured": "2022-12-30"})],
        );
        let result = Timeliness.calculate_metric(&resource, &data).unwrap();
        assert_eq!(result.count("records"), 1);
        assert_eq!(result.value(), Some(&json!("+3 days, 0:00:00")));
    }

    #[test]
    fn test_timeliness_missing_column_fails() {
        let resource = Resource::new("r1").with_last_modified("2023-01-02T00:00:00");
        let result = Timeliness
            .calculate_metric(&resource, &data(&[], vec![]))
            .unwrap();
        assert!(result.is_failed());
        assert_eq!(result.error(), Some("No date column defined in settings"));
    }

    #[test]
    fn test_timeliness_empty_state() {
        let result = Timeliness
            .calculate_metric(&resource(), &data(&[("measured", "timestamp")], vec![]))
            .unwrap();
        assert_eq!(result.value(), Some(&json!("")));
        assert_eq!(result.count("total"), 0);
        assert_eq!(result.count("average"), 0);
        assert_eq!(result.count("records"), 0);
    }

    #[test]
    fn test_timeliness_cumulative_rounds_average() {
        let results = vec![
            DimensionResult::new().with("total", 10).with("records", 3),
            DimensionResult::new().with("total", 0).with("records", 0),
            DimensionResult::failed("No date column defined in settings"),
        ];
        let result = Timeliness.calculate_cumulative_metric(&[], &results);
        assert_eq!(result.count("average"), 3);
        assert_eq!(result.count("total"), 10);
        assert_eq!(result.value(), Some(&json!("+0:00:03")));

        let results = vec![DimensionResult::new().with("total", 11).with("records", 2)];
        let result = Timeliness.calculate_cumulative_metric(&[], &results);
        assert_eq!(result.count("average"), 6);

        let empty = Timeliness.calculate_cumulative_metric(&[], &[]);
        assert_eq!(empty.value(), Some(&json!("")));
        assert_eq!(empty.count("records"), 0);
    }
}
