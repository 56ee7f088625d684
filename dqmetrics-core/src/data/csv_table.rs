//! CSV-backed tables.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use serde_json::Value;

use super::{Field, Page, PageFetcher, Row};
use crate::error::{DqError, Result};
use crate::formats::{detect_date_format, detect_numeric_format};

/// A parsed CSV file served page by page.
///
/// Column names come from the header row; repeated names are numbered in
/// order of appearance (`a`, `b`, `a` becomes `a_1`, `b`, `a_2`). Column
/// types are guessed from the first data row: `numeric`, then `timestamp`,
/// otherwise `text`. All values are kept as strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvTable {
    fields: Vec<Field>,
    rows: Vec<Vec<String>>,
}

impl CsvTable {
    /// Builds a table from raw CSV rows, the first being the header.
    pub fn from_rows(mut rows: Vec<Vec<String>>) -> Self {
        if rows.is_empty() {
            return Self::default();
        }
        let header = rows.remove(0);
        let names = column_names(&header);
        let fields = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let field_type = rows
                    .first()
                    .and_then(|first| first.get(i))
                    .map_or("text", |value| guess_type(value));
                Field::new(name, field_type)
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            "CSV table loaded: {} rows, fields={:?}",
            rows.len(),
            fields
        );
        Self { fields, rows }
    }

    /// Parses CSV text from a reader.
    ///
    /// # Errors
    /// Returns a data fetch error when the input is not valid CSV.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);
        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record.map_err(|e| DqError::data_fetch_failed("parsing CSV data", e))?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self::from_rows(rows))
    }

    /// Parses a CSV file.
    ///
    /// # Errors
    /// Returns a data fetch error when the file cannot be opened or parsed.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            DqError::data_fetch_failed(format!("opening {}", path.display()), e)
        })?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Number of data rows (header excluded).
    pub fn total(&self) -> u64 {
        self.rows.len() as u64
    }

    /// Column metadata.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    fn to_record(&self, values: &[String]) -> Row {
        self.fields
            .iter()
            .zip(values)
            .map(|(field, value)| (field.id.clone(), Value::String(value.clone())))
            .collect()
    }
}

impl PageFetcher for CsvTable {
    fn fetch_page(&self, page: usize, page_size: usize) -> Result<Page> {
        let start = page.saturating_mul(page_size).min(self.rows.len());
        let end = start.saturating_add(page_size).min(self.rows.len());
        let records: Vec<Row> = self.rows[start..end]
            .iter()
            .map(|values| self.to_record(values))
            .collect();
        tracing::trace!(
            "CSV page {} (size {}) of {} rows: {} records",
            page,
            page_size,
            self.rows.len(),
            records.len()
        );
        Ok(Page {
            total: self.total(),
            records,
            fields: self.fields.clone(),
        })
    }
}

/// Numbers repeated header names in order of appearance.
fn column_names(header: &[String]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for name in header {
        *counts.entry(name.as_str()).or_default() += 1;
    }
    let mut numbered: HashMap<&str, usize> = HashMap::new();
    header
        .iter()
        .map(|name| {
            if counts[name.as_str()] > 1 {
                let n = numbered.entry(name.as_str()).or_default();
                *n += 1;
                format!("{name}_{n}")
            } else {
                name.clone()
            }
        })
        .collect()
}

fn guess_type(value: &str) -> &'static str {
    if detect_numeric_format(&Value::String(value.to_string())).is_some() {
        "numeric"
    } else if detect_date_format(value).is_some() {
        "timestamp"
    } else {
        "text"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "id,name,id,measured,id\n1,alpha,2,2023-01-05,x\n2,,3,2023-01-06,y\n";

    #[test]
    fn test_duplicate_headers_are_numbered() {
        let table = CsvTable::from_reader(SAMPLE.as_bytes()).unwrap();
        let names: Vec<&str> = table.fields().iter().map(|f| f.id.as_str()).collect();
        assert_eq!(names, vec!["id_1", "name", "id_2", "measured", "id_3"]);
    }

    #[test]
    fn test_types_guessed_from_first_data_row() {
        let table = CsvTable::from_reader(SAMPLE.as_bytes()).unwrap();
        let types: Vec<&str> = table
            .fields()
            .iter()
            .map(|f| f.field_type.as_str())
            .collect();
        assert_eq!(types, vec!["numeric", "text", "numeric", "timestamp", "text"]);
    }

    #[test]
    fn test_total_excludes_header() {
        let table = CsvTable::from_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(table.total(), 2);

        let header_only = CsvTable::from_reader("a,b\n".as_bytes()).unwrap();
        assert_eq!(header_only.total(), 0);
        assert!(header_only.fields().iter().all(|f| f.field_type == "text"));

        let empty = CsvTable::from_reader("".as_bytes()).unwrap();
        assert_eq!(empty.total(), 0);
        assert!(empty.fields().is_empty());
    }

    #[test]
    fn test_pages_map_values_to_columns() {
        let table = CsvTable::from_reader(SAMPLE.as_bytes()).unwrap();
        let page = table.fetch_page(1, 1).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.records.len(), 1);
        let record = &page.records[0];
        assert_eq!(record["id_1"], Value::String("2".to_string()));
        assert_eq!(record["name"], Value::String(String::new()));
        assert_eq!(record["id_3"], Value::String("y".to_string()));

        assert!(table.fetch_page(2, 1).unwrap().records.is_empty());
    }

    #[test]
    fn test_short_rows_omit_missing_columns() {
        let table = CsvTable::from_reader("a,b,c\n1,2\n".as_bytes()).unwrap();
        let page = table.fetch_page(0, 10).unwrap();
        assert_eq!(page.records[0].len(), 2);
        assert_eq!(table.fields()[2].field_type, "text");
    }
}
