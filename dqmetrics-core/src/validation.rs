//! Tabular data validation.
//!
//! The validity dimension delegates to a [`TableValidator`], which checks
//! every row of a resource and reports how many rows failed. The default
//! [`SchemaValidator`] runs structural checks (blank and duplicate rows) and,
//! when the resource declares a schema, validates each row against it with
//! `jsonschema`.
//!
//! # Schemas
//! The resource `schema` may be a JSON object or a JSON string holding one.
//! A Frictionless Table Schema (`{"fields": [...]}`) is translated to a JSON
//! Schema for a single row; any other object is used as a row JSON Schema
//! as-is. A string starting with `http` is fetched as a remote schema.
//!
//! # Example
//! ```rust,ignore
//! use dqmetrics_core::validation::{SchemaValidator, TableValidator};
//!
//! let report = SchemaValidator::new().validate(&resource, &data)?;
//! println!("{} of {} rows invalid", report.error_count(), report.row_count());
//! ```

use std::collections::HashMap;

use jsonschema::Validator;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::data::{HttpDownloader, ResourceData, Row};
use crate::error::{DqError, Result};
use crate::models::Resource;

/// Formats the validator accepts; an empty format is accepted too.
const TABULAR_FORMATS: &[&str] = &["csv", "tsv", "xls", "xlsx", "ods", "json"];

/// Default cap on kept error messages per table.
pub const DEFAULT_MAX_ERRORS: usize = 100;

/// Validation outcome of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableReport {
    /// Where the table was read from
    pub source: String,
    /// Rows checked
    pub row_count: u64,
    /// Rows failing at least one check
    pub error_count: u64,
    /// First error messages
    pub errors: Vec<String>,
}

/// Validation outcome of a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// One report per validated table
    pub tables: Vec<TableReport>,
}

impl ValidationReport {
    /// Rows checked across all tables.
    pub fn row_count(&self) -> u64 {
        self.tables.iter().map(|t| t.row_count).sum()
    }

    /// Invalid rows across all tables.
    pub fn error_count(&self) -> u64 {
        self.tables.iter().map(|t| t.error_count).sum()
    }
}

/// Validates the rows of a resource.
pub trait TableValidator: Send + Sync {
    /// Checks every row of the resource.
    ///
    /// # Errors
    /// Returns an error when validation cannot be performed at all
    /// (unsupported format, unusable schema).
    fn validate(&self, resource: &Resource, data: &ResourceData) -> Result<ValidationReport>;
}

/// Structural and schema validation of resource rows.
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    max_errors: usize,
    downloader: HttpDownloader,
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self {
            max_errors: DEFAULT_MAX_ERRORS,
            downloader: HttpDownloader::new(),
        }
    }
}

impl SchemaValidator {
    /// Creates a validator with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to cap the kept error messages.
    pub fn with_max_errors(mut self, max_errors: usize) -> Self {
        self.max_errors = max_errors;
        self
    }

    /// Builder method to set the downloader of remote schemas.
    pub fn with_downloader(mut self, downloader: HttpDownloader) -> Self {
        self.downloader = downloader;
        self
    }

    /// Returns the row JSON Schema declared by the resource, if any.
    fn resolve_schema(&self, resource: &Resource) -> Result<Option<Value>> {
        let schema = match &resource.schema {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::String(text)) => {
                let text = text.trim();
                if text.is_empty() {
                    return Ok(None);
                }
                if text.starts_with("http") {
                    self.downloader.fetch_json(text).map_err(|e| {
                        DqError::validation(format!("Cannot load schema '{}': {}", text, e))
                    })?
                } else {
                    serde_json::from_str(text).map_err(|e| {
                        DqError::validation(format!(
                            "Invalid schema for resource {}: {}",
                            resource.id, e
                        ))
                    })?
                }
            }
            Some(schema @ Value::Object(_)) => schema.clone(),
            Some(other) => {
                return Err(DqError::validation(format!(
                    "Schema must be an object, got {}",
                    other
                )));
            }
        };

        match schema.get("fields") {
            Some(Value::Array(fields)) => Ok(Some(table_schema_to_json_schema(fields))),
            _ => Ok(Some(schema)),
        }
    }
}

impl TableValidator for SchemaValidator {
    fn validate(&self, resource: &Resource, data: &ResourceData) -> Result<ValidationReport> {
        check_format(resource)?;
        let compiled = match self.resolve_schema(resource)? {
            Some(schema) => Some(compile(&schema)?),
            None => None,
        };

        let source = resource
            .url
            .clone()
            .unwrap_or_else(|| resource.id.clone());
        let row_limit = data.total();
        let mut report = TableReport {
            source,
            ..TableReport::default()
        };
        let mut seen: HashMap<String, u64> = HashMap::new();

        for (index, row) in data.records().take(row_limit as usize).enumerate() {
            let row_number = index as u64 + 1;
            report.row_count += 1;

            let mut messages = Vec::new();
            if is_blank(&row) {
                messages.push(format!("Row {row_number} is completely blank"));
            } else {
                let key = Value::Object(row.clone()).to_string();
                if let Some(first) = seen.get(&key) {
                    messages.push(format!("Row {row_number} duplicates row {first}"));
                } else {
                    seen.insert(key, row_number);
                }
            }
            if let Some(validator) = &compiled {
                let instance = Value::Object(row);
                messages.extend(
                    validator
                        .iter_errors(&instance)
                        .map(|e| format!("Row {row_number}: {e}")),
                );
            }

            if !messages.is_empty() {
                report.error_count += 1;
                let room = self.max_errors.saturating_sub(report.errors.len());
                report.errors.extend(messages.into_iter().take(room));
            }
        }

        tracing::debug!(
            "Validated resource {}: {} rows, {} invalid",
            resource.id,
            report.row_count,
            report.error_count
        );
        Ok(ValidationReport {
            tables: vec![report],
        })
    }
}

fn check_format(resource: &Resource) -> Result<()> {
    let format = resource
        .format
        .as_deref()
        .map(|f| f.trim().to_lowercase())
        .unwrap_or_default();
    if format.is_empty() || TABULAR_FORMATS.contains(&format.as_str()) {
        Ok(())
    } else {
        Err(DqError::validation(format!(
            "Format '{}' of resource {} is not supported for validation",
            format, resource.id
        )))
    }
}

fn compile(schema: &Value) -> Result<Validator> {
    jsonschema::validator_for(schema)
        .map_err(|e| DqError::validation(format!("Schema compilation error: {}", e)))
}

/// Translates Table Schema fields into a JSON Schema for one row.
///
/// Values read from text files arrive as strings, so typed fields accept
/// either the JSON type or a string spelling of it. Fields that are not
/// required also accept null and the empty string.
fn table_schema_to_json_schema(fields: &[Value]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for field in fields {
        let Some(name) = field.get("name").and_then(Value::as_str) else {
            continue;
        };
        let field_type = field.get("type").and_then(Value::as_str).unwrap_or("string");
        let is_required = field
            .pointer("/constraints/required")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let base = type_schema(field_type, is_required);
        let property = if is_required {
            required.push(Value::String(name.to_string()));
            base
        } else {
            json!({ "anyOf": [base, { "type": "null" }, { "const": "" }] })
        };
        properties.insert(name.to_string(), property);
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn type_schema(field_type: &str, required: bool) -> Value {
    let lenient = |json_type: &str, pattern: &str| {
        json!({ "anyOf": [
            { "type": json_type },
            { "type": "string", "pattern": pattern },
        ]})
    };
    match field_type {
        "integer" => lenient("integer", r"^\s*[+-]?\d+\s*$"),
        "number" => lenient("number", r"^\s*[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?\s*$"),
        "boolean" => lenient(
            "boolean",
            "^(true|false|True|False|TRUE|FALSE|yes|no|Yes|No|1|0)$",
        ),
        "date" => json!({ "type": "string", "pattern": r"^\d{4}-\d{2}-\d{2}$" }),
        "datetime" => json!({
            "type": "string",
            "pattern": r"^\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?$",
        }),
        "any" => json!({}),
        _ if required => json!({ "type": "string", "minLength": 1 }),
        _ => json!({ "type": "string" }),
    }
}

fn is_blank(row: &Row) -> bool {
    row.values().all(|value| match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    })
}
