//! In-memory tables and the provider serving them.

use std::collections::HashMap;
use std::sync::Arc;

use super::{DataProvider, Field, Page, PageFetcher, ResourceData, Row};
use crate::error::{DqError, Result};
use crate::models::Resource;

/// Rows held in memory, served page by page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InMemoryTable {
    fields: Vec<Field>,
    rows: Vec<Row>,
}

impl InMemoryTable {
    /// Creates a table from column metadata and rows.
    pub fn new(fields: Vec<Field>, rows: Vec<Row>) -> Self {
        Self { fields, rows }
    }

    /// Creates a table from JSON objects; non-object values are skipped.
    pub fn from_json(fields: Vec<Field>, rows: Vec<serde_json::Value>) -> Self {
        let rows = rows
            .into_iter()
            .filter_map(|v| match v {
                serde_json::Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        Self::new(fields, rows)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true when the table holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column metadata.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }
}

impl PageFetcher for InMemoryTable {
    fn fetch_page(&self, page: usize, page_size: usize) -> Result<Page> {
        let start = page.saturating_mul(page_size).min(self.rows.len());
        let end = start.saturating_add(page_size).min(self.rows.len());
        Ok(Page {
            total: self.rows.len() as u64,
            records: self.rows[start..end].to_vec(),
            fields: self.fields.clone(),
        })
    }
}

/// Serves registered fetchers by resource id.
///
/// Used by tests and by applications that already hold resource data.
#[derive(Default, Clone)]
pub struct StaticProvider {
    sources: HashMap<String, Arc<dyn PageFetcher>>,
}

impl StaticProvider {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to register an in-memory table.
    pub fn with_table(self, resource_id: impl Into<String>, table: InMemoryTable) -> Self {
        self.with_fetcher(resource_id, Arc::new(table))
    }

    /// Builder method to register any fetcher.
    pub fn with_fetcher(
        mut self,
        resource_id: impl Into<String>,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        self.sources.insert(resource_id.into(), fetcher);
        self
    }
}

impl std::fmt::Debug for StaticProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&String> = self.sources.keys().collect();
        ids.sort();
        f.debug_struct("StaticProvider").field("resources", &ids).finish()
    }
}

impl DataProvider for StaticProvider {
    fn open(&self, resource: &Resource, page_size: usize) -> Result<ResourceData> {
        let fetcher = self
            .sources
            .get(&resource.id)
            .cloned()
            .ok_or_else(|| DqError::not_found("resource data", &resource.id))?;
        ResourceData::open(fetcher, page_size)
    }
}
