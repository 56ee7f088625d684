//! Paginated access to resource rows.
//!
//! Metric calculators never see pages: they iterate over [`ResourceData::records`],
//! which fetches pages of rows lazily through a [`PageFetcher`] and yields
//! them one at a time. Every call to `records()` starts a fresh pass from the
//! first page, so one `ResourceData` can serve any number of passes.
//!
//! # Fetchers
//! - [`InMemoryTable`]: rows held in memory
//! - [`CsvTable`]: parsed CSV text with guessed column types
//! - [`FallbackFetcher`]: a primary source with a one-way switch to a direct
//!   CSV source on first failure
//! - [`GuardedFetcher`]: converts fetch errors into empty pages
//!
//! [`LocalFileProvider`] reads the direct copy from uploads, local paths or
//! an HTTP(S) download through [`HttpDownloader`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;
use crate::models::Resource;

mod csv_table;
mod fetch;
mod memory;
mod provider;
pub(crate) mod remote;

pub use csv_table::CsvTable;
pub use fetch::{CsvLoader, FallbackFetcher, GuardedFetcher};
pub use memory::{InMemoryTable, StaticProvider};
pub use provider::{DataSource, DatastoreFactory, LocalFileProvider};
pub use remote::{DEFAULT_DOWNLOAD_TIMEOUT, HttpDownloader};

/// Default number of rows per page.
pub const DEFAULT_PAGE_SIZE: usize = crate::config::DEFAULT_PAGE_SIZE;

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Column name
    pub id: String,
    /// Column type name (`text`, `numeric`, `int`, `timestamp`, ...)
    #[serde(rename = "type")]
    pub field_type: String,
}

impl Field {
    /// Creates a field descriptor.
    pub fn new(id: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            field_type: field_type.into(),
        }
    }
}

/// A single record: column name to value.
pub type Row = Map<String, Value>;

/// One page of records as returned by a [`PageFetcher`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Total number of records in the source
    pub total: u64,
    /// Records of this page
    pub records: Vec<Row>,
    /// Column metadata
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Page {
    /// The page returned for unavailable data.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Source of record pages.
///
/// `page` is 0-based; a page holds at most `page_size` records.
pub trait PageFetcher: Send + Sync {
    /// Fetches one page of records.
    ///
    /// # Errors
    /// Returns an error when the underlying source is unavailable.
    fn fetch_page(&self, page: usize, page_size: usize) -> Result<Page>;
}

impl<F> PageFetcher for F
where
    F: Fn(usize, usize) -> Result<Page> + Send + Sync,
{
    fn fetch_page(&self, page: usize, page_size: usize) -> Result<Page> {
        self(page, page_size)
    }
}

/// Forward-only iterator over all records of a source.
///
/// The first page is fetched on the first call to `next`, and its `total` is
/// kept for the whole pass. When a page has been consumed, the next one is
/// fetched unless `total` records were already yielded or the last page was
/// empty. A fetch error ends the pass.
pub struct LazyRecords {
    fetcher: Arc<dyn PageFetcher>,
    page_size: usize,
    next_page: usize,
    total: Option<u64>,
    current: u64,
    buffer: std::vec::IntoIter<Row>,
    done: bool,
}

impl LazyRecords {
    /// Creates a pass over the fetcher's records.
    pub fn new(fetcher: Arc<dyn PageFetcher>, page_size: usize) -> Self {
        Self {
            fetcher,
            page_size: page_size.max(1),
            next_page: 0,
            total: None,
            current: 0,
            buffer: Vec::new().into_iter(),
            done: false,
        }
    }

    /// Total observed on the first page, if fetched yet.
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    fn fill_buffer(&mut self) -> bool {
        if let Some(total) = self.total
            && self.current >= total
        {
            return false;
        }
        let page = match self.fetcher.fetch_page(self.next_page, self.page_size) {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("Failed to fetch page {}: {}", self.next_page, e);
                return false;
            }
        };
        self.next_page += 1;
        let total = *self.total.get_or_insert(page.total);
        if page.records.is_empty() || self.current >= total {
            return false;
        }
        self.buffer = page.records.into_iter();
        true
    }
}

impl Iterator for LazyRecords {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        if self.done {
            return None;
        }
        loop {
            if let Some(row) = self.buffer.next() {
                self.current += 1;
                return Some(row);
            }
            if !self.fill_buffer() {
                self.done = true;
                return None;
            }
        }
    }
}

impl fmt::Debug for LazyRecords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyRecords")
            .field("page_size", &self.page_size)
            .field("next_page", &self.next_page)
            .field("total", &self.total)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

/// Restartable view of one resource's records.
#[derive(Clone)]
pub struct ResourceData {
    total: u64,
    fields: Vec<Field>,
    fetcher: Arc<dyn PageFetcher>,
    page_size: usize,
}

impl ResourceData {
    /// Creates a view with known `total` and `fields`.
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        total: u64,
        fields: Vec<Field>,
        page_size: usize,
    ) -> Self {
        Self {
            total,
            fields,
            fetcher,
            page_size: page_size.max(1),
        }
    }

    /// Probes the first page (size 1) to learn `total` and `fields`.
    ///
    /// # Errors
    /// Returns the fetcher's error when the probe fails.
    pub fn open(fetcher: Arc<dyn PageFetcher>, page_size: usize) -> Result<Self> {
        let probe = fetcher.fetch_page(0, 1)?;
        Ok(Self::new(fetcher, probe.total, probe.fields, page_size))
    }

    /// Total number of records reported by the source.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Column metadata.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Rows per page.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Starts a fresh pass over all records.
    pub fn records(&self) -> LazyRecords {
        LazyRecords::new(Arc::clone(&self.fetcher), self.page_size)
    }
}

impl fmt::Debug for ResourceData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceData")
            .field("total", &self.total)
            .field("fields", &self.fields)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

/// Builds the data view for a resource.
pub trait DataProvider: Send + Sync {
    /// Opens the records of a resource.
    ///
    /// # Errors
    /// Returns an error when no source can be built for the resource.
    fn open(&self, resource: &Resource, page_size: usize) -> Result<ResourceData>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DqError;
    use serde_json::json;
    use std::sync::Mutex;

    fn row(n: u64) -> Row {
        let mut row = Row::new();
        row.insert("n".to_string(), json!(n));
        row
    }

    /// Records the pages requested and serves `pages[page]` with a fixed total.
    struct ScriptedFetcher {
        total: u64,
        pages: Vec<Vec<Row>>,
        calls: Mutex<Vec<usize>>,
    }

    impl PageFetcher for ScriptedFetcher {
        fn fetch_page(&self, page: usize, _page_size: usize) -> Result<Page> {
            self.calls.lock().unwrap().push(page);
            Ok(Page {
                total: self.total,
                records: self.pages.get(page).cloned().unwrap_or_default(),
                fields: vec![Field::new("n", "int")],
            })
        }
    }

    #[test]
    fn test_records_stop_at_total() {
        let fetcher = Arc::new(ScriptedFetcher {
            total: 4,
            pages: vec![vec![row(1), row(2)], vec![row(3), row(4)], vec![row(5)]],
            calls: Mutex::new(Vec::new()),
        });
        let data = ResourceData::new(fetcher.clone(), 4, vec![], 2);

        let rows: Vec<Row> = data.records().collect();
        assert_eq!(rows.len(), 4);
        assert_eq!(*fetcher.calls.lock().unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_records_stop_on_empty_page() {
        // total claims more rows than the source holds
        let fetcher = Arc::new(ScriptedFetcher {
            total: 100,
            pages: vec![vec![row(1), row(2)], vec![row(3)]],
            calls: Mutex::new(Vec::new()),
        });
        let data = ResourceData::new(fetcher.clone(), 100, vec![], 2);

        assert_eq!(data.records().count(), 3);
        assert_eq!(*fetcher.calls.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_records_are_restartable() {
        let fetcher = Arc::new(ScriptedFetcher {
            total: 3,
            pages: vec![vec![row(1), row(2), row(3)]],
            calls: Mutex::new(Vec::new()),
        });
        let data = ResourceData::new(fetcher, 3, vec![], 10);

        assert_eq!(data.records().count(), 3);
        assert_eq!(data.records().count(), 3);
    }

    #[test]
    fn test_total_is_captured_from_first_page() {
        let fetcher = |page: usize, _size: usize| -> Result<Page> {
            Ok(Page {
                // later pages report a shrinking total
                total: if page == 0 { 3 } else { 1 },
                records: if page < 3 { vec![row(page as u64)] } else { vec![] },
                fields: vec![],
            })
        };
        let mut records = LazyRecords::new(Arc::new(fetcher), 1);
        assert_eq!(records.by_ref().count(), 3);
        assert_eq!(records.total(), Some(3));
    }

    #[test]
    fn test_fetch_error_ends_pass() {
        let fetcher = |page: usize, _size: usize| -> Result<Page> {
            if page == 0 {
                Ok(Page {
                    total: 10,
                    records: vec![row(1)],
                    fields: vec![],
                })
            } else {
                Err(DqError::data_fetch("connection reset"))
            }
        };
        let records = LazyRecords::new(Arc::new(fetcher), 1);
        assert_eq!(records.count(), 1);
    }

    #[test]
    fn test_open_probes_first_page() {
        let fetcher = Arc::new(ScriptedFetcher {
            total: 7,
            pages: vec![vec![row(1)]],
            calls: Mutex::new(Vec::new()),
        });
        let data = ResourceData::open(fetcher.clone(), 512).unwrap();
        assert_eq!(data.total(), 7);
        assert_eq!(data.fields(), &[Field::new("n", "int")]);
        assert_eq!(data.page_size(), 512);
        assert_eq!(*fetcher.calls.lock().unwrap(), vec![0]);
    }
}
