//! Fetcher combinators: error guarding and datastore-to-file fallback.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::{CsvTable, Page, PageFetcher};
use crate::Result;

/// Loads the direct (file) copy of a resource's data.
pub type CsvLoader = Box<dyn Fn() -> Result<CsvTable> + Send + Sync>;

/// Converts fetch errors into empty pages.
///
/// A failing source then reads as a resource without rows, which truncates
/// the data instead of failing the whole calculation.
pub struct GuardedFetcher {
    resource_id: String,
    inner: Arc<dyn PageFetcher>,
}

impl GuardedFetcher {
    /// Wraps a fetcher for the given resource.
    pub fn new(resource_id: impl Into<String>, inner: Arc<dyn PageFetcher>) -> Self {
        Self {
            resource_id: resource_id.into(),
            inner,
        }
    }
}

impl fmt::Debug for GuardedFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedFetcher")
            .field("resource_id", &self.resource_id)
            .finish_non_exhaustive()
    }
}

impl PageFetcher for GuardedFetcher {
    fn fetch_page(&self, page: usize, page_size: usize) -> Result<Page> {
        match self.inner.fetch_page(page, page_size) {
            Ok(page) => Ok(page),
            Err(e) => {
                tracing::error!(
                    "Failed to fetch page {} (limit {}) of resource {}: {}",
                    page,
                    page_size,
                    self.resource_id,
                    e
                );
                Ok(Page::empty())
            }
        }
    }
}

/// Reads from a primary source until it fails once, then from a direct copy.
///
/// The switch is permanent: after the first primary error every page is
/// served from the CSV table produced by `loader`. The table is loaded on
/// first use and kept; a failed load is retried on the next fetch. Without a
/// primary the direct copy is used from the start.
pub struct FallbackFetcher {
    resource_id: String,
    primary: Option<Arc<dyn PageFetcher>>,
    loader: CsvLoader,
    use_direct: AtomicBool,
    direct: Mutex<Option<Arc<CsvTable>>>,
}

impl FallbackFetcher {
    /// Creates a fetcher preferring `primary` and falling back to `loader`.
    pub fn new(
        resource_id: impl Into<String>,
        primary: Arc<dyn PageFetcher>,
        loader: CsvLoader,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            primary: Some(primary),
            loader,
            use_direct: AtomicBool::new(false),
            direct: Mutex::new(None),
        }
    }

    /// Creates a fetcher reading only the direct copy.
    pub fn direct(resource_id: impl Into<String>, loader: CsvLoader) -> Self {
        Self {
            resource_id: resource_id.into(),
            primary: None,
            loader,
            use_direct: AtomicBool::new(true),
            direct: Mutex::new(None),
        }
    }

    /// Returns true once the fetcher has switched to the direct copy.
    pub fn is_direct(&self) -> bool {
        self.use_direct.load(Ordering::Acquire)
    }

    fn direct_table(&self) -> Result<Arc<CsvTable>> {
        let mut direct = self.direct.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(table) = direct.as_ref() {
            return Ok(Arc::clone(table));
        }
        let table = Arc::new((self.loader)()?);
        tracing::debug!("Resource {} data loaded directly", self.resource_id);
        *direct = Some(Arc::clone(&table));
        Ok(table)
    }
}

impl fmt::Debug for FallbackFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackFetcher")
            .field("resource_id", &self.resource_id)
            .field("use_direct", &self.is_direct())
            .finish_non_exhaustive()
    }
}

impl PageFetcher for FallbackFetcher {
    fn fetch_page(&self, page: usize, page_size: usize) -> Result<Page> {
        if !self.is_direct()
            && let Some(primary) = &self.primary
        {
            match primary.fetch_page(page, page_size) {
                Ok(page) => return Ok(page),
                Err(e) => {
                    tracing::warn!(
                        "Failed to load resource {} data from the datastore: {}. \
                         Switching to direct download",
                        self.resource_id,
                        e
                    );
                    self.use_direct.store(true, Ordering::Release);
                }
            }
        }
        self.direct_table()?.fetch_page(page, page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DqError;
    use std::sync::atomic::AtomicUsize;

    fn failing(page: usize, _size: usize) -> Result<Page> {
        Err(DqError::data_fetch(format!("page {page} unavailable")))
    }

    #[test]
    fn test_guarded_fetcher_returns_empty_page() {
        let guarded = GuardedFetcher::new("r1", Arc::new(failing));
        let page = guarded.fetch_page(0, 10).unwrap();
        assert_eq!(page, Page::empty());
    }

    #[test]
    fn test_fallback_switches_permanently() {
        let primary_calls = Arc::new(AtomicUsize::new(0));
        let calls = Arc::clone(&primary_calls);
        let primary = move |page: usize, _size: usize| -> Result<Page> {
            calls.fetch_add(1, Ordering::SeqCst);
            if page == 0 {
                Ok(Page {
                    total: 1,
                    records: vec![],
                    fields: vec![],
                })
            } else {
                Err(DqError::data_fetch("datastore gone"))
            }
        };
        let loads = Arc::new(AtomicUsize::new(0));
        let load_count = Arc::clone(&loads);
        let loader: CsvLoader = Box::new(move || {
            load_count.fetch_add(1, Ordering::SeqCst);
            CsvTable::from_reader("a\n1\n2\n".as_bytes())
        });

        let fetcher = FallbackFetcher::new("r1", Arc::new(primary), loader);
        assert_eq!(fetcher.fetch_page(0, 1).unwrap().total, 1);
        assert!(!fetcher.is_direct());

        let page = fetcher.fetch_page(1, 1).unwrap();
        assert!(fetcher.is_direct());
        assert_eq!(page.total, 2);
        assert_eq!(page.records.len(), 1);

        // page 0 now comes from the direct copy as well
        assert_eq!(fetcher.fetch_page(0, 1).unwrap().total, 2);
        assert_eq!(primary_calls.load(Ordering::SeqCst), 2);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_direct_only_loads_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let load_count = Arc::clone(&loads);
        let loader: CsvLoader = Box::new(move || {
            load_count.fetch_add(1, Ordering::SeqCst);
            CsvTable::from_reader("a\n1\n".as_bytes())
        });
        let fetcher = FallbackFetcher::direct("r1", loader);
        assert!(fetcher.is_direct());
        assert_eq!(fetcher.fetch_page(0, 5).unwrap().records.len(), 1);
        assert_eq!(fetcher.fetch_page(1, 5).unwrap().records.len(), 0);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fallback_load_failure_propagates() {
        let loader: CsvLoader = Box::new(|| Err(DqError::data_fetch("no file")));
        let fetcher = FallbackFetcher::new("r1", Arc::new(failing), loader);
        assert!(fetcher.fetch_page(0, 10).is_err());

        let guarded = GuardedFetcher::new("r1", Arc::new(fetcher));
        assert_eq!(guarded.fetch_page(0, 10).unwrap(), Page::empty());
    }
}
