//! Data provider reading uploaded, local and downloadable CSV files.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use url::Url;

use super::fetch::CsvLoader;
use super::remote::HttpDownloader;
use super::{CsvTable, DataProvider, FallbackFetcher, GuardedFetcher, PageFetcher, ResourceData};
use crate::error::{DqError, Result};
use crate::models::Resource;

/// Builds the datastore fetcher for a resource.
pub type DatastoreFactory = Arc<dyn Fn(&Resource) -> Arc<dyn PageFetcher> + Send + Sync>;

/// Where the direct copy of a resource's data lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// File on the local filesystem
    Local(PathBuf),
    /// HTTP(S) location
    Remote {
        /// Download URL
        url: String,
        /// Send the API key with the request
        authorize: bool,
    },
}

/// Resolves resource data from local storage or its download URL.
///
/// Uploaded resources (`url_type == "upload"`) are read from the storage
/// root, laid out as `resources/<id[0..3]>/<id[3..6]>/<id[6..]>`. When the
/// upload is not on this filesystem it is downloaded from the resource `url`
/// with the API key. Other resources are read from their `url`: `file://`
/// URLs and plain paths locally, `http(s)` URLs by download. When a
/// datastore factory is configured, the datastore is tried first and the
/// file is only read after the datastore fails. Fetch failures surface as
/// empty pages.
#[derive(Clone, Default)]
pub struct LocalFileProvider {
    storage_path: Option<PathBuf>,
    datastore: Option<DatastoreFactory>,
    downloader: HttpDownloader,
}

impl LocalFileProvider {
    /// Creates a provider without storage root or datastore.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the uploads root.
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Builder method to set the datastore fetcher factory.
    pub fn with_datastore(mut self, factory: DatastoreFactory) -> Self {
        self.datastore = Some(factory);
        self
    }

    /// Builder method to set the downloader of remote resources.
    pub fn with_downloader(mut self, downloader: HttpDownloader) -> Self {
        self.downloader = downloader;
        self
    }

    /// Returns where the resource data is read from.
    ///
    /// # Errors
    /// Returns a data fetch error when the resource has neither a local copy
    /// nor a usable URL.
    pub fn resolve_source(&self, resource: &Resource) -> Result<DataSource> {
        resolve_source(self.storage_path.as_deref(), resource)
    }
}

impl fmt::Debug for LocalFileProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalFileProvider")
            .field("storage_path", &self.storage_path)
            .field("datastore", &self.datastore.is_some())
            .field("downloader", &self.downloader)
            .finish()
    }
}

impl DataProvider for LocalFileProvider {
    fn open(&self, resource: &Resource, page_size: usize) -> Result<ResourceData> {
        let storage_path = self.storage_path.clone();
        let downloader = self.downloader.clone();
        let target = resource.clone();
        let loader: CsvLoader = Box::new(move || {
            match resolve_source(storage_path.as_deref(), &target)? {
                DataSource::Local(path) => {
                    tracing::debug!("Reading resource {} data from {}", target.id, path.display());
                    CsvTable::from_path(&path)
                }
                DataSource::Remote { url, authorize } => downloader.download_csv(&url, authorize),
            }
        });

        let fetcher = match &self.datastore {
            Some(factory) => FallbackFetcher::new(&resource.id, factory(resource), loader),
            None => FallbackFetcher::direct(&resource.id, loader),
        };
        let guarded = GuardedFetcher::new(&resource.id, Arc::new(fetcher));
        ResourceData::open(Arc::new(guarded), page_size)
    }
}

fn upload_path(root: &Path, resource_id: &str) -> PathBuf {
    let (first, rest) = resource_id.split_at(resource_id.len().min(3));
    let (second, tail) = rest.split_at(rest.len().min(3));
    root.join("resources").join(first).join(second).join(tail)
}

fn resolve_source(storage_path: Option<&Path>, resource: &Resource) -> Result<DataSource> {
    let upload = resource.url_type.as_deref() == Some("upload");
    if upload
        && let Some(root) = storage_path
        && resource.id.is_ascii()
    {
        let path = upload_path(root, &resource.id);
        if path.is_file() {
            return Ok(DataSource::Local(path));
        }
        tracing::debug!(
            "Upload {} not found in local storage, trying the resource URL",
            path.display()
        );
    }

    let location = resource
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| {
            DqError::data_fetch(format!(
                "Resource {} is not available for download",
                resource.id
            ))
        })?;

    match Url::parse(location) {
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map(DataSource::Local)
            .map_err(|()| DqError::data_fetch(format!("Invalid file URL '{}'", location))),
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(DataSource::Remote {
            url: url.to_string(),
            authorize: upload,
        }),
        // single-letter schemes are Windows drive letters
        Ok(url) if url.scheme().len() > 1 => Err(DqError::data_fetch(format!(
            "Resource {} has an unsupported URL scheme ({})",
            resource.id,
            url.scheme()
        ))),
        _ => Ok(DataSource::Local(PathBuf::from(location))),
    }
}
