//! HTTP(S) download of CSV resources.

use std::fmt;
use std::time::Duration;

use ureq::Agent;

use super::CsvTable;
use crate::error::{DqError, Result};

/// Default time allowed for one resource download.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Downloads resource files over HTTP(S).
///
/// Non-success status codes are errors. The API key, when set, is sent as
/// the `Authorization` header and never logged.
#[derive(Clone)]
pub struct HttpDownloader {
    agent: Agent,
    api_key: Option<String>,
}

impl HttpDownloader {
    /// Creates a downloader with the default timeout.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_DOWNLOAD_TIMEOUT)
    }

    /// Creates a downloader with a global per-request timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: config.into(),
            api_key: None,
        }
    }

    /// Builder method to set the API key sent with authorized downloads.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        self.api_key = (!api_key.trim().is_empty()).then_some(api_key);
        self
    }

    /// Returns true if an API key is configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Downloads and parses a CSV file.
    ///
    /// # Arguments
    /// * `url` - Location of the file
    /// * `authorize` - Send the API key with the request
    ///
    /// # Errors
    /// Returns a data fetch error when the request fails, the server answers
    /// with a non-success status, or the body is not valid CSV.
    pub fn download_csv(&self, url: &str, authorize: bool) -> Result<CsvTable> {
        tracing::debug!("Downloading resource data from {}", url);
        let mut request = self.agent.get(url);
        if authorize && let Some(api_key) = &self.api_key {
            request = request.header("Authorization", api_key.as_str());
        }
        let response = request
            .call()
            .map_err(|e| DqError::data_fetch_failed(format!("downloading {}", url), e))?;
        CsvTable::from_reader(response.into_body().into_reader())
    }

    /// Downloads a JSON document without authorization.
    ///
    /// # Errors
    /// Returns a data fetch error when the request fails and a
    /// serialization error when the body is not JSON.
    pub fn fetch_json(&self, url: &str) -> Result<serde_json::Value> {
        tracing::debug!("Fetching JSON document {}", url);
        let body = self
            .agent
            .get(url)
            .call()
            .and_then(|response| response.into_body().read_to_string())
            .map_err(|e| DqError::data_fetch_failed(format!("downloading {}", url), e))?;
        serde_json::from_str(&body)
            .map_err(|e| DqError::serialization(format!("parsing {}", url), e))
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HttpDownloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpDownloader")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}
