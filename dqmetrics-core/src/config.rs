//! Engine configuration.
//!
//! This module provides configuration for the metrics orchestrator and the
//! background job queue: page size of the data sources, cache bypass,
//! the active dimensions, job concurrency and the uploads root.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{DqError, Result};
use crate::models::Dimension;

/// Default number of rows fetched per page.
pub const DEFAULT_PAGE_SIZE: usize = 512;

/// Default number of dataset checks run concurrently by the job queue.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;

/// Configuration for the metrics orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rows fetched per page by the paginated data sources
    pub page_size: usize,
    /// Recalculate every non-manual dimension even when cached
    pub force_recalculate: bool,
    /// Dimensions to calculate, in order
    pub dimensions: Vec<Dimension>,
    /// Maximum dataset checks running at once in the job queue
    pub max_concurrent_jobs: usize,
    /// Root directory of uploaded resource files
    pub storage_path: Option<PathBuf>,
}

/// Validation errors for engine configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("page_size must be greater than 0")]
    InvalidPageSize,
    #[error("max_concurrent_jobs must be greater than 0")]
    InvalidConcurrency,
    #[error("at least one dimension must be configured")]
    NoDimensions,
    #[error("dimension '{0}' is configured more than once")]
    DuplicateDimension(Dimension),
}

impl From<ConfigValidationError> for DqError {
    fn from(err: ConfigValidationError) -> Self {
        DqError::configuration(err.to_string())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            force_recalculate: false,
            dimensions: Dimension::ALL.to_vec(),
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            storage_path: None,
        }
    }
}

impl EngineConfig {
    /// Creates a new engine config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a config from a JSON file; missing keys take their defaults.
    ///
    /// # Errors
    /// Returns an I/O error when the file cannot be read, a serialization
    /// error when it is not valid JSON, and a configuration error when the
    /// loaded values do not validate.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| DqError::io(format!("reading config {}", path.display()), e))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| DqError::serialization(format!("parsing config {}", path.display()), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Builder method to set the page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        if page_size == 0 {
            tracing::warn!("page_size 0 raised to 1");
        }
        self.page_size = page_size.max(1);
        self
    }

    /// Builder method to bypass cached results.
    pub fn with_force_recalculate(mut self, force: bool) -> Self {
        self.force_recalculate = force;
        self
    }

    /// Builder method to restrict the calculated dimensions.
    pub fn with_dimensions(mut self, dimensions: Vec<Dimension>) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Builder method to set the job queue concurrency.
    pub fn with_max_concurrent_jobs(mut self, jobs: usize) -> Self {
        if jobs == 0 {
            tracing::warn!("max_concurrent_jobs 0 raised to 1");
        }
        self.max_concurrent_jobs = jobs.max(1);
        self
    }

    /// Builder method to set the uploads root.
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        if self.page_size == 0 {
            return Err(ConfigValidationError::InvalidPageSize);
        }
        if self.max_concurrent_jobs == 0 {
            return Err(ConfigValidationError::InvalidConcurrency);
        }
        if self.dimensions.is_empty() {
            return Err(ConfigValidationError::NoDimensions);
        }
        let mut seen = HashSet::new();
        for dimension in &self.dimensions {
            if !seen.insert(*dimension) {
                return Err(ConfigValidationError::DuplicateDimension(*dimension));
            }
        }
        Ok(())
    }
}
