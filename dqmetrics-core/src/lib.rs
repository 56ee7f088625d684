//! Core library of the data quality metrics engine.
//!
//! This crate scores tabular resources along six data quality dimensions
//! (completeness, uniqueness, timeliness, validity, accuracy, consistency),
//! aggregates the scores per dataset and persists them with a
//! last-modified cache.
//!
//! # Guarantees
//! - Resource data is streamed page by page; no metric holds a full table
//! - A failing metric or resource never aborts a dataset calculation
//! - Manual overrides are never replaced by automatic recalculation
//! - Data reaches the engine through page fetchers, local files and HTTP(S)
//!   downloads of CSV resources
//!
//! # Architecture
//! - [`data`]: paginated sources and data providers
//! - [`metrics`]: one [`Metric`] per dimension
//! - [`engine`]: the orchestrator with caching
//! - [`store`] and [`catalog`]: persistence and dataset descriptors
//! - [`report`] and [`scheduler`]: reporting, overrides and background jobs

pub mod catalog;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod formats;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod report;
pub mod scheduler;
pub mod store;
pub mod validation;

// Re-export commonly used types
pub use catalog::{DatasetCatalog, DirectoryCatalog, InMemoryCatalog};
pub use config::{ConfigValidationError, EngineConfig};
pub use data::{
    DataProvider, HttpDownloader, LocalFileProvider, PageFetcher, ResourceData, StaticProvider,
};
pub use engine::DataQualityMetrics;
pub use error::{DqError, Result};
pub use metrics::Metric;
pub use models::{
    Dataset, Dimension, DimensionResult, DimensionResults, EntityType, MetricsRecord, Resource,
};
pub use report::QualityReport;
pub use scheduler::QualityJobQueue;
#[cfg(feature = "sqlite")]
pub use store::SqliteMetricsStore;
pub use store::{InMemoryMetricsStore, MetricsStore};
pub use validation::{SchemaValidator, TableValidator, ValidationReport};
