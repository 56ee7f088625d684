//! Error types for the data quality engine.
//!
//! Ordinary data-quality findings (missing values, unparseable dates, format
//! mismatches) are never errors; they are counted by the metrics. The variants
//! below cover configuration problems, unavailable data, validator failures and
//! persistence failures.

use thiserror::Error;

/// Main error type for data quality operations.
#[derive(Debug, Error)]
pub enum DqError {
    /// Configuration or settings error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Requested entity (dataset, resource, metrics record) does not exist
    #[error("Not found: {entity} '{id}'")]
    NotFound { entity: String, id: String },

    /// Resource data could not be fetched
    #[error("Data fetch failed: {context}")]
    DataFetch {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Table validation could not be performed
    #[error("Validation failed: {context}")]
    Validation { context: String },

    /// Metrics store operation failed
    #[error("Metrics store operation failed: {context}")]
    Store {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Background job could not be scheduled or completed
    #[error("Job failed: {context}")]
    Job { context: String },

    /// I/O operation failed
    #[error("I/O operation failed: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization or deserialization failed
    #[error("Serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results with DqError
pub type Result<T> = std::result::Result<T, DqError>;

impl DqError {
    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a not-found error for the given entity kind and id
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a data fetch error without an underlying cause
    pub fn data_fetch(context: impl Into<String>) -> Self {
        Self::DataFetch {
            context: context.into(),
            source: None,
        }
    }

    /// Creates a data fetch error wrapping the underlying cause
    pub fn data_fetch_failed<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::DataFetch {
            context: context.into(),
            source: Some(Box::new(error)),
        }
    }

    /// Creates a validation error
    pub fn validation(context: impl Into<String>) -> Self {
        Self::Validation {
            context: context.into(),
        }
    }

    /// Creates a store error with context
    pub fn store_failed<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Store {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a job error
    pub fn job(context: impl Into<String>) -> Self {
        Self::Job {
            context: context.into(),
        }
    }

    /// Creates an I/O error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Creates a serialization error with context
    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = DqError::configuration("page_size must be positive");
        assert!(error.to_string().contains("page_size must be positive"));

        let error = DqError::not_found("dataset", "abc");
        assert_eq!(error.to_string(), "Not found: dataset 'abc'");
    }

    #[test]
    fn test_data_fetch_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let error = DqError::data_fetch_failed("resource r1", io);

        assert!(error.to_string().contains("resource r1"));
        assert!(std::error::Error::source(&error).is_some());

        let error = DqError::data_fetch("no url");
        assert!(std::error::Error::source(&error).is_none());
    }
}
