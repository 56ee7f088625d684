//! Persistence of metrics records.
//!
//! A [`MetricsStore`] keeps exactly one [`MetricsRecord`] per
//! `(entity_type, ref_id)`. Saving is an upsert; the store assigns the record
//! id on first save and refreshes `modified_at` on every save.
//!
//! # Backends
//! - [`InMemoryMetricsStore`]: process-local, used by tests and one-shot runs
//! - [`SqliteMetricsStore`]: SQLite through `sqlx` (feature `sqlite`)

use async_trait::async_trait;

use crate::Result;
use crate::models::{EntityType, MetricsRecord};

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::InMemoryMetricsStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteMetricsStore;

/// Persistence contract for metrics records.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Loads the record of an entity, if one was saved.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be read.
    async fn get(&self, entity_type: EntityType, ref_id: &str) -> Result<Option<MetricsRecord>>;

    /// Inserts or updates the record keyed by its `(entity_type, ref_id)`.
    ///
    /// On return `record.id` holds the persisted id and `record.modified_at`
    /// the save time.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be written.
    async fn save(&self, record: &mut MetricsRecord) -> Result<()>;

    /// Deletes the record of an entity. Returns whether a record existed.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be written.
    async fn delete(&self, entity_type: EntityType, ref_id: &str) -> Result<bool>;

    /// Loads the record of an entity or creates a new unsaved one.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be read.
    async fn get_or_create(&self, entity_type: EntityType, ref_id: &str) -> Result<MetricsRecord> {
        Ok(self
            .get(entity_type, ref_id)
            .await?
            .unwrap_or_else(|| MetricsRecord::new(entity_type, ref_id)))
    }
}
