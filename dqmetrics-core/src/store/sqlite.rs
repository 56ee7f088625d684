//! SQLite-backed metrics store.
//!
//! Records live in the `data_quality_metrics` table, one row per
//! `(type, ref_id)`. The per-dimension detail map is stored as JSON text.
//!
//! # Connection Strings
//! - `sqlite:///path/to/metrics.db` or `sqlite://./relative.db`
//! - a plain file path ending in `.db`, `.sqlite` or `.sqlite3`
//! - `sqlite::memory:` or `:memory:` for a private in-memory database

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::MetricsStore;
use crate::error::{DqError, Result};
use crate::models::{DimensionResults, EntityType, MetricsRecord};

const CREATE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS data_quality_metrics (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    ref_id TEXT NOT NULL,
    resource_last_modified TEXT,
    completeness REAL,
    uniqueness REAL,
    timeliness TEXT,
    validity REAL,
    accuracy REAL,
    consistency REAL,
    metrics TEXT NOT NULL,
    created_at TEXT NOT NULL,
    modified_at TEXT NOT NULL
)";

const CREATE_INDEX: &str = r"
CREATE UNIQUE INDEX IF NOT EXISTS idx_data_quality_metrics_type_ref
    ON data_quality_metrics (type, ref_id)";

const UPSERT: &str = r"
INSERT INTO data_quality_metrics (
    id, type, ref_id, resource_last_modified,
    completeness, uniqueness, timeliness, validity, accuracy, consistency,
    metrics, created_at, modified_at
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
ON CONFLICT (type, ref_id) DO UPDATE SET
    resource_last_modified = excluded.resource_last_modified,
    completeness = excluded.completeness,
    uniqueness = excluded.uniqueness,
    timeliness = excluded.timeliness,
    validity = excluded.validity,
    accuracy = excluded.accuracy,
    consistency = excluded.consistency,
    metrics = excluded.metrics,
    modified_at = excluded.modified_at
RETURNING id, created_at";

/// Metrics store persisting records in SQLite.
#[derive(Debug, Clone)]
pub struct SqliteMetricsStore {
    pool: SqlitePool,
}

impl SqliteMetricsStore {
    /// Opens (creating if needed) the database and its table.
    ///
    /// # Arguments
    /// * `connection_string` - SQLite URL, file path or `:memory:`
    ///
    /// # Errors
    /// Returns an error if the connection string is invalid or the database
    /// cannot be opened or initialized.
    pub async fn connect(connection_string: &str) -> Result<Self> {
        let normalized = normalize_connection_string(connection_string);
        let in_memory = normalized.contains(":memory:") || normalized.contains("mode=memory");

        let options = SqliteConnectOptions::from_str(&normalized)
            .map_err(|e| {
                DqError::configuration(format!("Invalid SQLite connection string: {}", e))
            })?
            .create_if_missing(true);

        // An in-memory database lives as long as its single connection
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| DqError::store_failed("Failed to open SQLite database", e))?;

        let store = Self { pool };
        store.initialize().await?;
        tracing::debug!("Opened metrics store at {}", connection_string);
        Ok(store)
    }

    /// Wraps an existing pool; the table is created if missing.
    ///
    /// # Errors
    /// Returns an error if the table cannot be created.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Closes the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn initialize(&self) -> Result<()> {
        for statement in [CREATE_TABLE, CREATE_INDEX] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| DqError::store_failed("Failed to create metrics table", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl MetricsStore for SqliteMetricsStore {
    async fn get(&self, entity_type: EntityType, ref_id: &str) -> Result<Option<MetricsRecord>> {
        let row = sqlx::query(
            "SELECT id, type, ref_id, resource_last_modified, completeness, uniqueness, \
             timeliness, validity, accuracy, consistency, metrics, created_at, modified_at \
             FROM data_quality_metrics WHERE type = ? AND ref_id = ?",
        )
        .bind(entity_type.as_str())
        .bind(ref_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DqError::store_failed(format!("Failed to load metrics of {entity_type} '{ref_id}'"), e))?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn save(&self, record: &mut MetricsRecord) -> Result<()> {
        let id = record.id.unwrap_or_else(Uuid::new_v4);
        let metrics = serde_json::to_string(&record.metrics)
            .map_err(|e| DqError::serialization("metrics detail", e))?;
        let now = Utc::now();

        let row = sqlx::query(UPSERT)
            .bind(id.to_string())
            .bind(record.entity_type.as_str())
            .bind(&record.ref_id)
            .bind(record.resource_last_modified)
            .bind(record.completeness)
            .bind(record.uniqueness)
            .bind(record.timeliness.as_deref())
            .bind(record.validity)
            .bind(record.accuracy)
            .bind(record.consistency)
            .bind(metrics)
            .bind(record.created_at)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                DqError::store_failed(
                    format!("Failed to save metrics of {} '{}'", record.entity_type, record.ref_id),
                    e,
                )
            })?;

        let stored_id: String = row
            .try_get("id")
            .map_err(|e| DqError::store_failed("Failed to read record id", e))?;
        record.id = Some(parse_id(&stored_id)?);
        record.created_at = row
            .try_get("created_at")
            .map_err(|e| DqError::store_failed("Failed to read record creation time", e))?;
        record.modified_at = now;
        Ok(())
    }

    async fn delete(&self, entity_type: EntityType, ref_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM data_quality_metrics WHERE type = ? AND ref_id = ?")
            .bind(entity_type.as_str())
            .bind(ref_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DqError::store_failed(format!("Failed to delete metrics of {entity_type} '{ref_id}'"), e)
            })?;
        Ok(result.rows_affected() > 0)
    }
}

fn record_from_row(row: &SqliteRow) -> Result<MetricsRecord> {
    let column_error = |column: &str| {
        let column = column.to_string();
        move |e: sqlx::Error| DqError::store_failed(format!("Failed to read column '{column}'"), e)
    };

    let id: String = row.try_get("id").map_err(column_error("id"))?;
    let entity_type: String = row.try_get("type").map_err(column_error("type"))?;
    let metrics: String = row.try_get("metrics").map_err(column_error("metrics"))?;
    let metrics: DimensionResults = serde_json::from_str(&metrics)
        .map_err(|e| DqError::serialization("stored metrics detail", e))?;
    let resource_last_modified: Option<NaiveDateTime> = row
        .try_get("resource_last_modified")
        .map_err(column_error("resource_last_modified"))?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(column_error("created_at"))?;
    let modified_at: DateTime<Utc> = row
        .try_get("modified_at")
        .map_err(column_error("modified_at"))?;

    Ok(MetricsRecord {
        id: Some(parse_id(&id)?),
        entity_type: entity_type.parse()?,
        ref_id: row.try_get("ref_id").map_err(column_error("ref_id"))?,
        resource_last_modified,
        completeness: row.try_get("completeness").map_err(column_error("completeness"))?,
        uniqueness: row.try_get("uniqueness").map_err(column_error("uniqueness"))?,
        timeliness: row.try_get("timeliness").map_err(column_error("timeliness"))?,
        validity: row.try_get("validity").map_err(column_error("validity"))?,
        accuracy: row.try_get("accuracy").map_err(column_error("accuracy"))?,
        consistency: row.try_get("consistency").map_err(column_error("consistency"))?,
        metrics,
        created_at,
        modified_at,
    })
}

fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|e| DqError::store_failed(format!("Invalid record id '{id}'"), e))
}

/// Normalizes a connection string to the SQLite URL form.
fn normalize_connection_string(connection_string: &str) -> String {
    if connection_string == ":memory:" {
        return "sqlite::memory:".to_string();
    }

    if connection_string.starts_with("sqlite:") {
        return connection_string.to_string();
    }

    format!("sqlite://{}", connection_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DimensionResult;

    #[test]
    fn test_normalize_connection_string() {
        assert_eq!(normalize_connection_string(":memory:"), "sqlite::memory:");
        assert_eq!(
            normalize_connection_string("sqlite:///path/metrics.db"),
            "sqlite:///path/metrics.db"
        );
        assert_eq!(
            normalize_connection_string("/path/to/metrics.db"),
            "sqlite:///path/to/metrics.db"
        );
    }

    #[tokio::test]
    async fn test_sqlite_memory_roundtrip() {
        let store = SqliteMetricsStore::connect(":memory:").await.unwrap();

        let mut record = MetricsRecord::new(EntityType::Resource, "r1");
        record.resource_last_modified =
            NaiveDateTime::parse_from_str("2023-01-02T03:04:05", "%Y-%m-%dT%H:%M:%S").ok();
        record.completeness = Some(83.5);
        record.timeliness = Some("+1 day, 0:00:00".to_string());
        record.metrics.insert(
            "completeness".to_string(),
            DimensionResult::new().with("value", 83.5).with("total", 6),
        );
        store.save(&mut record).await.unwrap();
        let id = record.id.unwrap();

        let loaded = store.get(EntityType::Resource, "r1").await.unwrap().unwrap();
        assert_eq!(loaded.id, Some(id));
        assert_eq!(loaded.completeness, Some(83.5));
        assert_eq!(loaded.uniqueness, None);
        assert_eq!(loaded.timeliness.as_deref(), Some("+1 day, 0:00:00"));
        assert_eq!(loaded.resource_last_modified, record.resource_last_modified);
        assert_eq!(loaded.metrics["completeness"].count("total"), 6);

        // upsert keeps the stored identity
        let mut fresh = MetricsRecord::new(EntityType::Resource, "r1");
        store.save(&mut fresh).await.unwrap();
        assert_eq!(fresh.id, Some(id));
        let loaded = store.get(EntityType::Resource, "r1").await.unwrap().unwrap();
        assert_eq!(loaded.completeness, None);

        assert!(store.delete(EntityType::Resource, "r1").await.unwrap());
        assert!(store.get(EntityType::Resource, "r1").await.unwrap().is_none());
    }
}
