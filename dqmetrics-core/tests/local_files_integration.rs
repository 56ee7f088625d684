//! End-to-end tests over files on disk.
//!
//! This test suite covers:
//! - Dataset descriptors read from a catalog directory
//! - Resource data read from uploads and local CSV files
//! - Validity against a Table Schema declared on the resource
//! - Metrics persisted in a SQLite database file

#![cfg(feature = "sqlite")]

use std::path::Path;
use std::sync::Arc;

use dqmetrics_core::report::{package_data_quality, resource_data_quality};
use dqmetrics_core::{
    DataQualityMetrics, DatasetCatalog, DirectoryCatalog, EngineConfig, EntityType,
    LocalFileProvider, MetricsStore, SqliteMetricsStore,
};
use serde_json::json;
use tempfile::TempDir;

fn write(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// Lays out a catalog, an upload and a local CSV under one directory.
fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    // upload "abcdef123" lives at resources/abc/def/123
    write(
        &root.join("storage/resources/abc/def/123"),
        "id,score,day\n1,2.5,2023-01-01\n2,n/a,2023-01-02\n3,4,2023-01-03\n3,4,2023-01-03\n",
    );
    write(
        &root.join("files/flags.csv"),
        "name,checked,measured\nx,yes,2023-01-01 00:00:00\ny,no,2023-01-01 12:00:00\nz,,\n",
    );

    let descriptor = json!({
        "id": "survey",
        "resources": [
            {
                "id": "abcdef123",
                "url_type": "upload",
                "url": "http://portal.example/dataset/survey/resource/abcdef123/download/scores.csv",
                "format": "CSV",
                "last_modified": "2023-01-05T00:00:00",
                "schema": {
                    "fields": [
                        {"name": "id", "type": "integer", "constraints": {"required": true}},
                        {"name": "score", "type": "number"},
                        {"name": "day", "type": "date"}
                    ]
                }
            },
            {
                "id": "flags",
                "url": root.join("files/flags.csv").to_string_lossy(),
                "format": "csv",
                "created": "2023-01-02T00:00:00",
                "dq_accuracy_column": "checked",
                "dq_timeliness_column": "measured"
            }
        ]
    });
    write(&root.join("catalog/survey.json"), &descriptor.to_string());
    write(&root.join("catalog/notes.txt"), "not a descriptor");
    dir
}

#[tokio::test]
async fn test_directory_catalog_reads_descriptors() {
    let dir = workspace();
    let catalog = DirectoryCatalog::new(dir.path().join("catalog"));

    assert_eq!(catalog.list_datasets().await.unwrap(), vec!["survey".to_string()]);
    let dataset = catalog.fetch_dataset("survey").await.unwrap();
    assert_eq!(dataset.resources.len(), 2);
    assert_eq!(dataset.resources[1].package_id.as_deref(), Some("survey"));
    assert_eq!(
        dataset.resources[1].setting(dqmetrics_core::Dimension::Accuracy, "column"),
        Some("checked".to_string())
    );
    assert!(catalog.fetch_dataset("missing").await.is_err());
}

#[tokio::test]
async fn test_sqlite_integration_over_local_files() {
    let dir = workspace();
    let root = dir.path();
    let database = format!("sqlite://{}", root.join("metrics.db").display());

    let store: Arc<dyn MetricsStore> = Arc::new(SqliteMetricsStore::connect(&database).await.unwrap());
    let config = EngineConfig::default()
        .with_page_size(2)
        .with_storage_path(root.join("storage"));
    let provider = LocalFileProvider::new().with_storage_path(root.join("storage"));
    let engine = DataQualityMetrics::new(
        config,
        Arc::new(DirectoryCatalog::new(root.join("catalog"))),
        Arc::new(provider),
        Arc::clone(&store),
    );

    let record = engine.calculate_metrics_for_dataset("survey").await.unwrap();
    assert!(record.id.is_some());

    let upload = resource_data_quality(store.as_ref(), "abcdef123").await.unwrap();
    // 12 cells, all present
    assert_eq!(upload.completeness, Some(100.0));
    // "n/a" breaks the number column; the last row duplicates the third
    assert_eq!(upload.details["validity"].count("total"), 4);
    assert_eq!(upload.details["validity"].count("valid"), 2);
    assert_eq!(upload.validity, Some(50.0));
    // no accuracy column configured
    assert!(upload.details["accuracy"].is_failed());
    assert!(upload.accuracy.is_none());

    let flags = resource_data_quality(store.as_ref(), "flags").await.unwrap();
    assert_eq!(flags.accuracy, Some(50.0));
    assert_eq!(flags.details["timeliness"].count("records"), 2);
    assert_eq!(flags.timeliness.as_deref(), Some("+18:00:00"));

    let dataset = package_data_quality(store.as_ref(), "survey").await.unwrap();
    assert_eq!(dataset.accuracy, Some(50.0));
    assert_eq!(dataset.details["validity"].count("total"), 7);

    // a second store on the same file sees the same records
    let reopened = SqliteMetricsStore::connect(&database).await.unwrap();
    let stored = reopened.get(EntityType::Package, "survey").await.unwrap().unwrap();
    assert_eq!(stored.id, record.id);
    assert_eq!(stored.metrics, record.metrics);
}
