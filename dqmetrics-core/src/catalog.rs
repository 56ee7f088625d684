//! Dataset descriptors.
//!
//! The engine reads dataset and resource metadata through a
//! [`DatasetCatalog`]. [`DirectoryCatalog`] reads one `<dataset_id>.json`
//! descriptor per dataset from a directory:
//!
//! ```json
//! {
//!   "id": "population",
//!   "resources": [
//!     {"id": "r1", "url": "/data/r1.csv", "format": "CSV",
//!      "last_modified": "2023-01-02T00:00:00", "dq_timeliness_column": "date"}
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{DqError, Result};
use crate::models::Dataset;

/// Source of dataset descriptors.
#[async_trait]
pub trait DatasetCatalog: Send + Sync {
    /// Loads a dataset with its resources.
    ///
    /// # Errors
    /// Returns `NotFound` for unknown datasets, or an error if the
    /// descriptor cannot be read.
    async fn fetch_dataset(&self, dataset_id: &str) -> Result<Dataset>;

    /// Lists the ids of all known datasets.
    ///
    /// # Errors
    /// Returns an error if the catalog cannot be read.
    async fn list_datasets(&self) -> Result<Vec<String>>;
}

/// Catalog holding datasets in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    datasets: BTreeMap<String, Dataset>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to add a dataset.
    pub fn with_dataset(mut self, dataset: Dataset) -> Self {
        self.insert(dataset);
        self
    }

    /// Adds or replaces a dataset.
    pub fn insert(&mut self, dataset: Dataset) {
        self.datasets.insert(dataset.id.clone(), dataset);
    }
}

#[async_trait]
impl DatasetCatalog for InMemoryCatalog {
    async fn fetch_dataset(&self, dataset_id: &str) -> Result<Dataset> {
        self.datasets
            .get(dataset_id)
            .cloned()
            .ok_or_else(|| DqError::not_found("dataset", dataset_id))
    }

    async fn list_datasets(&self) -> Result<Vec<String>> {
        Ok(self.datasets.keys().cloned().collect())
    }
}

/// Catalog reading `<dataset_id>.json` descriptors from a directory.
#[derive(Debug, Clone)]
pub struct DirectoryCatalog {
    root: PathBuf,
}

impl DirectoryCatalog {
    /// Creates a catalog over `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The catalog directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn descriptor_path(&self, dataset_id: &str) -> Result<PathBuf> {
        if dataset_id.is_empty()
            || dataset_id.contains(['/', '\\'])
            || dataset_id.starts_with('.')
        {
            return Err(DqError::configuration(format!(
                "Invalid dataset id '{}'",
                dataset_id
            )));
        }
        Ok(self.root.join(format!("{dataset_id}.json")))
    }
}

#[async_trait]
impl DatasetCatalog for DirectoryCatalog {
    async fn fetch_dataset(&self, dataset_id: &str) -> Result<Dataset> {
        let path = self.descriptor_path(dataset_id)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DqError::not_found("dataset", dataset_id));
            }
            Err(e) => {
                return Err(DqError::io(
                    format!("Failed to read descriptor {}", path.display()),
                    e,
                ));
            }
        };

        let mut dataset: Dataset = serde_json::from_str(&content).map_err(|e| {
            DqError::serialization(format!("dataset descriptor {}", path.display()), e)
        })?;
        if dataset.id.is_empty() {
            dataset.id = dataset_id.to_string();
        }
        for resource in &mut dataset.resources {
            if resource.package_id.is_none() {
                resource.package_id = Some(dataset.id.clone());
            }
        }
        tracing::debug!(
            "Loaded dataset {} with {} resources",
            dataset.id,
            dataset.resources.len()
        );
        Ok(dataset)
    }

    async fn list_datasets(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(|e| {
            DqError::io(format!("Failed to list {}", self.root.display()), e)
        })?;

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DqError::io(format!("Failed to list {}", self.root.display()), e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Resource;

    #[tokio::test]
    async fn test_in_memory_catalog() {
        let catalog = InMemoryCatalog::new().with_dataset(Dataset {
            id: "d1".to_string(),
            resources: vec![Resource::new("r1")],
        });
        assert_eq!(catalog.fetch_dataset("d1").await.unwrap().resources.len(), 1);
        assert!(matches!(
            catalog.fetch_dataset("d2").await,
            Err(DqError::NotFound { .. })
        ));
        assert_eq!(catalog.list_datasets().await.unwrap(), vec!["d1".to_string()]);
    }

    #[test]
    fn test_descriptor_path_rejects_traversal() {
        let catalog = DirectoryCatalog::new("/srv/catalog");
        assert!(catalog.descriptor_path("../etc/passwd").is_err());
        assert!(catalog.descriptor_path("").is_err());
        assert_eq!(
            catalog.descriptor_path("d1").unwrap(),
            PathBuf::from("/srv/catalog/d1.json")
        );
    }
}
