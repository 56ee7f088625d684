use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::MetricsStore;
use crate::Result;
use crate::models::{EntityType, MetricsRecord};

/// Process-local metrics store.
#[derive(Debug, Default)]
pub struct InMemoryMetricsStore {
    records: RwLock<HashMap<(EntityType, String), MetricsRecord>>,
}

impl InMemoryMetricsStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns true when no record is stored.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl MetricsStore for InMemoryMetricsStore {
    async fn get(&self, entity_type: EntityType, ref_id: &str) -> Result<Option<MetricsRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&(entity_type, ref_id.to_string())).cloned())
    }

    async fn save(&self, record: &mut MetricsRecord) -> Result<()> {
        let mut records = self.records.write().await;
        let key = (record.entity_type, record.ref_id.clone());
        if let Some(existing) = records.get(&key) {
            record.id = existing.id;
            record.created_at = existing.created_at;
        }
        if record.id.is_none() {
            record.id = Some(Uuid::new_v4());
        }
        record.modified_at = Utc::now();
        records.insert(key, record.clone());
        Ok(())
    }

    async fn delete(&self, entity_type: EntityType, ref_id: &str) -> Result<bool> {
        let mut records = self.records.write().await;
        Ok(records.remove(&(entity_type, ref_id.to_string())).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DimensionResult, DimensionResults};

    #[tokio::test]
    async fn test_save_assigns_id_once() {
        let store = InMemoryMetricsStore::new();
        let mut record = MetricsRecord::new(EntityType::Resource, "r1");
        store.save(&mut record).await.unwrap();
        let id = record.id.unwrap();

        record.completeness = Some(50.0);
        store.save(&mut record).await.unwrap();
        assert_eq!(record.id, Some(id));

        // a fresh record for the same key keeps the stored identity
        let mut duplicate = MetricsRecord::new(EntityType::Resource, "r1");
        store.save(&mut duplicate).await.unwrap();
        assert_eq!(duplicate.id, Some(id));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_entity_types_are_separate_keys() {
        let store = InMemoryMetricsStore::new();
        let mut resource = MetricsRecord::new(EntityType::Resource, "x");
        let mut package = MetricsRecord::new(EntityType::Package, "x");
        let mut results = DimensionResults::new();
        results.insert("completeness".into(), DimensionResult::new().with("value", 10.0));
        package.apply_results(results);

        store.save(&mut resource).await.unwrap();
        store.save(&mut package).await.unwrap();
        assert_ne!(resource.id, package.id);

        let loaded = store.get(EntityType::Package, "x").await.unwrap().unwrap();
        assert_eq!(loaded.completeness, Some(10.0));
        assert!(store.get(EntityType::Resource, "y").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_and_get_or_create() {
        let store = InMemoryMetricsStore::new();
        let mut record = store.get_or_create(EntityType::Package, "d1").await.unwrap();
        assert!(record.id.is_none());
        store.save(&mut record).await.unwrap();

        assert!(store.delete(EntityType::Package, "d1").await.unwrap());
        assert!(!store.delete(EntityType::Package, "d1").await.unwrap());
        assert!(store.is_empty().await);
    }
}
