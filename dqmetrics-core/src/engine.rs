//! Metrics orchestrator.
//!
//! [`DataQualityMetrics`] ties the collaborators together: it reads dataset
//! descriptors from a [`DatasetCatalog`], opens resource data through a
//! [`DataProvider`], runs every configured [`Metric`] and persists the results
//! in a [`MetricsStore`].
//!
//! # Caching
//! A resource is recalculated only when it changed since the stored record
//! was computed (`resource_last_modified`). Within an unchanged resource,
//! failed dimensions are retried and the others reused. Manual overrides are
//! never recalculated, whether the resource changed or not.
//!
//! # Example
//! ```rust,ignore
//! use std::sync::Arc;
//! use dqmetrics_core::{DataQualityMetrics, EngineConfig};
//!
//! let engine = DataQualityMetrics::new(EngineConfig::default(), catalog, provider, store);
//! let record = engine.calculate_metrics_for_dataset("population").await?;
//! println!("Completeness: {:?}", record.completeness);
//! ```

use std::fmt;
use std::sync::Arc;

use crate::Result;
use crate::catalog::DatasetCatalog;
use crate::config::EngineConfig;
use crate::data::DataProvider;
use crate::metrics::{Metric, default_metrics, metric_for};
use crate::models::{DimensionResult, DimensionResults, EntityType, MetricsRecord, Resource};
use crate::store::MetricsStore;
use crate::validation::TableValidator;

/// Orchestrates per-resource and per-dataset metric calculation.
#[derive(Clone)]
pub struct DataQualityMetrics {
    config: EngineConfig,
    metrics: Vec<Arc<dyn Metric>>,
    catalog: Arc<dyn DatasetCatalog>,
    provider: Arc<dyn DataProvider>,
    store: Arc<dyn MetricsStore>,
}

impl fmt::Debug for DataQualityMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.metrics.iter().map(|m| m.name()).collect();
        f.debug_struct("DataQualityMetrics")
            .field("config", &self.config)
            .field("metrics", &names)
            .finish_non_exhaustive()
    }
}

impl DataQualityMetrics {
    /// Creates an orchestrator running the metrics of `config.dimensions`.
    pub fn new(
        config: EngineConfig,
        catalog: Arc<dyn DatasetCatalog>,
        provider: Arc<dyn DataProvider>,
        store: Arc<dyn MetricsStore>,
    ) -> Self {
        let metrics = default_metrics(&config.dimensions);
        Self {
            config,
            metrics,
            catalog,
            provider,
            store,
        }
    }

    /// Builder method to validate rows with a custom validator.
    pub fn with_validator(mut self, validator: Arc<dyn TableValidator>) -> Self {
        self.metrics = self
            .config
            .dimensions
            .iter()
            .map(|d| metric_for(*d, Arc::clone(&validator)))
            .collect();
        self
    }

    /// Builder method to replace the metric set.
    pub fn with_metrics(mut self, metrics: Vec<Arc<dyn Metric>>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the metrics store.
    pub fn store(&self) -> &Arc<dyn MetricsStore> {
        &self.store
    }

    /// Returns the dataset catalog.
    pub fn catalog(&self) -> &Arc<dyn DatasetCatalog> {
        &self.catalog
    }

    /// Names of the active metrics, in calculation order.
    pub fn metric_names(&self) -> Vec<&'static str> {
        self.metrics.iter().map(|m| m.name()).collect()
    }

    /// Calculates the metrics of every resource of a dataset, then the
    /// dataset-level cumulative metrics.
    ///
    /// A resource that cannot be processed is logged and contributes an
    /// empty result map; it never aborts the dataset.
    ///
    /// # Arguments
    /// * `dataset_id` - Id of the dataset in the catalog
    ///
    /// # Returns
    /// The saved dataset-level record.
    ///
    /// # Errors
    /// Returns an error if the dataset cannot be loaded or the dataset
    /// record cannot be persisted.
    pub async fn calculate_metrics_for_dataset(&self, dataset_id: &str) -> Result<MetricsRecord> {
        let dataset = self.catalog.fetch_dataset(dataset_id).await?;
        tracing::debug!(
            "Calculating data quality of dataset {} ({} resources)",
            dataset.id,
            dataset.resources.len()
        );

        let mut results = Vec::with_capacity(dataset.resources.len());
        for resource in &dataset.resources {
            match self.calculate_metrics_for_resource(resource).await {
                Ok(resource_results) => results.push(resource_results),
                Err(e) => {
                    tracing::warn!(
                        "Failed to calculate data quality of resource {}: {}",
                        resource.id,
                        e
                    );
                    results.push(DimensionResults::new());
                }
            }
        }

        let record = self
            .calculate_cumulative_metrics(&dataset.id, &dataset.resources, &results)
            .await?;
        tracing::info!("Calculated data quality metrics of dataset {}", dataset.id);
        Ok(record)
    }

    /// Calculates and persists the metrics of one resource.
    ///
    /// # Arguments
    /// * `resource` - Resource descriptor, including its `dq_*` settings
    ///
    /// # Returns
    /// The per-dimension results of the resource.
    ///
    /// # Errors
    /// Returns an error if the resource has no usable modification time or
    /// the store cannot be read or written. Metric failures are reported as
    /// failed results, not errors.
    pub async fn calculate_metrics_for_resource(
        &self,
        resource: &Resource,
    ) -> Result<DimensionResults> {
        let last_modified = resource.last_modified_at()?;
        let stored = self.store.get(EntityType::Resource, &resource.id).await?;
        let cache_hit = stored
            .as_ref()
            .and_then(|r| r.resource_last_modified)
            .is_some_and(|calculated_for| calculated_for >= last_modified);
        let reuse_cached = cache_hit && !self.config.force_recalculate;

        let mut record =
            stored.unwrap_or_else(|| MetricsRecord::new(EntityType::Resource, &resource.id));

        if reuse_cached && self.all_cached(&record.metrics) {
            tracing::debug!("Metrics of resource {} are up to date", resource.id);
            return Ok(record.metrics);
        }

        if !cache_hit && !record.metrics.is_empty() {
            tracing::debug!("Resource {} changed, discarding stored metrics", resource.id);
            record.discard_calculated();
        }

        let mut results = record.metrics.clone();
        for metric in &self.metrics {
            let name = metric.name();
            if let Some(cached) = record.metrics.get(name) {
                if cached.is_manual() {
                    tracing::debug!("Keeping manual {} of resource {}", name, resource.id);
                    continue;
                }
                if reuse_cached && is_reusable(cached) {
                    continue;
                }
            }

            let result = self.run_metric(Arc::clone(metric), resource).await;
            record.clear_scalar(metric.dimension());
            results.insert(name.to_string(), result);
        }

        record.resource_last_modified = Some(last_modified);
        record.apply_results(results.clone());
        self.store.save(&mut record).await?;
        Ok(results)
    }

    /// Reduces per-resource results into the dataset record and saves it.
    ///
    /// `results` is parallel to `resources`. The dataset record is rebuilt
    /// from the configured dimensions; manual dataset-level details are kept
    /// as they are.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read or written.
    pub async fn calculate_cumulative_metrics(
        &self,
        dataset_id: &str,
        resources: &[Resource],
        results: &[DimensionResults],
    ) -> Result<MetricsRecord> {
        let mut record = self
            .store
            .get_or_create(EntityType::Package, dataset_id)
            .await?;
        record.discard_calculated();

        let mut cumulative = record.metrics.clone();
        for metric in &self.metrics {
            let name = metric.name();
            if record.metrics.get(name).is_some_and(DimensionResult::is_manual) {
                tracing::debug!("Keeping manual {} of dataset {}", name, dataset_id);
                continue;
            }
            let per_resource: Vec<DimensionResult> = results
                .iter()
                .map(|r| r.get(name).cloned().unwrap_or_default())
                .collect();
            let result = metric.calculate_cumulative_metric(resources, &per_resource);
            record.clear_scalar(metric.dimension());
            cumulative.insert(name.to_string(), result);
        }

        record.apply_results(cumulative);
        self.store.save(&mut record).await?;
        Ok(record)
    }

    fn all_cached(&self, cached: &DimensionResults) -> bool {
        self.metrics.iter().all(|metric| {
            cached
                .get(metric.name())
                .is_some_and(|d| d.is_manual() || is_reusable(d))
        })
    }

    /// Runs one metric on the blocking pool over a fresh data view.
    async fn run_metric(&self, metric: Arc<dyn Metric>, resource: &Resource) -> DimensionResult {
        let provider = Arc::clone(&self.provider);
        let target = resource.clone();
        let page_size = self.config.page_size;
        let name = metric.name();

        let outcome = tokio::task::spawn_blocking(move || {
            let data = provider.open(&target, page_size)?;
            metric.calculate_metric(&target, &data)
        })
        .await;

        match outcome {
            Ok(Ok(result)) => {
                if let Some(error) = result.error() {
                    tracing::warn!("{} of resource {} failed: {}", name, resource.id, error);
                }
                result
            }
            Ok(Err(e)) => {
                tracing::error!(
                    "Failed to calculate {} of resource {}: {}",
                    name,
                    resource.id,
                    e
                );
                DimensionResult::failed(e.to_string())
            }
            Err(e) => {
                tracing::error!(
                    "Calculation of {} for resource {} aborted: {}",
                    name,
                    resource.id,
                    e
                );
                DimensionResult::failed(format!("Metric calculation aborted: {}", e))
            }
        }
    }
}

/// A cached detail is reusable when it holds a result that did not fail.
fn is_reusable(detail: &DimensionResult) -> bool {
    !detail.is_empty() && !detail.is_failed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::data::{Field, InMemoryTable, StaticProvider};
    use crate::models::{Dataset, Dimension};
    use crate::store::InMemoryMetricsStore;
    use serde_json::json;

    struct Exploding;

    impl Metric for Exploding {
        fn dimension(&self) -> Dimension {
            Dimension::Accuracy
        }

        fn calculate_metric(
            &self,
            _resource: &Resource,
            _data: &crate::data::ResourceData,
        ) -> Result<DimensionResult> {
            panic!("boom");
        }

        fn calculate_cumulative_metric(
            &self,
            _resources: &[Resource],
            _results: &[DimensionResult],
        ) -> DimensionResult {
            DimensionResult::new().with("value", 1.0)
        }
    }

    fn engine(dimensions: Vec<Dimension>) -> (DataQualityMetrics, Arc<InMemoryMetricsStore>) {
        let resource = Resource::new("r1").with_last_modified("2023-01-02T00:00:00");
        let catalog = InMemoryCatalog::new().with_dataset(Dataset {
            id: "d1".to_string(),
            resources: vec![resource],
        });
        let table = InMemoryTable::from_json(
            vec![Field::new("a", "text")],
            vec![json!({"a": "x"}), json!({"a": null})],
        );
        let provider = StaticProvider::new().with_table("r1", table);
        let store = Arc::new(InMemoryMetricsStore::new());
        let config = EngineConfig::default().with_dimensions(dimensions);
        let engine = DataQualityMetrics::new(
            config,
            Arc::new(catalog),
            Arc::new(provider),
            Arc::clone(&store) as Arc<dyn MetricsStore>,
        );
        (engine, store)
    }

    #[tokio::test]
    async fn test_dimension_subset() {
        let (engine, store) = engine(vec![Dimension::Completeness]);
        assert_eq!(engine.metric_names(), vec!["completeness"]);

        let record = engine.calculate_metrics_for_dataset("d1").await.unwrap();
        assert_eq!(record.completeness, Some(50.0));
        assert!(record.uniqueness.is_none());
        assert_eq!(record.metrics.len(), 1);

        let resource = store.get(EntityType::Resource, "r1").await.unwrap().unwrap();
        assert_eq!(resource.metrics["completeness"].count("complete"), 1);
    }

    #[tokio::test]
    async fn test_panicking_metric_becomes_failed_result() {
        let (engine, _store) = engine(vec![Dimension::Accuracy]);
        let engine = engine.with_metrics(vec![Arc::new(Exploding)]);
        let resource = Resource::new("r1").with_last_modified("2023-01-02T00:00:00");

        let results = engine.calculate_metrics_for_resource(&resource).await.unwrap();
        let accuracy = &results["accuracy"];
        assert!(accuracy.is_failed());
        assert!(accuracy.error().unwrap().contains("aborted"));
    }

    #[tokio::test]
    async fn test_missing_timestamps_fail_the_resource_only() {
        let (engine, store) = engine(vec![Dimension::Completeness]);
        let undated = Resource::new("r1");
        assert!(engine.calculate_metrics_for_resource(&undated).await.is_err());
        assert!(store.get(EntityType::Resource, "r1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_dataset_is_an_error() {
        let (engine, _store) = engine(vec![Dimension::Completeness]);
        assert!(engine.calculate_metrics_for_dataset("nope").await.is_err());
    }
}
