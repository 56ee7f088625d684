//! Background data quality checks.
//!
//! [`QualityJobQueue`] receives dataset ids and recalculates their metrics
//! in the background. Jobs are best effort: a failed job is logged and
//! dropped, never retried. Checks of different datasets run concurrently up
//! to `max_concurrent_jobs`; two checks of the same dataset may overlap and
//! the later save wins.

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};

use crate::engine::DataQualityMetrics;
use crate::error::{DqError, Result};

/// Queue of dataset checks processed by a background worker.
#[derive(Debug)]
pub struct QualityJobQueue {
    sender: mpsc::UnboundedSender<String>,
    worker: JoinHandle<()>,
}

impl QualityJobQueue {
    /// Starts the worker on the current tokio runtime.
    ///
    /// Concurrency is bounded by the engine's `max_concurrent_jobs`.
    pub fn start(engine: Arc<DataQualityMetrics>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let max_jobs = engine.config().max_concurrent_jobs.max(1);
        let worker = tokio::spawn(run_worker(engine, receiver, max_jobs));
        Self { sender, worker }
    }

    /// Enqueues a check of a dataset and returns immediately.
    ///
    /// # Errors
    /// Returns a job error when the queue no longer accepts jobs.
    pub fn schedule_data_quality_check(&self, dataset_id: &str) -> Result<()> {
        self.sender.send(dataset_id.to_string()).map_err(|_| {
            DqError::job(format!(
                "Cannot schedule data quality check of {}: queue is closed",
                dataset_id
            ))
        })?;
        tracing::debug!("Scheduled data quality check of dataset {}", dataset_id);
        Ok(())
    }

    /// Stops accepting jobs and waits for queued and running jobs.
    ///
    /// # Errors
    /// Returns a job error if the worker task panicked.
    pub async fn shutdown(self) -> Result<()> {
        drop(self.sender);
        self.worker
            .await
            .map_err(|e| DqError::job(format!("Job worker terminated abnormally: {}", e)))
    }
}

async fn run_worker(
    engine: Arc<DataQualityMetrics>,
    mut receiver: mpsc::UnboundedReceiver<String>,
    max_jobs: usize,
) {
    let semaphore = Arc::new(Semaphore::new(max_jobs));
    let mut jobs = JoinSet::new();

    while let Some(dataset_id) = receiver.recv().await {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        let engine = Arc::clone(&engine);
        jobs.spawn(async move {
            let _permit = permit;
            match engine.calculate_metrics_for_dataset(&dataset_id).await {
                Ok(_) => tracing::debug!("Data quality check of dataset {} finished", dataset_id),
                Err(e) => tracing::error!(
                    "Data quality check of dataset {} failed: {}",
                    dataset_id,
                    e
                ),
            }
        });
        while let Some(finished) = jobs.try_join_next() {
            log_abnormal(finished);
        }
    }

    while let Some(finished) = jobs.join_next().await {
        log_abnormal(finished);
    }
    tracing::debug!("Data quality job worker stopped");
}

fn log_abnormal(outcome: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = outcome {
        tracing::error!("Data quality job terminated abnormally: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::config::EngineConfig;
    use crate::data::StaticProvider;
    use crate::models::{Dataset, EntityType};
    use crate::store::{InMemoryMetricsStore, MetricsStore};

    #[tokio::test]
    async fn test_jobs_run_and_failures_are_dropped() {
        let catalog = InMemoryCatalog::new()
            .with_dataset(Dataset {
                id: "d1".to_string(),
                resources: Vec::new(),
            })
            .with_dataset(Dataset {
                id: "d2".to_string(),
                resources: Vec::new(),
            });
        let store = Arc::new(InMemoryMetricsStore::new());
        let engine = DataQualityMetrics::new(
            EngineConfig::default().with_max_concurrent_jobs(1),
            Arc::new(catalog),
            Arc::new(StaticProvider::new()),
            Arc::clone(&store) as Arc<dyn MetricsStore>,
        );

        let queue = QualityJobQueue::start(Arc::new(engine));
        queue.schedule_data_quality_check("d1").unwrap();
        queue.schedule_data_quality_check("missing").unwrap();
        queue.schedule_data_quality_check("d2").unwrap();
        queue.shutdown().await.unwrap();

        assert!(store.get(EntityType::Package, "d1").await.unwrap().is_some());
        assert!(store.get(EntityType::Package, "d2").await.unwrap().is_some());
        assert_eq!(store.len().await, 2);
    }
}
