//! Bounded-concurrency worker pool that runs admitted build workflows (C4).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::blob_store::BlobStore;
use crate::index_builder::{artifact_basename, IndexBuilder};
use crate::metrics::Metrics;
use crate::model::{BuildWorkflow, JobPatch, JobStatus};
use crate::resource::ResourceManager;
use crate::store::RequestStore;

/// Releases a resource reservation when dropped, regardless of whether the
/// worker task that held it returned normally, returned early on an error,
/// or unwound from a panic.
struct ReservationGuard {
    resource_manager: Arc<ResourceManager>,
    gpu: f64,
    cpu: f64,
}

impl Drop for ReservationGuard {
    fn drop(&mut self) {
        self.resource_manager.release(self.gpu, self.cpu);
    }
}

/// Runs admitted [`BuildWorkflow`]s against a bounded pool of concurrent
/// workers.
///
/// Admission (resource reservation and adding the job to the request
/// store) happens one layer up, in the job service; by the time a workflow
/// reaches [`Self::submit`], its GPU/CPU reservation is already live and
/// this executor owns releasing it.
pub struct WorkflowExecutor {
    semaphore: Arc<Semaphore>,
    resource_manager: Arc<ResourceManager>,
    index_builder: Arc<dyn IndexBuilder>,
    blob_store: Arc<dyn BlobStore>,
    store: Arc<dyn RequestStore>,
    metrics: Arc<Metrics>,
    /// Handles for tasks still running when the last [`Self::submit`] or
    /// [`Self::shutdown`] call touched this list. Pruned of finished
    /// handles on every `submit`, so this stays proportional to in-flight
    /// work rather than total jobs ever submitted.
    handles: Mutex<Vec<JoinHandle<()>>>,
    accepting: AtomicBool,
}

impl WorkflowExecutor {
    pub fn new(
        max_workers: usize,
        resource_manager: Arc<ResourceManager>,
        index_builder: Arc<dyn IndexBuilder>,
        blob_store: Arc<dyn BlobStore>,
        store: Arc<dyn RequestStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        WorkflowExecutor {
            semaphore: Arc::new(Semaphore::new(max_workers)),
            resource_manager,
            index_builder,
            blob_store,
            store,
            metrics,
            handles: Mutex::new(Vec::new()),
            accepting: AtomicBool::new(true),
        }
    }

    /// Spawns a detached task running `workflow` to completion. The task
    /// blocks on a worker-pool permit before doing any blob I/O or build
    /// work, so at most `max_workers` builds run concurrently regardless of
    /// how many have been admitted ahead of it.
    ///
    /// Does nothing once [`Self::shutdown`] has been called; by that point
    /// the caller is expected to have already stopped accepting new
    /// requests at the API layer, so this is a last line of defense rather
    /// than the primary admission control.
    pub fn submit(&self, workflow: BuildWorkflow) {
        if !self.accepting.load(Ordering::SeqCst) {
            warn!(job_id = %workflow.job_id, "rejecting submission after shutdown");
            return;
        }

        let semaphore = self.semaphore.clone();
        let resource_manager = self.resource_manager.clone();
        let index_builder = self.index_builder.clone();
        let blob_store = self.blob_store.clone();
        let store = self.store.clone();
        let metrics = self.metrics.clone();

        let handle = tokio::spawn(async move {
            let _reservation = ReservationGuard {
                resource_manager: resource_manager.clone(),
                gpu: workflow.gpu_memory_required,
                cpu: workflow.cpu_memory_required,
            };

            let permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };

            info!(job_id = %workflow.job_id, "starting build");
            let result = run_build(&*index_builder, &*blob_store, &workflow).await;
            drop(permit);

            let patch = match result {
                Ok(file_name) => {
                    info!(job_id = %workflow.job_id, "build completed");
                    JobPatch {
                        status: Some(JobStatus::Completed),
                        file_name: Some(file_name),
                        error_message: None,
                    }
                }
                Err(message) => {
                    warn!(job_id = %workflow.job_id, error = %message, "build failed");
                    JobPatch {
                        status: Some(JobStatus::Failed),
                        file_name: None,
                        error_message: Some(message),
                    }
                }
            };

            if !store.update(&workflow.job_id, patch) {
                error!(
                    job_id = %workflow.job_id,
                    "job missing from store when attempting to record build outcome"
                );
            }
            metrics.record_job_settled();
            metrics.set_available_resources(
                resource_manager.available_gpu(),
                resource_manager.available_cpu(),
            );
        });

        let mut handles = self.handles.lock().unwrap();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Stops accepting new submissions and blocks until every in-flight
    /// workflow has finished settling its job in the request store.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock().unwrap());
        for handle in handles {
            if let Err(err) = handle.await {
                error!(error = %err, "worker task panicked during shutdown drain");
            }
        }
    }
}

async fn run_build(
    index_builder: &dyn IndexBuilder,
    blob_store: &dyn BlobStore,
    workflow: &BuildWorkflow,
) -> Result<String, String> {
    let params = &workflow.index_build_parameters;
    let vectors = blob_store
        .read(&params.container_name, &params.vector_path)
        .await
        .map_err(|e| e.to_string())?;
    let doc_ids = blob_store
        .read(&params.container_name, &params.doc_id_path)
        .await
        .map_err(|e| e.to_string())?;
    let (artifact_path, artifact_bytes) =
        index_builder.build(params, vectors, doc_ids).await?;
    blob_store
        .write(&params.container_name, &artifact_path, artifact_bytes)
        .await
        .map_err(|e| e.to_string())?;
    Ok(artifact_basename(&artifact_path))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use test_r::test;

    use super::*;
    use crate::blob_store::InMemoryBlobStore;
    use crate::identity::memory_estimate;
    use crate::index_builder::SimulatedIndexBuilder;
    use crate::model::{
        AlgorithmParameters, DataType, Engine, IndexBuildParameters, IndexParameters, Job,
        RepositoryType, RequestParameters,
    };
    use crate::metrics::Metrics;
    use crate::store::InMemoryRequestStore;

    fn params(vector_path: &str) -> IndexBuildParameters {
        IndexBuildParameters {
            repository_type: RepositoryType::S3,
            container_name: "bucket".to_string(),
            vector_path: vector_path.to_string(),
            doc_id_path: "x.knndid".to_string(),
            tenant_id: "".to_string(),
            dimension: 3,
            doc_count: 5,
            data_type: DataType::Float,
            engine: Engine::Faiss,
            index_parameters: IndexParameters {
                algorithm_parameters: AlgorithmParameters::default(),
                ..Default::default()
            },
        }
    }

    async fn wait_until_settled(store: &InMemoryRequestStore, job_id: &str) -> Job {
        for _ in 0..200 {
            if let Some(job) = store.get(job_id) {
                if job.status != JobStatus::Running {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} did not settle in time");
    }

    #[test]
    async fn submit_runs_build_and_records_completion() {
        let resource_manager = Arc::new(ResourceManager::new(1_000_000.0, 1_000_000.0));
        let blob_store = Arc::new(InMemoryBlobStore::new());
        blob_store.seed("bucket", "x.knnvec", vec![1, 2, 3]);
        blob_store.seed("bucket", "x.knndid", vec![4, 5, 6]);
        let store = Arc::new(InMemoryRequestStore::new(10, None));

        let request_params = RequestParameters::from(&params("x.knnvec"));
        let job = Job::new("job-1".to_string(), request_params, chrono::Utc::now());
        store.add("job-1", job);

        let index_build_parameters = params("x.knnvec");
        let (gpu, cpu) = memory_estimate(&index_build_parameters);
        assert!(resource_manager.try_allocate(gpu, cpu));

        let executor = WorkflowExecutor::new(
            2,
            resource_manager.clone(),
            Arc::new(SimulatedIndexBuilder),
            blob_store,
            store.clone(),
            Arc::new(Metrics::new()),
        );

        executor.submit(BuildWorkflow {
            job_id: "job-1".to_string(),
            gpu_memory_required: gpu,
            cpu_memory_required: cpu,
            index_build_parameters,
        });

        let settled = wait_until_settled(&store, "job-1").await;
        assert_eq!(settled.status, JobStatus::Completed);
        assert_eq!(settled.file_name.as_deref(), Some("x.faiss"));
        assert_eq!(resource_manager.available_gpu(), resource_manager.total_gpu());
        assert_eq!(resource_manager.available_cpu(), resource_manager.total_cpu());
    }

    #[test]
    async fn submit_records_failure_and_still_releases_reservation() {
        let resource_manager = Arc::new(ResourceManager::new(1_000_000.0, 1_000_000.0));
        let blob_store = Arc::new(InMemoryBlobStore::new());
        // doc id blob deliberately not seeded, so the build fails.
        blob_store.seed("bucket", "x.knnvec", vec![1, 2, 3]);
        let store = Arc::new(InMemoryRequestStore::new(10, None));

        let request_params = RequestParameters::from(&params("x.knnvec"));
        let job = Job::new("job-2".to_string(), request_params, chrono::Utc::now());
        store.add("job-2", job);

        let index_build_parameters = params("x.knnvec");
        let (gpu, cpu) = memory_estimate(&index_build_parameters);
        assert!(resource_manager.try_allocate(gpu, cpu));

        let executor = WorkflowExecutor::new(
            2,
            resource_manager.clone(),
            Arc::new(SimulatedIndexBuilder),
            blob_store,
            store.clone(),
            Arc::new(Metrics::new()),
        );

        executor.submit(BuildWorkflow {
            job_id: "job-2".to_string(),
            gpu_memory_required: gpu,
            cpu_memory_required: cpu,
            index_build_parameters,
        });

        let settled = wait_until_settled(&store, "job-2").await;
        assert_eq!(settled.status, JobStatus::Failed);
        assert!(settled.error_message.is_some());
        assert_eq!(resource_manager.available_gpu(), resource_manager.total_gpu());
        assert_eq!(resource_manager.available_cpu(), resource_manager.total_cpu());
    }

    #[test]
    async fn worker_pool_caps_concurrency_at_max_workers() {
        let resource_manager = Arc::new(ResourceManager::new(1_000_000.0, 1_000_000.0));
        let blob_store = Arc::new(InMemoryBlobStore::new());
        blob_store.seed("bucket", "x.knnvec", vec![1]);
        blob_store.seed("bucket", "x.knndid", vec![1]);
        let store = Arc::new(InMemoryRequestStore::new(10, None));

        let executor = WorkflowExecutor::new(
            2,
            resource_manager,
            Arc::new(SimulatedIndexBuilder),
            blob_store,
            store.clone(),
            Arc::new(Metrics::new()),
        );

        assert_eq!(executor.available_permits(), 2);
    }

    #[test]
    async fn submit_prunes_finished_handles_instead_of_accumulating_them() {
        let resource_manager = Arc::new(ResourceManager::new(1_000_000.0, 1_000_000.0));
        let blob_store = Arc::new(InMemoryBlobStore::new());
        blob_store.seed("bucket", "x.knnvec", vec![1, 2, 3]);
        blob_store.seed("bucket", "x.knndid", vec![4, 5, 6]);
        let store = Arc::new(InMemoryRequestStore::new(100, None));

        let executor = WorkflowExecutor::new(
            2,
            resource_manager.clone(),
            Arc::new(SimulatedIndexBuilder),
            blob_store,
            store.clone(),
            Arc::new(Metrics::new()),
        );

        for i in 0..20 {
            let job_id = format!("job-prune-{i}");
            let index_build_parameters = params("x.knnvec");
            let (gpu, cpu) = memory_estimate(&index_build_parameters);
            assert!(resource_manager.try_allocate(gpu, cpu));
            let request_params = RequestParameters::from(&index_build_parameters);
            store.add(&job_id, Job::new(job_id.clone(), request_params, chrono::Utc::now()));

            executor.submit(BuildWorkflow {
                job_id: job_id.clone(),
                gpu_memory_required: gpu,
                cpu_memory_required: cpu,
                index_build_parameters,
            });
            // Waiting for each submission to settle before the next one is
            // what lets this assert a tight bound: the pool has far more
            // capacity than one in-flight job, so a leaking `handles` vec
            // would otherwise still pass a looser "stays bounded" check.
            wait_until_settled(&store, &job_id).await;
        }

        assert!(executor.handles.lock().unwrap().len() <= 1);
    }

    #[test]
    async fn shutdown_waits_for_in_flight_workflow_and_rejects_new_submissions() {
        let resource_manager = Arc::new(ResourceManager::new(1_000_000.0, 1_000_000.0));
        let blob_store = Arc::new(InMemoryBlobStore::new());
        blob_store.seed("bucket", "x.knnvec", vec![1, 2, 3]);
        blob_store.seed("bucket", "x.knndid", vec![4, 5, 6]);
        let store = Arc::new(InMemoryRequestStore::new(10, None));

        let request_params = RequestParameters::from(&params("x.knnvec"));
        let job = Job::new("job-3".to_string(), request_params, chrono::Utc::now());
        store.add("job-3", job);

        let index_build_parameters = params("x.knnvec");
        let (gpu, cpu) = memory_estimate(&index_build_parameters);
        assert!(resource_manager.try_allocate(gpu, cpu));

        let executor = WorkflowExecutor::new(
            2,
            resource_manager.clone(),
            Arc::new(SimulatedIndexBuilder),
            blob_store,
            store.clone(),
            Arc::new(Metrics::new()),
        );

        executor.submit(BuildWorkflow {
            job_id: "job-3".to_string(),
            gpu_memory_required: gpu,
            cpu_memory_required: cpu,
            index_build_parameters: index_build_parameters.clone(),
        });

        executor.shutdown().await;

        let settled = store.get("job-3").unwrap();
        assert_eq!(settled.status, JobStatus::Completed);

        executor.submit(BuildWorkflow {
            job_id: "job-4".to_string(),
            gpu_memory_required: 0.0,
            cpu_memory_required: 0.0,
            index_build_parameters,
        });
        assert!(store.get("job-4").is_none());
    }
}
