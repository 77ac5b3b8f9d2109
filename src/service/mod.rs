// Copyright 2024-2025 Golem Cloud
//
// Licensed under the Golem Source License v1.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://license.golem.cloud/LICENSE
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Job lifecycle orchestration (C5): dedup, admission, and handoff to the
//! worker pool.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use crate::executor::WorkflowExecutor;
use crate::identity::{generate_job_id, memory_estimate};
use crate::metrics::Metrics;
use crate::model::{BuildWorkflow, IndexBuildParameters, Job, RequestParameters};
use crate::resource::ResourceManager;
use crate::store::RequestStore;

#[derive(Debug, Error)]
pub enum JobServiceError {
    #[error("hash collision detected for job id: {0}")]
    HashCollision(String),
    #[error("insufficient available resources to process job {0}")]
    Capacity(String),
}

/// Coordinates request deduplication, resource admission, and workflow
/// submission. Holds no lock of its own: correctness under concurrent
/// `create_job` calls comes entirely from the store and resource manager's
/// own internal synchronization.
pub struct JobService {
    request_store: Arc<dyn RequestStore>,
    workflow_executor: Arc<WorkflowExecutor>,
    resource_manager: Arc<ResourceManager>,
    metrics: Arc<Metrics>,
}

impl JobService {
    pub fn new(
        request_store: Arc<dyn RequestStore>,
        workflow_executor: Arc<WorkflowExecutor>,
        resource_manager: Arc<ResourceManager>,
        metrics: Arc<Metrics>,
    ) -> Self {
        JobService {
            request_store,
            workflow_executor,
            resource_manager,
            metrics,
        }
    }

    /// Creates and submits a new index build job, or returns the id of an
    /// identical in-flight/completed job.
    ///
    /// Admission order matters: the job is added to the request store
    /// before resources are reserved, so a failed reservation can roll back
    /// by deleting the store entry rather than leaving a half-admitted job
    /// that never gets resources.
    pub fn create_job(
        &self,
        index_build_parameters: IndexBuildParameters,
    ) -> Result<String, JobServiceError> {
        let request_parameters = RequestParameters::from(&index_build_parameters);
        let job_id = generate_job_id(&request_parameters);

        if let Some(existing) = self.request_store.get(&job_id) {
            if existing.request_parameters == request_parameters {
                info!(job_id = %job_id, "job already exists, returning existing id");
                return Ok(job_id);
            }
            self.metrics.record_hash_collision();
            return Err(JobServiceError::HashCollision(job_id));
        }

        let job = Job::new(job_id.clone(), request_parameters, Utc::now());
        if !self.request_store.add(&job_id, job) {
            self.metrics.record_capacity_rejected();
            return Err(JobServiceError::Capacity(job_id));
        }
        info!(job_id = %job_id, "added job to request store");

        let (gpu_mem, cpu_mem) = memory_estimate(&index_build_parameters);
        info!(job_id = %job_id, gpu_mem, cpu_mem, "computed job resource requirements");

        if !self.resource_manager.try_allocate(gpu_mem, cpu_mem) {
            self.request_store.delete(&job_id);
            self.metrics.record_capacity_rejected();
            return Err(JobServiceError::Capacity(job_id));
        }

        self.metrics.record_admitted();
        self.metrics.set_available_resources(
            self.resource_manager.available_gpu(),
            self.resource_manager.available_cpu(),
        );

        self.workflow_executor.submit(BuildWorkflow {
            job_id: job_id.clone(),
            gpu_memory_required: gpu_mem,
            cpu_memory_required: cpu_mem,
            index_build_parameters,
        });
        info!(job_id = %job_id, "submitted build workflow");

        Ok(job_id)
    }

    pub fn get_job(&self, job_id: &str) -> Option<Job> {
        self.request_store.get(job_id)
    }

    pub fn list_jobs(&self) -> HashMap<String, Job> {
        self.request_store.list()
    }
}
