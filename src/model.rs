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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity-bearing subset of an index build request.
///
/// String form is `"{vector_path}-{tenant_id}"`; equality is string-form
/// equality, which is what the job id is derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestParameters {
    pub vector_path: String,
    pub tenant_id: String,
}

impl RequestParameters {
    pub fn canonical_string(&self) -> String {
        format!("{}-{}", self.vector_path, self.tenant_id)
    }
}

impl From<&IndexBuildParameters> for RequestParameters {
    fn from(params: &IndexBuildParameters) -> Self {
        RequestParameters {
            vector_path: params.vector_path.clone(),
            tenant_id: params.tenant_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryType {
    S3,
}

impl Default for RepositoryType {
    fn default() -> Self {
        RepositoryType::S3
    }
}

/// Supported data types for vector values.
///
/// The conservative memory estimator in [`crate::identity::memory_estimate`]
/// documents sizes for `float`, `float16`, `byte` and `binary` entries, but
/// the wire contract currently accepts only `float` -- see the Open Question
/// in the spec about widening this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Float,
}

impl Default for DataType {
    fn default() -> Self {
        DataType::Float
    }
}

impl DataType {
    /// Bytes occupied by a single vector element of this type.
    pub fn entry_size_bytes(&self) -> f64 {
        match self {
            DataType::Float => 4.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Faiss,
}

impl Engine {
    pub fn as_extension(&self) -> &'static str {
        match self {
            Engine::Faiss => "faiss",
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::Faiss
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Hnsw,
}

impl Default for Algorithm {
    fn default() -> Self {
        Algorithm::Hnsw
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpaceType {
    L2,
    InnerProduct,
}

impl Default for SpaceType {
    fn default() -> Self {
        SpaceType::L2
    }
}

fn default_m() -> u32 {
    16
}

fn default_ef_construction() -> u32 {
    100
}

fn default_ef_search() -> u32 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmParameters {
    #[serde(default = "default_ef_construction")]
    pub ef_construction: u32,
    #[serde(default = "default_ef_search")]
    pub ef_search: u32,
    #[serde(default = "default_m")]
    pub m: u32,
}

impl Default for AlgorithmParameters {
    fn default() -> Self {
        AlgorithmParameters {
            ef_construction: default_ef_construction(),
            ef_search: default_ef_search(),
            m: default_m(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexParameters {
    #[serde(default)]
    pub algorithm: Algorithm,
    #[serde(default)]
    pub space_type: SpaceType,
    #[serde(default)]
    pub algorithm_parameters: AlgorithmParameters,
}

/// Full wire payload for `POST /_build`.
///
/// Unknown top-level fields are rejected (`deny_unknown_fields`); this is
/// enforced by the deserializer used at the API boundary, not by this type
/// alone, since `serde_path_to_error` needs to see the rejection to report
/// a field path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexBuildParameters {
    #[serde(default)]
    pub repository_type: RepositoryType,
    pub container_name: String,
    pub vector_path: String,
    pub doc_id_path: String,
    #[serde(default)]
    pub tenant_id: String,
    pub dimension: u32,
    pub doc_count: u32,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default)]
    pub engine: Engine,
    #[serde(default)]
    pub index_parameters: IndexParameters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    #[serde(rename = "RUNNING_INDEX_BUILD")]
    Running,
    #[serde(rename = "COMPLETED_INDEX_BUILD")]
    Completed,
    #[serde(rename = "FAILED_INDEX_BUILD")]
    Failed,
}

/// A job as tracked in the request store.
///
/// Status transitions are `Running -> Completed` or `Running -> Failed`
/// only; callers (the executor) are expected to uphold that, the type
/// itself does not enforce it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub request_parameters: RequestParameters,
    pub file_name: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: String, request_parameters: RequestParameters, created_at: DateTime<Utc>) -> Self {
        Job {
            id,
            status: JobStatus::Running,
            request_parameters,
            file_name: None,
            error_message: None,
            created_at,
        }
    }
}

/// Partial update applied atomically by [`crate::store::RequestStore::update`].
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub file_name: Option<String>,
    pub error_message: Option<String>,
}

/// The unit submitted to the workflow executor.
#[derive(Debug, Clone)]
pub struct BuildWorkflow {
    pub job_id: String,
    pub gpu_memory_required: f64,
    pub cpu_memory_required: f64,
    pub index_build_parameters: IndexBuildParameters,
}
