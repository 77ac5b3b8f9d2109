//! Pluggable ANN index construction (C7).

use async_trait::async_trait;

use crate::model::IndexBuildParameters;

/// Builds an on-disk (or in-memory, for the default implementation) ANN
/// index artifact from vector and doc-id blobs.
///
/// Engines other than Faiss are out of scope (see spec Non-goals); this
/// trait exists so that adding one is a new implementation, not a change
/// to the executor.
#[async_trait]
pub trait IndexBuilder: Send + Sync {
    /// Builds an index from `vectors`/`doc_ids` per `params`.
    ///
    /// Returns the full artifact path (alongside `vector_path`, used as the
    /// upload key) and the artifact bytes. The caller is responsible for
    /// uploading the bytes and for reducing the path to a basename before
    /// reporting it to clients. Errors are reported as plain strings since
    /// the executor's only use for them is to attach them to
    /// `Job::error_message` verbatim.
    async fn build(
        &self,
        params: &IndexBuildParameters,
        vectors: Vec<u8>,
        doc_ids: Vec<u8>,
    ) -> Result<(String, Vec<u8>), String>;
}

/// Full artifact path: `vector_path` with its `.knnvec` suffix replaced by
/// the engine's extension, preserving any directory components.
pub fn artifact_path(vector_path: &str, engine_extension: &str) -> String {
    let stem = vector_path
        .strip_suffix(".knnvec")
        .unwrap_or(vector_path);
    format!("{stem}.{engine_extension}")
}

/// The basename clients see in `Job::file_name`, derived from a full
/// artifact path.
pub fn artifact_basename(artifact_path: &str) -> String {
    artifact_path
        .rsplit('/')
        .next()
        .unwrap_or(artifact_path)
        .to_string()
}

/// Reference `IndexBuilder`. It does not actually run Faiss/HNSW training
/// (that is a heavyweight native/GPU dependency out of scope for this
/// crate); it validates the inputs it was handed and produces an artifact
/// deterministically, which is sufficient for the service's own contract:
/// callers only observe success/failure and a file name.
pub struct SimulatedIndexBuilder;

#[async_trait]
impl IndexBuilder for SimulatedIndexBuilder {
    async fn build(
        &self,
        params: &IndexBuildParameters,
        vectors: Vec<u8>,
        doc_ids: Vec<u8>,
    ) -> Result<(String, Vec<u8>), String> {
        if vectors.is_empty() {
            return Err("vector blob is empty".to_string());
        }
        if doc_ids.is_empty() {
            return Err("doc id blob is empty".to_string());
        }
        let path = artifact_path(&params.vector_path, params.engine.as_extension());
        let mut artifact = vectors;
        artifact.extend_from_slice(&doc_ids);
        Ok((path, artifact))
    }
}
