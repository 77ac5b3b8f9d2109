//! Job-identity derivation and the conservative memory estimator (C3).

use sha2::{Digest, Sha256};

use crate::model::{IndexBuildParameters, RequestParameters};

/// SHA-256 hex digest of the canonical string form of `RequestParameters`.
///
/// Identical requests from the same tenant collapse onto the same job id
/// (deduplication); differing `vector_path` or `tenant_id` produce disjoint
/// ids. The digest is always 64 lowercase hex characters.
pub fn generate_job_id(request_parameters: &RequestParameters) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request_parameters.canonical_string().as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Required GPU and CPU memory, in bytes, for building an index with the
/// given parameters.
///
/// These are deliberately conservative overestimates for a CAGRA-on-GPU,
/// HNSW-on-CPU build; the true engine may use less. Returns `(gpu, cpu)`.
pub fn memory_estimate(params: &IndexBuildParameters) -> (f64, f64) {
    let dimension = params.dimension as f64;
    let doc_count = params.doc_count as f64;
    let entry_size = params.data_type.entry_size_bytes();
    let m = params.index_parameters.algorithm_parameters.m as f64;

    let vector_memory = dimension * doc_count * entry_size;
    let index_cpu_memory = (dimension * entry_size + m * 8.0) * 1.1 * doc_count;
    let index_gpu_memory = 1.5 * index_cpu_memory;

    let gpu = index_gpu_memory + vector_memory;
    let cpu = index_cpu_memory + vector_memory;
    (gpu, cpu)
}

#[cfg(test)]
mod tests {
    use test_r::test;

    use super::*;
    use crate::model::{AlgorithmParameters, DataType, Engine, IndexParameters, RepositoryType};

    fn params(vector_path: &str, tenant_id: &str) -> IndexBuildParameters {
        IndexBuildParameters {
            repository_type: RepositoryType::S3,
            container_name: "bucket".to_string(),
            vector_path: vector_path.to_string(),
            doc_id_path: "x.knndid".to_string(),
            tenant_id: tenant_id.to_string(),
            dimension: 3,
            doc_count: 5,
            data_type: DataType::Float,
            engine: Engine::Faiss,
            index_parameters: IndexParameters {
                algorithm_parameters: AlgorithmParameters {
                    m: 16,
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }

    #[test]
    fn equal_request_parameters_produce_equal_ids() {
        let a = RequestParameters::from(&params("x.knnvec", "tenant-a"));
        let b = RequestParameters::from(&params("x.knnvec", "tenant-a"));
        assert_eq!(generate_job_id(&a), generate_job_id(&b));
    }

    #[test]
    fn differing_tenant_id_produces_different_id() {
        let a = RequestParameters::from(&params("x.knnvec", "tenant-a"));
        let b = RequestParameters::from(&params("x.knnvec", "tenant-b"));
        assert_ne!(generate_job_id(&a), generate_job_id(&b));
    }

    #[test]
    fn differing_vector_path_produces_different_id() {
        let a = RequestParameters::from(&params("x.knnvec", "tenant-a"));
        let b = RequestParameters::from(&params("y.knnvec", "tenant-a"));
        assert_ne!(generate_job_id(&a), generate_job_id(&b));
    }

    #[test]
    fn id_is_64_char_lowercase_hex() {
        let id = generate_job_id(&RequestParameters::from(&params("x.knnvec", "")));
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn memory_estimate_matches_formula() {
        let p = params("x.knnvec", "");
        let (gpu, cpu) = memory_estimate(&p);

        let entry_size = 4.0;
        let vector_memory = 3.0 * 5.0 * entry_size;
        let index_cpu_memory = (3.0 * entry_size + 16.0 * 8.0) * 1.1 * 5.0;
        let index_gpu_memory = 1.5 * index_cpu_memory;

        assert_eq!(gpu, index_gpu_memory + vector_memory);
        assert_eq!(cpu, index_cpu_memory + vector_memory);
    }
}
