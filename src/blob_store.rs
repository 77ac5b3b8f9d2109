//! Blob storage abstraction for reading vector/doc-id blobs and writing
//! built index artifacts.
//!
//! The production deployment of this service reads from and writes to an
//! external object store (S3, per [`crate::model::RepositoryType`]); that
//! collaborator lives outside this crate's scope, so only the trait and an
//! in-memory stand-in used by tests and the default wiring live here.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("blob store operation failed: {0}")]
    Backend(String),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn read(&self, container: &str, path: &str) -> Result<Vec<u8>, BlobStoreError>;
    async fn write(&self, container: &str, path: &str, data: Vec<u8>) -> Result<(), BlobStoreError>;
}

/// In-memory blob store keyed by `(container, path)`. Used for local
/// development and integration tests where no real object store is wired.
#[derive(Default)]
pub struct InMemoryBlobStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        InMemoryBlobStore::default()
    }

    pub fn seed(&self, container: &str, path: &str, data: Vec<u8>) {
        self.objects
            .lock()
            .unwrap()
            .insert((container.to_string(), path.to_string()), data);
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn read(&self, container: &str, path: &str) -> Result<Vec<u8>, BlobStoreError> {
        self.objects
            .lock()
            .unwrap()
            .get(&(container.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound(format!("{container}/{path}")))
    }

    async fn write(&self, container: &str, path: &str, data: Vec<u8>) -> Result<(), BlobStoreError> {
        self.objects
            .lock()
            .unwrap()
            .insert((container.to_string(), path.to_string()), data);
        Ok(())
    }
}
