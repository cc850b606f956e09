use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as StorePath;
use object_store::{ObjectStore, PutPayload};

use crate::application::ports::{PartStore, PartStoreError};
use crate::domain::PayloadRef;

/// Part store over any `object_store` backend. Deployments use the local
/// filesystem (or an S3-compatible store wired in the same way); tests use
/// the in-memory backend.
pub struct ObjectPartStore {
    inner: Arc<dyn ObjectStore>,
}

impl ObjectPartStore {
    pub fn local(base_path: PathBuf) -> Result<Self, PartStoreError> {
        std::fs::create_dir_all(&base_path)
            .map_err(|e| PartStoreError::StoreFailed(e.to_string()))?;
        let fs = LocalFileSystem::new_with_prefix(base_path)
            .map_err(|e| PartStoreError::StoreFailed(e.to_string()))?;
        Ok(Self {
            inner: Arc::new(fs),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(InMemory::new()),
        }
    }
}

#[async_trait]
impl PartStore for ObjectPartStore {
    async fn put(&self, payload_ref: &PayloadRef, data: Vec<u8>) -> Result<(), PartStoreError> {
        let path = StorePath::from(payload_ref.as_str());
        self.inner
            .put(&path, PutPayload::from(Bytes::from(data)))
            .await
            .map_err(|e| PartStoreError::StoreFailed(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, payload_ref: &PayloadRef) -> Result<Vec<u8>, PartStoreError> {
        let path = StorePath::from(payload_ref.as_str());
        let result = self.inner.get(&path).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => {
                PartStoreError::NotFound(payload_ref.to_string())
            }
            other => PartStoreError::FetchFailed(other.to_string()),
        })?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| PartStoreError::FetchFailed(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, payload_ref: &PayloadRef) -> Result<(), PartStoreError> {
        let path = StorePath::from(payload_ref.as_str());
        self.inner
            .delete(&path)
            .await
            .map_err(|e| PartStoreError::DeleteFailed(e.to_string()))
    }
}
