use async_trait::async_trait;

use crate::domain::PayloadRef;

/// Byte storage for source documents and split part payloads. Messages
/// carry a [`PayloadRef`], never the bytes themselves.
#[async_trait]
pub trait PartStore: Send + Sync {
    async fn put(&self, payload_ref: &PayloadRef, data: Vec<u8>) -> Result<(), PartStoreError>;

    async fn get(&self, payload_ref: &PayloadRef) -> Result<Vec<u8>, PartStoreError>;

    async fn delete(&self, payload_ref: &PayloadRef) -> Result<(), PartStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PartStoreError {
    #[error("payload not found: {0}")]
    NotFound(String),
    #[error("store failed: {0}")]
    StoreFailed(String),
    #[error("fetch failed: {0}")]
    FetchFailed(String),
    #[error("delete failed: {0}")]
    DeleteFailed(String),
}
