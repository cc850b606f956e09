use async_trait::async_trait;

/// The external conversion capability: bytes of one part in, markdown out.
/// The algorithm itself is out of scope; workers only need this seam.
#[async_trait]
pub trait PartConverter: Send + Sync {
    async fn convert(&self, data: &[u8]) -> Result<String, ConvertError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// Worth another attempt: rate limits, network hiccups, 5xx responses.
    #[error("transient conversion failure: {0}")]
    Transient(String),
    /// Retrying cannot help: malformed input, unsupported content.
    #[error("permanent conversion failure: {0}")]
    Permanent(String),
}
