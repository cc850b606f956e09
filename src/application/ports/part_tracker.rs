use async_trait::async_trait;

use crate::domain::{CompletedPart, DocumentId, MarkOutcome, TrackingId, TrackingProgress};

/// Durable key-value record of split/merge progress per document.
///
/// Both backends implement this contract identically; only durability
/// differs. The in-memory backend loses all state on restart and is only
/// suitable for single-process deployments. The Postgres backend persists
/// every mutation synchronously before returning, so a crash after
/// `mark_part_completed` returns is guaranteed visible to the next reader —
/// prefer it whenever more than one coordinator or merger can run.
#[async_trait]
pub trait PartTracker: Send + Sync {
    /// Creates a fresh, independent session. Safe to call again for the same
    /// document; callers are responsible for superseding stale sessions.
    async fn initialize_tracking(
        &self,
        document_id: DocumentId,
        total_parts: u32,
    ) -> Result<TrackingId, TrackerError>;

    /// Records one part completion, idempotently. See
    /// [`MarkOutcome`](crate::domain::MarkOutcome) for edge-trigger
    /// semantics. Fails with `NotFound` once the session has been
    /// abandoned; a sealed session is never completed by a late result.
    async fn mark_part_completed(
        &self,
        tracking_id: TrackingId,
        part_number: u32,
        data: Option<String>,
    ) -> Result<MarkOutcome, TrackerError>;

    async fn is_tracking_complete(&self, tracking_id: TrackingId) -> Result<bool, TrackerError>;

    async fn get_tracking_progress(
        &self,
        tracking_id: TrackingId,
    ) -> Result<TrackingProgress, TrackerError>;

    /// Completed parts sorted by part number ascending — the ordering
    /// invariant the merger reassembles by.
    async fn get_completed_parts(
        &self,
        tracking_id: TrackingId,
    ) -> Result<Vec<CompletedPart>, TrackerError>;

    /// Seals the session terminally once a part has exhausted its retry
    /// budget. Subsequent `mark_part_completed` calls fail with `NotFound`;
    /// reads keep working so the record stays inspectable. Returns `false`
    /// when the session was already sealed.
    async fn abandon_tracking(&self, tracking_id: TrackingId) -> Result<bool, TrackerError>;

    /// Idempotent deletion; `false` if the session was already absent.
    async fn cleanup_tracking(&self, tracking_id: TrackingId) -> Result<bool, TrackerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// Caller bug; never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Unknown tracking id; terminal for the caller, never retried.
    #[error("tracking session not found: {0}")]
    NotFound(TrackingId),
    #[error("{0}")]
    OutOfRange(#[from] crate::domain::PartOutOfRange),
    /// Backing store unavailable; retried with backoff at the call site.
    #[error("persistence failed: {0}")]
    Persistence(String),
}

impl TrackerError {
    /// Only persistence failures are worth retrying; everything else is a
    /// caller bug or a terminal condition.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TrackerError::Persistence(_))
    }
}
