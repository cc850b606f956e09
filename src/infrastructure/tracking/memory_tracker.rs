use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::application::ports::{PartTracker, TrackerError};
use crate::domain::{
    CompletedPart, DocumentId, MarkOutcome, TrackingId, TrackingProgress, TrackingSession,
};

/// Single-process tracker backend. All state lives behind one process-local
/// lock and is lost on restart — on crash recovery the coordinator must
/// re-split and start a fresh session. Never deploy this where more than
/// one coordinator or merger instance runs; use the Postgres backend there.
#[derive(Default)]
pub struct InMemoryPartTracker {
    sessions: RwLock<HashMap<TrackingId, TrackingSession>>,
}

impl InMemoryPartTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_session<T>(
        &self,
        tracking_id: TrackingId,
        f: impl FnOnce(&TrackingSession) -> T,
    ) -> Result<T, TrackerError> {
        let sessions = self.sessions.read().expect("tracker lock poisoned");
        sessions
            .get(&tracking_id)
            .map(f)
            .ok_or(TrackerError::NotFound(tracking_id))
    }
}

#[async_trait]
impl PartTracker for InMemoryPartTracker {
    #[tracing::instrument(skip(self), fields(document_id = %document_id))]
    async fn initialize_tracking(
        &self,
        document_id: DocumentId,
        total_parts: u32,
    ) -> Result<TrackingId, TrackerError> {
        if total_parts == 0 {
            return Err(TrackerError::InvalidArgument(
                "total_parts must be positive".to_string(),
            ));
        }

        let session = TrackingSession::new(document_id, total_parts);
        let tracking_id = session.tracking_id;

        let mut sessions = self.sessions.write().expect("tracker lock poisoned");
        sessions.insert(tracking_id, session);

        tracing::debug!(%tracking_id, total_parts, "Tracking session created");
        Ok(tracking_id)
    }

    #[tracing::instrument(skip(self, data), fields(tracking_id = %tracking_id))]
    async fn mark_part_completed(
        &self,
        tracking_id: TrackingId,
        part_number: u32,
        data: Option<String>,
    ) -> Result<MarkOutcome, TrackerError> {
        let mut sessions = self.sessions.write().expect("tracker lock poisoned");
        let session = sessions
            .get_mut(&tracking_id)
            .ok_or(TrackerError::NotFound(tracking_id))?;
        if session.is_abandoned() {
            // Sealed session; a late result must not resurrect it.
            return Err(TrackerError::NotFound(tracking_id));
        }

        let outcome = session.record_part(part_number, data)?;
        Ok(outcome)
    }

    #[tracing::instrument(skip(self), fields(tracking_id = %tracking_id))]
    async fn abandon_tracking(&self, tracking_id: TrackingId) -> Result<bool, TrackerError> {
        let mut sessions = self.sessions.write().expect("tracker lock poisoned");
        let session = sessions
            .get_mut(&tracking_id)
            .ok_or(TrackerError::NotFound(tracking_id))?;
        Ok(session.abandon())
    }

    async fn is_tracking_complete(&self, tracking_id: TrackingId) -> Result<bool, TrackerError> {
        self.read_session(tracking_id, |s| s.is_complete())
    }

    async fn get_tracking_progress(
        &self,
        tracking_id: TrackingId,
    ) -> Result<TrackingProgress, TrackerError> {
        self.read_session(tracking_id, |s| s.progress())
    }

    async fn get_completed_parts(
        &self,
        tracking_id: TrackingId,
    ) -> Result<Vec<CompletedPart>, TrackerError> {
        self.read_session(tracking_id, |s| s.completed_parts_ordered())
    }

    #[tracing::instrument(skip(self), fields(tracking_id = %tracking_id))]
    async fn cleanup_tracking(&self, tracking_id: TrackingId) -> Result<bool, TrackerError> {
        let mut sessions = self.sessions.write().expect("tracker lock poisoned");
        Ok(sessions.remove(&tracking_id).is_some())
    }
}
