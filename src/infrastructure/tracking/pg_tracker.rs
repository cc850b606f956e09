use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::instrument;

use crate::application::ports::{PartTracker, TrackerError};
use crate::domain::{
    CompletedPart, DocumentId, MarkOutcome, TrackingId, TrackingProgress, TrackingSession,
};

/// Multi-process tracker backend. Every mutation is committed before the
/// call returns, so a crash after `mark_part_completed` returns is
/// guaranteed visible to the next reader. Mutations run under
/// `SELECT … FOR UPDATE`, which serializes concurrent markers per session
/// at the storage layer — no application-side locking.
pub struct PgPartTracker {
    pool: PgPool,
}

impl PgPartTracker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the session table if missing. Called once at startup.
    pub async fn ensure_schema(&self) -> Result<(), TrackerError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS part_tracking_sessions (
                tracking_id UUID PRIMARY KEY,
                document_id UUID NOT NULL,
                session JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(persistence)?;
        Ok(())
    }

    async fn load_session(&self, tracking_id: TrackingId) -> Result<TrackingSession, TrackerError> {
        let row = sqlx::query("SELECT session FROM part_tracking_sessions WHERE tracking_id = $1")
            .bind(tracking_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(persistence)?
            .ok_or(TrackerError::NotFound(tracking_id))?;

        let Json(session): Json<TrackingSession> =
            row.try_get("session").map_err(persistence)?;
        Ok(session)
    }
}

fn persistence(e: impl std::fmt::Display) -> TrackerError {
    TrackerError::Persistence(e.to_string())
}

#[async_trait]
impl PartTracker for PgPartTracker {
    #[instrument(skip(self), fields(document_id = %document_id))]
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

        sqlx::query(
            r#"
            INSERT INTO part_tracking_sessions (tracking_id, document_id, session, updated_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(tracking_id.as_uuid())
        .bind(document_id.as_uuid())
        .bind(Json(&session))
        .bind(session.updated_at)
        .execute(&self.pool)
        .await
        .map_err(persistence)?;

        tracing::debug!(%tracking_id, total_parts, "Tracking session created");
        Ok(tracking_id)
    }

    #[instrument(skip(self, data), fields(tracking_id = %tracking_id))]
    async fn mark_part_completed(
        &self,
        tracking_id: TrackingId,
        part_number: u32,
        data: Option<String>,
    ) -> Result<MarkOutcome, TrackerError> {
        let mut tx = self.pool.begin().await.map_err(persistence)?;

        let row = sqlx::query(
            "SELECT session FROM part_tracking_sessions WHERE tracking_id = $1 FOR UPDATE",
        )
        .bind(tracking_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(persistence)?
        .ok_or(TrackerError::NotFound(tracking_id))?;

        let Json(mut session): Json<TrackingSession> =
            row.try_get("session").map_err(persistence)?;
        if session.is_abandoned() {
            // Sealed session; a late result must not resurrect it.
            return Err(TrackerError::NotFound(tracking_id));
        }

        let outcome = session.record_part(part_number, data)?;

        if outcome.newly_recorded {
            sqlx::query(
                "UPDATE part_tracking_sessions SET session = $1, updated_at = $2 WHERE tracking_id = $3",
            )
            .bind(Json(&session))
            .bind(session.updated_at)
            .bind(tracking_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(persistence)?;
        }

        tx.commit().await.map_err(persistence)?;
        Ok(outcome)
    }

    async fn is_tracking_complete(&self, tracking_id: TrackingId) -> Result<bool, TrackerError> {
        Ok(self.load_session(tracking_id).await?.is_complete())
    }

    async fn get_tracking_progress(
        &self,
        tracking_id: TrackingId,
    ) -> Result<TrackingProgress, TrackerError> {
        Ok(self.load_session(tracking_id).await?.progress())
    }

    async fn get_completed_parts(
        &self,
        tracking_id: TrackingId,
    ) -> Result<Vec<CompletedPart>, TrackerError> {
        Ok(self
            .load_session(tracking_id)
            .await?
            .completed_parts_ordered())
    }

    #[instrument(skip(self), fields(tracking_id = %tracking_id))]
    async fn abandon_tracking(&self, tracking_id: TrackingId) -> Result<bool, TrackerError> {
        let mut tx = self.pool.begin().await.map_err(persistence)?;

        let row = sqlx::query(
            "SELECT session FROM part_tracking_sessions WHERE tracking_id = $1 FOR UPDATE",
        )
        .bind(tracking_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(persistence)?
        .ok_or(TrackerError::NotFound(tracking_id))?;

        let Json(mut session): Json<TrackingSession> =
            row.try_get("session").map_err(persistence)?;

        let newly_sealed = session.abandon();
        if newly_sealed {
            sqlx::query(
                "UPDATE part_tracking_sessions SET session = $1, updated_at = $2 WHERE tracking_id = $3",
            )
            .bind(Json(&session))
            .bind(session.updated_at)
            .bind(tracking_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(persistence)?;
        }

        tx.commit().await.map_err(persistence)?;
        Ok(newly_sealed)
    }

    #[instrument(skip(self), fields(tracking_id = %tracking_id))]
    async fn cleanup_tracking(&self, tracking_id: TrackingId) -> Result<bool, TrackerError> {
        let result = sqlx::query("DELETE FROM part_tracking_sessions WHERE tracking_id = $1")
            .bind(tracking_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(persistence)?;
        Ok(result.rows_affected() > 0)
    }
}
