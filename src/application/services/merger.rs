use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::Instrument;

use crate::application::ports::{
    publish_json, ChannelError, MessageChannel, PartTracker, TrackerError,
};
use crate::domain::{CompletedPart, MergeCompleted, MergeFailed, MergeTrigger};
use crate::infrastructure::messaging::routing;

/// Separator between part outputs in the final document. Parts are
/// markdown; a blank line keeps block structure intact across the seam.
const PART_SEPARATOR: &str = "\n\n";

const PERSISTENCE_RETRIES: u32 = 3;
const PERSISTENCE_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("tracker: {0}")]
    Tracker(#[from] TrackerError),
    #[error("channel: {0}")]
    Channel(#[from] ChannelError),
}

/// Consumes merge triggers, reassembles completed parts in part-number
/// order, and hands the final document to the downstream sink.
pub struct Merger {
    tracker: Arc<dyn PartTracker>,
    channel: Arc<dyn MessageChannel>,
}

impl Merger {
    pub fn new(tracker: Arc<dyn PartTracker>, channel: Arc<dyn MessageChannel>) -> Self {
        Self { tracker, channel }
    }

    pub async fn run(self: Arc<Self>) {
        let mut rx = match self.channel.consume(routing::MERGE_TRIGGER_QUEUE).await {
            Ok(rx) => rx,
            Err(e) => {
                tracing::error!(error = %e, "Merger could not attach consumer");
                return;
            }
        };

        tracing::info!("Merger started");
        while let Some(delivery) = rx.recv().await {
            let trigger: MergeTrigger = match serde_json::from_slice(&delivery.payload) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding malformed merge trigger");
                    let _ = delivery.reject(false).await;
                    continue;
                }
            };

            let span = tracing::info_span!(
                "merge",
                document_id = %trigger.document_id,
                tracking_id = %trigger.tracking_id,
            );
            async {
                match self.merge(&trigger).await {
                    Ok(()) => {
                        let _ = delivery.ack().await;
                    }
                    Err(MergeError::Tracker(TrackerError::Persistence(ref detail))) => {
                        tracing::warn!(detail, "Tracker unavailable during merge; requeueing");
                        let _ = delivery.reject(true).await;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Merge failed");
                        let _ = delivery.reject(false).await;
                    }
                }
            }
            .instrument(span)
            .await;
        }
        tracing::info!("Merger stopped: channel closed");
    }

    async fn merge(&self, trigger: &MergeTrigger) -> Result<(), MergeError> {
        let parts = match self.fetch_parts_with_backoff(trigger).await {
            Ok(parts) => parts,
            Err(TrackerError::NotFound(tracking_id)) => {
                // Duplicate trigger delivery after a successful merge
                // already cleaned the session up.
                tracing::warn!(%tracking_id, "No session for merge trigger; assuming already merged");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        match reassemble(&parts) {
            Ok(final_content) => {
                let completed = MergeCompleted {
                    message_id: uuid::Uuid::new_v4(),
                    document_id: trigger.document_id,
                    final_content,
                    completed_at: Utc::now(),
                };
                publish_json(self.channel.as_ref(), routing::MERGE_COMPLETED, &completed).await?;

                // Cleanup only after the downstream publish: a crash in
                // between redelivers the trigger, and the NotFound arm above
                // absorbs the duplicate.
                self.tracker.cleanup_tracking(trigger.tracking_id).await?;
                tracing::info!(parts = parts.len(), "Merge completed; session cleaned up");
                Ok(())
            }
            Err(failure) => {
                // Session is deliberately left in place: it stays
                // inspectable and re-merge eligible for an operator.
                tracing::error!(
                    part_number = ?failure.part_number,
                    reason = %failure.reason,
                    "Reassembly failed; session preserved"
                );
                let failed = MergeFailed {
                    message_id: uuid::Uuid::new_v4(),
                    document_id: trigger.document_id,
                    tracking_id: trigger.tracking_id,
                    part_number: failure.part_number,
                    reason: failure.reason,
                };
                publish_json(self.channel.as_ref(), routing::MERGE_FAILED, &failed).await?;
                Ok(())
            }
        }
    }

    async fn fetch_parts_with_backoff(
        &self,
        trigger: &MergeTrigger,
    ) -> Result<Vec<CompletedPart>, TrackerError> {
        let mut attempt = 0;
        loop {
            match self.tracker.get_completed_parts(trigger.tracking_id).await {
                Err(e) if e.is_retryable() && attempt < PERSISTENCE_RETRIES => {
                    tracing::warn!(error = %e, attempt, "Tracker unavailable; backing off");
                    tokio::time::sleep(PERSISTENCE_BACKOFF * 2u32.saturating_pow(attempt)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

struct ReassemblyFailure {
    part_number: Option<u32>,
    reason: String,
}

/// Concatenates part outputs in the order given (the tracker guarantees
/// part-number ascending). A part with no stored output is corrupt state —
/// the session must have recorded data for every part it counts complete.
fn reassemble(parts: &[CompletedPart]) -> Result<String, ReassemblyFailure> {
    if parts.is_empty() {
        return Err(ReassemblyFailure {
            part_number: None,
            reason: "session has no completed parts".to_string(),
        });
    }

    let mut pieces = Vec::with_capacity(parts.len());
    for part in parts {
        match &part.data {
            Some(data) => pieces.push(data.as_str()),
            None => {
                return Err(ReassemblyFailure {
                    part_number: Some(part.part_number),
                    reason: format!("part {} has no stored output", part.part_number),
                });
            }
        }
    }

    Ok(pieces.join(PART_SEPARATOR))
}
