use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;

use crate::application::ports::{
    publish_json, ChannelError, MessageChannel, PartStore, PartStoreError, PartTracker,
    TrackerError,
};
use crate::application::services::{SplitError, SplitPolicy, Splitter};
use crate::domain::{
    ConversionRequest, DocumentAbandoned, MergeTrigger, PartOutcome, PartProgress, PartResult,
    PayloadRef, ProcessRequest, TrackingId,
};
use crate::infrastructure::messaging::routing;

/// Document-level retry budget and backoff shape for transient conversion
/// failures. The delay doubles per attempt so N parts failing together do
/// not retry in lockstep forever.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
        }
    }
}

/// Bounded retry for tracker calls that fail on persistence. Other tracker
/// errors are surfaced immediately.
const PERSISTENCE_RETRIES: u32 = 3;

/// What dispatch produced for one document.
#[derive(Debug, Clone)]
pub struct DispatchReceipt {
    pub tracking_id: TrackingId,
    pub total_parts: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("split: {0}")]
    Split(#[from] SplitError),
    #[error("tracker: {0}")]
    Tracker(#[from] TrackerError),
    #[error("part store: {0}")]
    PartStore(#[from] PartStoreError),
    #[error("channel: {0}")]
    Channel(#[from] ChannelError),
    #[error("dispatch incomplete: parts {0:?} could not be enqueued")]
    DispatchIncomplete(Vec<u32>),
}

/// Splits incoming documents, initializes tracking, fans out conversion
/// requests, and — in an independent consumer loop — turns part results
/// into exactly one merge trigger per session.
pub struct Coordinator {
    tracker: Arc<dyn PartTracker>,
    channel: Arc<dyn MessageChannel>,
    part_store: Arc<dyn PartStore>,
    splitter: Splitter,
    retry: RetryPolicy,
}

impl Coordinator {
    pub fn new(
        tracker: Arc<dyn PartTracker>,
        channel: Arc<dyn MessageChannel>,
        part_store: Arc<dyn PartStore>,
        splitter: Splitter,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            tracker,
            channel,
            part_store,
            splitter,
            retry,
        }
    }

    /// Consumes process requests and dispatches each one.
    pub async fn run_dispatch_loop(self: Arc<Self>) {
        let mut rx = match self.channel.consume(routing::SPLIT_REQUEST_QUEUE).await {
            Ok(rx) => rx,
            Err(e) => {
                tracing::error!(error = %e, "Dispatch loop could not attach consumer");
                return;
            }
        };

        tracing::info!("Coordinator dispatch loop started");
        while let Some(delivery) = rx.recv().await {
            let request: ProcessRequest = match serde_json::from_slice(&delivery.payload) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding malformed process request");
                    let _ = delivery.reject(false).await;
                    continue;
                }
            };

            let span = tracing::info_span!(
                "dispatch",
                document_id = %request.document_id,
                message_id = %request.message_id,
            );
            async {
                match self.dispatch(&request).await {
                    Ok(receipt) => {
                        tracing::info!(
                            tracking_id = %receipt.tracking_id,
                            total_parts = receipt.total_parts,
                            "Document dispatched"
                        );
                        let _ = delivery.ack().await;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Dispatch failed");
                        let _ = delivery.reject(false).await;
                    }
                }
            }
            .instrument(span)
            .await;
        }
        tracing::info!("Coordinator dispatch loop stopped: channel closed");
    }

    /// Received → Splitting → Dispatching. Splits the source, creates the
    /// tracking session, stores part payloads, and publishes one conversion
    /// request per part.
    ///
    /// Dispatch is not transactional with session creation: a part that
    /// fails to enqueue is retried from the local ledger below, and parts
    /// already published will report completion against a valid session
    /// either way.
    pub async fn dispatch(
        &self,
        request: &ProcessRequest,
    ) -> Result<DispatchReceipt, CoordinatorError> {
        let content = self.part_store.get(&request.source_ref).await?;

        let plan = match request.pages_per_part {
            Some(pages) => self.splitter.split_with(
                request.document_id,
                &content,
                SplitPolicy::new(pages),
            )?,
            None => self.splitter.split(request.document_id, &content)?,
        };

        let tracking_id = self
            .tracker
            .initialize_tracking(request.document_id, plan.total_parts())
            .await?;

        let mut requests = Vec::with_capacity(plan.parts.len());
        for part in &plan.parts {
            let payload_ref =
                PayloadRef::for_part(&request.document_id, &tracking_id, part.part_number);
            self.part_store
                .put(&payload_ref, part.payload.clone())
                .await?;

            requests.push(ConversionRequest {
                message_id: uuid::Uuid::new_v4(),
                document_id: request.document_id,
                tracking_id,
                part_number: part.part_number,
                total_parts: plan.total_parts(),
                payload_ref,
                attempt: 0,
            });
        }

        // Local dispatch ledger: only parts whose publish failed are
        // re-published. The tracker is never consulted for this.
        let mut pending: Vec<&ConversionRequest> = requests.iter().collect();
        for round in 0..=PERSISTENCE_RETRIES {
            if pending.is_empty() {
                break;
            }
            if round > 0 {
                tokio::time::sleep(self.retry.backoff_for(round - 1)).await;
            }
            let mut still_pending = Vec::new();
            for req in pending {
                match publish_json(self.channel.as_ref(), routing::CONVERSION_REQUEST, req).await {
                    Ok(()) => {}
                    Err(e) => {
                        tracing::warn!(
                            part_number = req.part_number,
                            error = %e,
                            "Part enqueue failed; will re-publish"
                        );
                        still_pending.push(req);
                    }
                }
            }
            pending = still_pending;
        }

        if !pending.is_empty() {
            return Err(CoordinatorError::DispatchIncomplete(
                pending.iter().map(|r| r.part_number).collect(),
            ));
        }

        Ok(DispatchReceipt {
            tracking_id,
            total_parts: plan.total_parts(),
        })
    }

    /// Consumes per-part results. Runs independently of dispatch, typically
    /// as a second task over the same coordinator.
    pub async fn run_completion_loop(self: Arc<Self>) {
        let mut rx = match self.channel.consume(routing::PART_RESULT_QUEUE).await {
            Ok(rx) => rx,
            Err(e) => {
                tracing::error!(error = %e, "Completion loop could not attach consumer");
                return;
            }
        };

        tracing::info!("Coordinator completion loop started");
        while let Some(delivery) = rx.recv().await {
            let result: PartResult = match serde_json::from_slice(&delivery.payload) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding malformed part result");
                    let _ = delivery.reject(false).await;
                    continue;
                }
            };

            let span = tracing::info_span!(
                "part_result",
                document_id = %result.document_id,
                tracking_id = %result.tracking_id,
                part_number = result.part_number,
                attempt = result.attempt,
            );
            async {
                match self.handle_part_result(&result).await {
                    Ok(()) => {
                        let _ = delivery.ack().await;
                    }
                    Err(e) if is_transient(&e) => {
                        tracing::warn!(error = %e, "Transient failure handling part result; requeueing");
                        let _ = delivery.reject(true).await;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Part result handling failed; dead-lettering");
                        let _ = delivery.reject(false).await;
                    }
                }
            }
            .instrument(span)
            .await;
        }
        tracing::info!("Coordinator completion loop stopped: channel closed");
    }

    async fn handle_part_result(&self, result: &PartResult) -> Result<(), CoordinatorError> {
        match &result.outcome {
            PartOutcome::Completed { output } => self.handle_success(result, output.clone()).await,
            PartOutcome::Failed { error_detail } => self.handle_failure(result, error_detail).await,
        }
    }

    /// AwaitingCompletion → Triggering. Marks the part complete and, iff
    /// this call was the completing transition, emits the one merge trigger.
    async fn handle_success(
        &self,
        result: &PartResult,
        output: String,
    ) -> Result<(), CoordinatorError> {
        let outcome = match self
            .mark_with_backoff(result.tracking_id, result.part_number, Some(output))
            .await
        {
            Ok(outcome) => outcome,
            Err(TrackerError::NotFound(tracking_id)) => {
                // Late result for a cleaned-up or abandoned session: the
                // in-flight conversion was allowed to finish and its result
                // is dropped, never resurrected.
                tracing::warn!(%tracking_id, "Ignoring result for unknown session");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if !outcome.newly_recorded {
            tracing::debug!("Duplicate part result ignored");
            return Ok(());
        }

        // Advisory progress event; best-effort, never blocks the trigger.
        match self.tracker.get_tracking_progress(result.tracking_id).await {
            Ok(progress) => {
                let event = PartProgress {
                    message_id: uuid::Uuid::new_v4(),
                    document_id: result.document_id,
                    tracking_id: result.tracking_id,
                    completed_parts: progress.completed_parts,
                    total_parts: progress.total_parts,
                };
                if let Err(e) =
                    publish_json(self.channel.as_ref(), routing::CONVERSION_PROGRESS, &event).await
                {
                    tracing::debug!(error = %e, "Progress publish failed");
                }
            }
            Err(e) => tracing::debug!(error = %e, "Progress read failed"),
        }

        if outcome.completed_session {
            let trigger = MergeTrigger::new(result.document_id, result.tracking_id);
            publish_json(self.channel.as_ref(), routing::MERGE_TRIGGER, &trigger).await?;
            tracing::info!("All parts complete; merge triggered");
        }

        Ok(())
    }

    /// Republishes the failed part with `attempt + 1` under backoff, or
    /// abandons the document once the budget is exhausted. Sibling parts
    /// are unaffected either way.
    async fn handle_failure(
        &self,
        result: &PartResult,
        error_detail: &str,
    ) -> Result<(), CoordinatorError> {
        let next_attempt = result.attempt + 1;

        if next_attempt < self.retry.max_attempts {
            let request = ConversionRequest {
                message_id: uuid::Uuid::new_v4(),
                document_id: result.document_id,
                tracking_id: result.tracking_id,
                part_number: result.part_number,
                total_parts: result.total_parts,
                payload_ref: result.payload_ref.clone(),
                attempt: next_attempt,
            };
            let delay = self.retry.backoff_for(result.attempt);
            tracing::warn!(
                error_detail,
                next_attempt,
                delay_ms = delay.as_millis() as u64,
                "Part failed; scheduling retry"
            );

            let channel = Arc::clone(&self.channel);
            let tracker = Arc::clone(&self.tracker);
            let retry = self.retry;
            let failed = result.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let mut publish_attempt = 0;
                loop {
                    match publish_json(channel.as_ref(), routing::CONVERSION_REQUEST, &request)
                        .await
                    {
                        Ok(()) => return,
                        Err(e) if publish_attempt < PERSISTENCE_RETRIES => {
                            tracing::warn!(
                                error = %e,
                                publish_attempt,
                                "Retry publish failed; backing off"
                            );
                            tokio::time::sleep(retry.backoff_for(publish_attempt)).await;
                            publish_attempt += 1;
                        }
                        Err(e) => {
                            // The retry cannot be enqueued; without
                            // escalation the part would stall forever with
                            // nothing externally observable.
                            tracing::error!(
                                error = %e,
                                "Retry publish exhausted; abandoning document"
                            );
                            let reason = format!("retry publish failed: {e}");
                            if let Err(e) = abandon_document(
                                channel.as_ref(),
                                tracker.as_ref(),
                                &failed,
                                &reason,
                                next_attempt,
                            )
                            .await
                            {
                                tracing::error!(error = %e, "Abandonment failed");
                            }
                            return;
                        }
                    }
                }
            });
            return Ok(());
        }

        tracing::error!(
            error_detail,
            attempts = next_attempt,
            "Part exhausted retries; abandoning document"
        );
        abandon_document(
            self.channel.as_ref(),
            self.tracker.as_ref(),
            result,
            error_detail,
            next_attempt,
        )
        .await
    }

    async fn mark_with_backoff(
        &self,
        tracking_id: TrackingId,
        part_number: u32,
        data: Option<String>,
    ) -> Result<crate::domain::MarkOutcome, TrackerError> {
        let mut attempt = 0;
        loop {
            match self
                .tracker
                .mark_part_completed(tracking_id, part_number, data.clone())
                .await
            {
                Err(e) if e.is_retryable() && attempt < PERSISTENCE_RETRIES => {
                    let delay = self.retry.backoff_for(attempt);
                    tracing::warn!(error = %e, attempt, "Tracker unavailable; backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Terminal failure path. Seals the session first so a late success for the
/// failing part can never complete an abandoned document, then emits the
/// operator-facing events. The session record is kept for postmortem;
/// cleanup stays an explicit operator action.
///
/// Events are at-least-once: a crash between the seal and the publishes
/// redelivers the failed result, and the already-sealed arm republishes
/// them.
async fn abandon_document(
    channel: &dyn MessageChannel,
    tracker: &dyn PartTracker,
    result: &PartResult,
    reason: &str,
    attempts: u32,
) -> Result<(), CoordinatorError> {
    match tracker.abandon_tracking(result.tracking_id).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(tracking_id = %result.tracking_id, "Session already sealed");
        }
        Err(TrackerError::NotFound(tracking_id)) => {
            tracing::warn!(%tracking_id, "No session to abandon; dropping result");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    let abandoned = DocumentAbandoned {
        message_id: uuid::Uuid::new_v4(),
        document_id: result.document_id,
        tracking_id: result.tracking_id,
        part_number: result.part_number,
        attempts,
        reason: reason.to_string(),
    };
    publish_json(channel, routing::DOCUMENT_ABANDONED, &abandoned).await?;

    // The failing result itself lands in the dead-letter queue for operator
    // inspection, never silently dropped.
    publish_json(channel, routing::DEAD_LETTER, result).await?;

    Ok(())
}

fn is_transient(error: &CoordinatorError) -> bool {
    matches!(
        error,
        CoordinatorError::Tracker(TrackerError::Persistence(_))
    )
}
