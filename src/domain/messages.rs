use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{DocumentId, PayloadRef, TrackingId};

/// Request to process one source document: split, convert, merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub message_id: Uuid,
    pub document_id: DocumentId,
    /// Where the source document lives in the part store.
    pub source_ref: PayloadRef,
    pub pages_per_part: Option<u32>,
}

impl ProcessRequest {
    pub fn new(document_id: DocumentId, source_ref: PayloadRef) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            document_id,
            source_ref,
            pages_per_part: None,
        }
    }
}

/// One conversion unit of work, published per part by the coordinator.
///
/// `attempt` is application retry state. The broker's native redelivery
/// count cannot be trusted to match the retry policy, so retries are
/// explicit: a failed part is republished with `attempt + 1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub message_id: Uuid,
    pub document_id: DocumentId,
    pub tracking_id: TrackingId,
    pub part_number: u32,
    pub total_parts: u32,
    pub payload_ref: PayloadRef,
    pub attempt: u32,
}

/// Outcome of one conversion attempt, published by a conversion worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PartOutcome {
    Completed { output: String },
    Failed { error_detail: String },
}

/// Per-part conversion result. Echoes the request fields so the coordinator
/// can republish a retry without consulting any other state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartResult {
    pub message_id: Uuid,
    pub document_id: DocumentId,
    pub tracking_id: TrackingId,
    pub part_number: u32,
    pub total_parts: u32,
    pub payload_ref: PayloadRef,
    pub attempt: u32,
    #[serde(flatten)]
    pub outcome: PartOutcome,
}

impl PartResult {
    pub fn from_request(request: &ConversionRequest, outcome: PartOutcome) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            document_id: request.document_id,
            tracking_id: request.tracking_id,
            part_number: request.part_number,
            total_parts: request.total_parts,
            payload_ref: request.payload_ref.clone(),
            attempt: request.attempt,
            outcome,
        }
    }
}

/// Advisory progress update, published on each newly recorded completion.
/// Consumers may lag or miss these; the merge trigger is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartProgress {
    pub message_id: Uuid,
    pub document_id: DocumentId,
    pub tracking_id: TrackingId,
    pub completed_parts: u32,
    pub total_parts: u32,
}

/// Emitted exactly once per session, at the moment the last part completes.
/// Edge-triggered: duplicate part results never produce a second trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeTrigger {
    pub message_id: Uuid,
    pub document_id: DocumentId,
    pub tracking_id: TrackingId,
}

impl MergeTrigger {
    pub fn new(document_id: DocumentId, tracking_id: TrackingId) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            document_id,
            tracking_id,
        }
    }
}

/// Final reassembled document, handed to the downstream sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeCompleted {
    pub message_id: Uuid,
    pub document_id: DocumentId,
    pub final_content: String,
    pub completed_at: DateTime<Utc>,
}

/// Merge could not reassemble the session. The session is kept for
/// inspection and operator-triggered re-merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeFailed {
    pub message_id: Uuid,
    pub document_id: DocumentId,
    pub tracking_id: TrackingId,
    /// The offending part, when one can be named.
    pub part_number: Option<u32>,
    pub reason: String,
}

/// A part exhausted its retry budget; the whole document is abandoned.
/// An event rather than a log line: no human polls logs for a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentAbandoned {
    pub message_id: Uuid,
    pub document_id: DocumentId,
    pub tracking_id: TrackingId,
    pub part_number: u32,
    pub attempts: u32,
    pub reason: String,
}
