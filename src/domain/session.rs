use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DocumentId, TrackingId};

/// One converted part, as recorded by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    pub part_number: u32,
    /// Conversion output. Opaque to the tracker; the merger interprets it.
    pub data: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// Result of recording a part completion.
///
/// `newly_recorded` is false when the call was an idempotent replay of an
/// already-recorded part. `completed_session` is true only for the single
/// call that transitioned the session to complete; it is computed under the
/// same lock/transaction as the mutation so racing completions for distinct
/// parts cannot both observe the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkOutcome {
    pub newly_recorded: bool,
    pub completed_session: bool,
}

/// Read-only snapshot of split/merge progress for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingProgress {
    pub total_parts: u32,
    pub completed_parts: u32,
    pub is_complete: bool,
    pub is_abandoned: bool,
    pub completed_part_numbers: Vec<u32>,
}

/// Durable record of split/completion progress for one document-processing
/// attempt. Both tracker backends persist this record verbatim; all state
/// transitions live here so the backends stay thin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingSession {
    pub tracking_id: TrackingId,
    pub document_id: DocumentId,
    pub total_parts: u32,
    completed: BTreeSet<u32>,
    parts: Vec<CompletedPart>,
    #[serde(default)]
    abandoned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrackingSession {
    /// Callers validate `total_parts > 0` before construction; the tracker
    /// ports reject zero with `InvalidArgument`.
    pub fn new(document_id: DocumentId, total_parts: u32) -> Self {
        let now = Utc::now();
        Self {
            tracking_id: TrackingId::new(),
            document_id,
            total_parts,
            completed: BTreeSet::new(),
            parts: Vec::new(),
            abandoned: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Seals the session terminally after abandonment. Returns `false` when
    /// the session was already sealed. Reads keep working so the record
    /// stays inspectable; the tracker backends reject further marks.
    pub fn abandon(&mut self) -> bool {
        if self.abandoned {
            return false;
        }
        self.abandoned = true;
        self.updated_at = Utc::now();
        true
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    /// Records a part completion. Idempotent: a replay for an
    /// already-completed part number changes nothing and reports
    /// `newly_recorded: false`.
    pub fn record_part(
        &mut self,
        part_number: u32,
        data: Option<String>,
    ) -> Result<MarkOutcome, PartOutOfRange> {
        if part_number >= self.total_parts {
            return Err(PartOutOfRange {
                part_number,
                total_parts: self.total_parts,
            });
        }

        if !self.completed.insert(part_number) {
            return Ok(MarkOutcome {
                newly_recorded: false,
                completed_session: false,
            });
        }

        let now = Utc::now();
        self.parts.push(CompletedPart {
            part_number,
            data,
            completed_at: now,
        });
        self.updated_at = now;

        Ok(MarkOutcome {
            newly_recorded: true,
            completed_session: self.is_complete(),
        })
    }

    pub fn is_complete(&self) -> bool {
        self.completed.len() as u32 == self.total_parts
    }

    pub fn progress(&self) -> TrackingProgress {
        TrackingProgress {
            total_parts: self.total_parts,
            completed_parts: self.completed.len() as u32,
            is_complete: self.is_complete(),
            is_abandoned: self.abandoned,
            completed_part_numbers: self.completed.iter().copied().collect(),
        }
    }

    /// Completed parts sorted by part number ascending. Parts finish in
    /// arbitrary order under concurrent workers; the merger depends on this
    /// ordering, never on completion time.
    pub fn completed_parts_ordered(&self) -> Vec<CompletedPart> {
        let mut parts = self.parts.clone();
        parts.sort_by_key(|p| p.part_number);
        parts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("part number {part_number} outside [0, {total_parts})")]
pub struct PartOutOfRange {
    pub part_number: u32,
    pub total_parts: u32,
}
