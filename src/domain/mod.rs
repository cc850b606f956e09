mod ids;
mod messages;
mod payload_ref;
mod session;

pub use ids::{DocumentId, TrackingId};
pub use messages::{
    ConversionRequest, DocumentAbandoned, MergeCompleted, MergeFailed, MergeTrigger, PartOutcome,
    PartProgress, PartResult, ProcessRequest,
};
pub use payload_ref::PayloadRef;
pub use session::{
    CompletedPart, MarkOutcome, PartOutOfRange, TrackingProgress, TrackingSession,
};
