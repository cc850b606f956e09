mod conversion_worker;
mod coordinator;
mod merger;
mod splitter;

pub use conversion_worker::{ConversionWorker, ConversionWorkerConfig, Throttle};
pub use coordinator::{Coordinator, CoordinatorError, DispatchReceipt, RetryPolicy};
pub use merger::{MergeError, Merger};
pub use splitter::{
    reassemble_payloads, PartPlan, PartSlice, SplitError, SplitPolicy, Splitter,
};
