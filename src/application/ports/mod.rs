mod message_channel;
mod part_converter;
mod part_store;
mod part_tracker;

pub use message_channel::{
    publish_json, Acker, ChannelError, DeadLetterTarget, Delivery, MessageChannel, QueueSpec,
};
pub use part_converter::{ConvertError, PartConverter};
pub use part_store::{PartStore, PartStoreError};
pub use part_tracker::{PartTracker, TrackerError};
