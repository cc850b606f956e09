mod memory_channel;
mod topology;

pub use memory_channel::InMemoryChannel;
pub use topology::{declare_queues, routing};
