mod memory_tracker;
mod pg_pool;
mod pg_tracker;

pub use memory_tracker::InMemoryPartTracker;
pub use pg_pool::create_pool;
pub use pg_tracker::PgPartTracker;
