use std::time::Duration;

use crate::application::ports::{ChannelError, DeadLetterTarget, MessageChannel, QueueSpec};

/// Routing keys and queue names for the pipeline. Each logical message
/// type maps to one stable routing key, bound to queues by exact match or
/// a trailing `.*` prefix.
pub mod routing {
    pub const SPLIT_REQUEST: &str = "part.split.request";
    pub const CONVERSION_REQUEST: &str = "part.conversion.request";
    pub const CONVERSION_COMPLETED: &str = "part.conversion.completed";
    pub const CONVERSION_FAILED: &str = "part.conversion.failed";
    pub const CONVERSION_PROGRESS: &str = "part.conversion.progress";
    pub const MERGE_TRIGGER: &str = "part.merge.trigger";
    pub const MERGE_COMPLETED: &str = "part.merge.completed";
    pub const MERGE_FAILED: &str = "part.merge.failed";
    pub const DOCUMENT_ABANDONED: &str = "part.document.abandoned";
    pub const DEAD_LETTER: &str = "part.dead-letter";

    pub const SPLIT_REQUEST_QUEUE: &str = "part-split-request";
    pub const CONVERSION_REQUEST_QUEUE: &str = "part-conversion-request";
    pub const PART_RESULT_QUEUE: &str = "part-conversion-result";
    pub const CONVERSION_PROGRESS_QUEUE: &str = "part-conversion-progress";
    pub const MERGE_TRIGGER_QUEUE: &str = "part-merge-trigger";
    pub const MERGE_COMPLETED_QUEUE: &str = "part-merge-completed";
    pub const FAILURES_QUEUE: &str = "part-failures";
    pub const DEAD_LETTER_QUEUE: &str = "part-dead-letter";
}

/// Progress events are advisory; a bounded, expiring queue is enough and
/// keeps an unwatched deployment from accumulating them forever.
const PROGRESS_TTL: Duration = Duration::from_secs(10 * 60);
const PROGRESS_MAX_LENGTH: usize = 1000;

fn dead_letter_target() -> DeadLetterTarget {
    DeadLetterTarget {
        exchange: String::new(),
        routing_key: routing::DEAD_LETTER.to_string(),
    }
}

/// Declares the full queue set. Idempotent; every worker role calls this
/// at startup so topology never depends on start order.
pub async fn declare_queues(channel: &dyn MessageChannel) -> Result<(), ChannelError> {
    let specs = [
        QueueSpec::durable(routing::SPLIT_REQUEST_QUEUE)
            .bind(routing::SPLIT_REQUEST)
            .with_dead_letter(dead_letter_target()),
        QueueSpec::durable(routing::CONVERSION_REQUEST_QUEUE)
            .bind(routing::CONVERSION_REQUEST)
            .with_dead_letter(dead_letter_target()),
        QueueSpec::durable(routing::PART_RESULT_QUEUE)
            .bind(routing::CONVERSION_COMPLETED)
            .bind(routing::CONVERSION_FAILED)
            .with_dead_letter(dead_letter_target()),
        QueueSpec::durable(routing::CONVERSION_PROGRESS_QUEUE)
            .bind(routing::CONVERSION_PROGRESS)
            .with_ttl(PROGRESS_TTL)
            .with_max_length(PROGRESS_MAX_LENGTH),
        QueueSpec::durable(routing::MERGE_TRIGGER_QUEUE)
            .bind(routing::MERGE_TRIGGER)
            .with_dead_letter(dead_letter_target()),
        QueueSpec::durable(routing::MERGE_COMPLETED_QUEUE).bind(routing::MERGE_COMPLETED),
        QueueSpec::durable(routing::FAILURES_QUEUE)
            .bind(routing::MERGE_FAILED)
            .bind(routing::DOCUMENT_ABANDONED),
        QueueSpec::durable(routing::DEAD_LETTER_QUEUE).bind(routing::DEAD_LETTER),
    ];

    for spec in &specs {
        channel.declare_queue(spec).await?;
    }
    Ok(())
}
