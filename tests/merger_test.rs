use std::sync::Arc;
use std::time::Duration;

use partwise::application::ports::{publish_json, MessageChannel, PartTracker, TrackerError};
use partwise::application::services::Merger;
use partwise::domain::{DocumentId, MergeCompleted, MergeFailed, MergeTrigger};
use partwise::infrastructure::messaging::{declare_queues, routing, InMemoryChannel};
use partwise::infrastructure::tracking::InMemoryPartTracker;
use tokio::time::timeout;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

struct Fixture {
    channel: Arc<InMemoryChannel>,
    tracker: Arc<InMemoryPartTracker>,
}

async fn fixture() -> Fixture {
    let channel = InMemoryChannel::new();
    declare_queues(channel.as_ref()).await.unwrap();
    let tracker = Arc::new(InMemoryPartTracker::new());

    let merger = Arc::new(Merger::new(
        tracker.clone() as Arc<dyn PartTracker>,
        channel.clone(),
    ));
    tokio::spawn(merger.run());

    Fixture { channel, tracker }
}

#[tokio::test]
async fn given_parts_completed_out_of_order_when_merging_then_output_is_part_ordered() {
    let f = fixture().await;
    let document_id = DocumentId::new();
    let tracking_id = f.tracker.initialize_tracking(document_id, 3).await.unwrap();
    for (part, data) in [(2u32, "charlie"), (0, "alpha"), (1, "bravo")] {
        f.tracker
            .mark_part_completed(tracking_id, part, Some(data.to_string()))
            .await
            .unwrap();
    }

    let mut merged_rx = f
        .channel
        .consume(routing::MERGE_COMPLETED_QUEUE)
        .await
        .unwrap();
    publish_json(
        f.channel.as_ref(),
        routing::MERGE_TRIGGER,
        &MergeTrigger::new(document_id, tracking_id),
    )
    .await
    .unwrap();

    let delivery = timeout(RECV_TIMEOUT, merged_rx.recv()).await.unwrap().unwrap();
    let merged: MergeCompleted = serde_json::from_slice(&delivery.payload).unwrap();
    delivery.ack().await.unwrap();

    assert_eq!(merged.final_content, "alpha\n\nbravo\n\ncharlie");

    // Merge success cleans the session up.
    let result = f.tracker.get_tracking_progress(tracking_id).await;
    assert!(matches!(result, Err(TrackerError::NotFound(_))));
}

#[tokio::test]
async fn given_part_with_missing_output_when_merging_then_merge_failed_and_session_preserved() {
    let f = fixture().await;
    let document_id = DocumentId::new();
    let tracking_id = f.tracker.initialize_tracking(document_id, 2).await.unwrap();
    f.tracker
        .mark_part_completed(tracking_id, 0, Some("alpha".to_string()))
        .await
        .unwrap();
    // Part 1 completed without stored output: corrupt state at merge time.
    f.tracker
        .mark_part_completed(tracking_id, 1, None)
        .await
        .unwrap();

    let mut failures_rx = f.channel.consume(routing::FAILURES_QUEUE).await.unwrap();
    publish_json(
        f.channel.as_ref(),
        routing::MERGE_TRIGGER,
        &MergeTrigger::new(document_id, tracking_id),
    )
    .await
    .unwrap();

    let delivery = timeout(RECV_TIMEOUT, failures_rx.recv()).await.unwrap().unwrap();
    let failed: MergeFailed = serde_json::from_slice(&delivery.payload).unwrap();
    delivery.ack().await.unwrap();

    assert_eq!(failed.tracking_id, tracking_id);
    assert_eq!(failed.part_number, Some(1));

    // Session stays inspectable and re-merge eligible.
    let progress = f.tracker.get_tracking_progress(tracking_id).await.unwrap();
    assert!(progress.is_complete);
}

#[tokio::test]
async fn given_duplicate_trigger_after_merge_when_processed_then_absorbed_silently() {
    let f = fixture().await;
    let document_id = DocumentId::new();
    let tracking_id = f.tracker.initialize_tracking(document_id, 1).await.unwrap();
    f.tracker
        .mark_part_completed(tracking_id, 0, Some("only".to_string()))
        .await
        .unwrap();

    let mut merged_rx = f
        .channel
        .consume(routing::MERGE_COMPLETED_QUEUE)
        .await
        .unwrap();

    let trigger = MergeTrigger::new(document_id, tracking_id);
    publish_json(f.channel.as_ref(), routing::MERGE_TRIGGER, &trigger)
        .await
        .unwrap();
    let first = timeout(RECV_TIMEOUT, merged_rx.recv()).await.unwrap().unwrap();
    first.ack().await.unwrap();

    // At-least-once delivery: the same trigger arrives again after cleanup.
    publish_json(f.channel.as_ref(), routing::MERGE_TRIGGER, &trigger)
        .await
        .unwrap();

    assert!(timeout(Duration::from_millis(300), merged_rx.recv())
        .await
        .is_err());
}
