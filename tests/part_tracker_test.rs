use partwise::application::ports::{PartTracker, TrackerError};
use partwise::domain::DocumentId;
use partwise::infrastructure::tracking::InMemoryPartTracker;

#[tokio::test]
async fn given_zero_total_parts_when_initializing_then_rejects_invalid_argument() {
    let tracker = InMemoryPartTracker::new();

    let result = tracker.initialize_tracking(DocumentId::new(), 0).await;

    assert!(matches!(result, Err(TrackerError::InvalidArgument(_))));
}

#[tokio::test]
async fn given_same_document_when_initializing_twice_then_sessions_are_independent() {
    let tracker = InMemoryPartTracker::new();
    let doc = DocumentId::new();

    let first = tracker.initialize_tracking(doc, 2).await.unwrap();
    let second = tracker.initialize_tracking(doc, 3).await.unwrap();

    assert_ne!(first, second);
    tracker.mark_part_completed(first, 0, None).await.unwrap();

    let first_progress = tracker.get_tracking_progress(first).await.unwrap();
    let second_progress = tracker.get_tracking_progress(second).await.unwrap();
    assert_eq!(first_progress.completed_parts, 1);
    assert_eq!(second_progress.completed_parts, 0);
}

#[tokio::test]
async fn given_duplicate_completion_when_marking_then_second_call_is_noop() {
    let tracker = InMemoryPartTracker::new();
    let tracking_id = tracker
        .initialize_tracking(DocumentId::new(), 3)
        .await
        .unwrap();

    let first = tracker
        .mark_part_completed(tracking_id, 1, Some("one".to_string()))
        .await
        .unwrap();
    let second = tracker
        .mark_part_completed(tracking_id, 1, Some("one again".to_string()))
        .await
        .unwrap();

    assert!(first.newly_recorded);
    assert!(!second.newly_recorded);
    assert!(!second.completed_session);

    let parts = tracker.get_completed_parts(tracking_id).await.unwrap();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].data.as_deref(), Some("one"));
}

#[tokio::test]
async fn given_out_of_order_completions_when_fetching_parts_then_sorted_by_part_number() {
    let tracker = InMemoryPartTracker::new();
    let tracking_id = tracker
        .initialize_tracking(DocumentId::new(), 4)
        .await
        .unwrap();

    for part in [3u32, 0, 2, 1] {
        tracker
            .mark_part_completed(tracking_id, part, Some(format!("part-{part}")))
            .await
            .unwrap();
    }

    let parts = tracker.get_completed_parts(tracking_id).await.unwrap();
    let numbers: Vec<u32> = parts.iter().map(|p| p.part_number).collect();
    assert_eq!(numbers, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn given_part_out_of_range_when_marking_then_rejected() {
    let tracker = InMemoryPartTracker::new();
    let tracking_id = tracker
        .initialize_tracking(DocumentId::new(), 3)
        .await
        .unwrap();

    let result = tracker.mark_part_completed(tracking_id, 3, None).await;

    assert!(matches!(result, Err(TrackerError::OutOfRange(_))));
    let progress = tracker.get_tracking_progress(tracking_id).await.unwrap();
    assert_eq!(progress.completed_parts, 0);
}

#[tokio::test]
async fn given_unknown_tracking_id_when_marking_then_not_found() {
    let tracker = InMemoryPartTracker::new();
    let tracking_id = tracker
        .initialize_tracking(DocumentId::new(), 1)
        .await
        .unwrap();
    tracker.cleanup_tracking(tracking_id).await.unwrap();

    let result = tracker.mark_part_completed(tracking_id, 0, None).await;

    // A late result must fail loudly, not resurrect the session.
    assert!(matches!(result, Err(TrackerError::NotFound(_))));
}

#[tokio::test]
async fn given_final_part_when_marking_then_only_that_call_reports_session_complete() {
    let tracker = InMemoryPartTracker::new();
    let tracking_id = tracker
        .initialize_tracking(DocumentId::new(), 3)
        .await
        .unwrap();

    let a = tracker.mark_part_completed(tracking_id, 2, None).await.unwrap();
    let b = tracker.mark_part_completed(tracking_id, 0, None).await.unwrap();
    let c = tracker.mark_part_completed(tracking_id, 1, None).await.unwrap();
    let dup = tracker.mark_part_completed(tracking_id, 1, None).await.unwrap();

    assert!(!a.completed_session);
    assert!(!b.completed_session);
    assert!(c.completed_session);
    assert!(!dup.completed_session);
}

#[tokio::test]
async fn given_progress_scenario_when_completing_out_of_order_then_progress_tracks_exactly() {
    let tracker = InMemoryPartTracker::new();
    let tracking_id = tracker
        .initialize_tracking(DocumentId::new(), 3)
        .await
        .unwrap();

    tracker
        .mark_part_completed(tracking_id, 1, Some("b".to_string()))
        .await
        .unwrap();
    tracker
        .mark_part_completed(tracking_id, 0, Some("a".to_string()))
        .await
        .unwrap();

    let progress = tracker.get_tracking_progress(tracking_id).await.unwrap();
    assert_eq!(progress.completed_parts, 2);
    assert!(!progress.is_complete);
    assert!(!tracker.is_tracking_complete(tracking_id).await.unwrap());

    tracker
        .mark_part_completed(tracking_id, 2, Some("c".to_string()))
        .await
        .unwrap();

    assert!(tracker.is_tracking_complete(tracking_id).await.unwrap());
    let parts = tracker.get_completed_parts(tracking_id).await.unwrap();
    let data: Vec<&str> = parts.iter().filter_map(|p| p.data.as_deref()).collect();
    assert_eq!(data, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn given_abandoned_session_when_marking_then_not_found_and_reads_survive() {
    let tracker = InMemoryPartTracker::new();
    let tracking_id = tracker
        .initialize_tracking(DocumentId::new(), 2)
        .await
        .unwrap();
    tracker
        .mark_part_completed(tracking_id, 0, Some("done".to_string()))
        .await
        .unwrap();

    assert!(tracker.abandon_tracking(tracking_id).await.unwrap());
    assert!(!tracker.abandon_tracking(tracking_id).await.unwrap());

    // A late success for the remaining part must not complete the session.
    let result = tracker
        .mark_part_completed(tracking_id, 1, Some("late".to_string()))
        .await;
    assert!(matches!(result, Err(TrackerError::NotFound(_))));

    // The sealed record stays readable for postmortem.
    let progress = tracker.get_tracking_progress(tracking_id).await.unwrap();
    assert!(progress.is_abandoned);
    assert_eq!(progress.completed_parts, 1);
    assert!(!progress.is_complete);
}

#[tokio::test]
async fn given_cleanup_when_called_twice_then_second_reports_absent() {
    let tracker = InMemoryPartTracker::new();
    let tracking_id = tracker
        .initialize_tracking(DocumentId::new(), 1)
        .await
        .unwrap();

    assert!(tracker.cleanup_tracking(tracking_id).await.unwrap());
    assert!(!tracker.cleanup_tracking(tracking_id).await.unwrap());
}
