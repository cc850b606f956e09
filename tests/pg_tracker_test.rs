//! Exercises the PostgreSQL tracker backend against a real database.
//!
//! Run with `DATABASE_URL` pointing at a disposable database:
//! `DATABASE_URL=postgres://... cargo test -- --ignored`

use partwise::application::ports::{PartTracker, TrackerError};
use partwise::domain::DocumentId;
use partwise::infrastructure::tracking::{create_pool, PgPartTracker};

async fn tracker() -> Option<PgPartTracker> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = create_pool(&url, 2).await.expect("connect to test database");
    let tracker = PgPartTracker::new(pool);
    tracker.ensure_schema().await.expect("ensure schema");
    Some(tracker)
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn given_pg_backend_when_marking_all_parts_then_final_mark_completes_session() {
    let Some(tracker) = tracker().await else {
        panic!("DATABASE_URL must be set for ignored tests");
    };

    let tracking_id = tracker
        .initialize_tracking(DocumentId::new(), 2)
        .await
        .unwrap();

    let first = tracker
        .mark_part_completed(tracking_id, 1, Some("second half".to_string()))
        .await
        .unwrap();
    assert!(first.newly_recorded);
    assert!(!first.completed_session);

    let last = tracker
        .mark_part_completed(tracking_id, 0, Some("first half".to_string()))
        .await
        .unwrap();
    assert!(last.completed_session);

    let parts = tracker.get_completed_parts(tracking_id).await.unwrap();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].data.as_deref(), Some("first half"));
    assert_eq!(parts[1].data.as_deref(), Some("second half"));

    assert!(tracker.cleanup_tracking(tracking_id).await.unwrap());
    assert!(matches!(
        tracker.get_tracking_progress(tracking_id).await,
        Err(TrackerError::NotFound(_))
    ));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn given_pg_backend_when_duplicate_mark_races_then_payload_is_not_overwritten() {
    let Some(tracker) = tracker().await else {
        panic!("DATABASE_URL must be set for ignored tests");
    };

    let tracking_id = tracker
        .initialize_tracking(DocumentId::new(), 3)
        .await
        .unwrap();

    let first = tracker
        .mark_part_completed(tracking_id, 0, Some("original".to_string()))
        .await
        .unwrap();
    let duplicate = tracker
        .mark_part_completed(tracking_id, 0, Some("late duplicate".to_string()))
        .await
        .unwrap();

    assert!(first.newly_recorded);
    assert!(!duplicate.newly_recorded);

    let parts = tracker.get_completed_parts(tracking_id).await.unwrap();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].data.as_deref(), Some("original"));

    tracker.cleanup_tracking(tracking_id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn given_pg_backend_when_session_abandoned_then_marks_rejected_and_record_kept() {
    let Some(tracker) = tracker().await else {
        panic!("DATABASE_URL must be set for ignored tests");
    };

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

    let late = tracker
        .mark_part_completed(tracking_id, 1, Some("late".to_string()))
        .await;
    assert!(matches!(late, Err(TrackerError::NotFound(_))));

    let progress = tracker.get_tracking_progress(tracking_id).await.unwrap();
    assert!(progress.is_abandoned);
    assert!(!progress.is_complete);

    tracker.cleanup_tracking(tracking_id).await.unwrap();
}
