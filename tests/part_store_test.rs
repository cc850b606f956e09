use partwise::application::ports::{PartStore, PartStoreError};
use partwise::domain::{DocumentId, PayloadRef, TrackingId};
use partwise::infrastructure::storage::ObjectPartStore;

#[tokio::test]
async fn given_local_backend_when_storing_part_then_it_reads_back_and_deletes() {
    let dir = tempfile::tempdir().unwrap();
    let store = ObjectPartStore::local(dir.path().to_path_buf()).unwrap();

    let document_id = DocumentId::new();
    let tracking_id = TrackingId::new();
    let payload_ref = PayloadRef::for_part(&document_id, &tracking_id, 7);

    store.put(&payload_ref, b"part seven".to_vec()).await.unwrap();
    assert_eq!(store.get(&payload_ref).await.unwrap(), b"part seven");

    store.delete(&payload_ref).await.unwrap();
    assert!(matches!(
        store.get(&payload_ref).await,
        Err(PartStoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn given_missing_key_when_fetching_then_not_found() {
    let store = ObjectPartStore::in_memory();
    let payload_ref = PayloadRef::for_source(&DocumentId::new(), "missing.pdf");

    assert!(matches!(
        store.get(&payload_ref).await,
        Err(PartStoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn given_overwrite_when_storing_same_ref_then_latest_wins() {
    let store = ObjectPartStore::in_memory();
    let payload_ref = PayloadRef::for_part(&DocumentId::new(), &TrackingId::new(), 0);

    store.put(&payload_ref, b"first".to_vec()).await.unwrap();
    store.put(&payload_ref, b"second".to_vec()).await.unwrap();

    assert_eq!(store.get(&payload_ref).await.unwrap(), b"second");
}
