use std::time::Duration;

use partwise::application::ports::{DeadLetterTarget, MessageChannel, QueueSpec};
use partwise::infrastructure::messaging::InMemoryChannel;
use tokio::time::timeout;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

fn dlx() -> DeadLetterTarget {
    DeadLetterTarget {
        exchange: String::new(),
        routing_key: "test.dead".to_string(),
    }
}

async fn declare_dlq(channel: &InMemoryChannel) {
    channel
        .declare_queue(&QueueSpec::durable("dead").bind("test.dead"))
        .await
        .unwrap();
}

#[tokio::test]
async fn given_exact_binding_when_publishing_then_only_bound_queue_receives() {
    let channel = InMemoryChannel::new();
    channel
        .declare_queue(&QueueSpec::durable("a").bind("topic.a"))
        .await
        .unwrap();
    channel
        .declare_queue(&QueueSpec::durable("b").bind("topic.b"))
        .await
        .unwrap();

    channel.publish("topic.a", b"hello".to_vec()).await.unwrap();

    let mut rx_a = channel.consume("a").await.unwrap();
    let mut rx_b = channel.consume("b").await.unwrap();

    let delivery = timeout(RECV_TIMEOUT, rx_a.recv()).await.unwrap().unwrap();
    assert_eq!(delivery.payload, b"hello");
    delivery.ack().await.unwrap();

    assert!(timeout(Duration::from_millis(100), rx_b.recv()).await.is_err());
}

#[tokio::test]
async fn given_prefix_binding_when_publishing_then_matching_keys_are_routed() {
    let channel = InMemoryChannel::new();
    channel
        .declare_queue(&QueueSpec::durable("all-conversion").bind("part.conversion.*"))
        .await
        .unwrap();

    channel
        .publish("part.conversion.completed", b"done".to_vec())
        .await
        .unwrap();
    channel
        .publish("part.merge.trigger", b"nope".to_vec())
        .await
        .unwrap();

    let mut rx = channel.consume("all-conversion").await.unwrap();
    let delivery = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(delivery.payload, b"done");
    delivery.ack().await.unwrap();

    assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
}

#[tokio::test]
async fn given_rejected_with_requeue_when_redelivered_then_flagged_redelivered() {
    let channel = InMemoryChannel::new();
    channel
        .declare_queue(&QueueSpec::durable("work").bind("w"))
        .await
        .unwrap();
    channel.publish("w", b"job".to_vec()).await.unwrap();

    let mut rx = channel.consume("work").await.unwrap();
    let first = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert!(!first.redelivered);
    first.reject(true).await.unwrap();

    let second = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert!(second.redelivered);
    assert_eq!(second.payload, b"job");
    second.ack().await.unwrap();
}

#[tokio::test]
async fn given_rejected_without_requeue_when_queue_has_dlx_then_message_dead_letters() {
    let channel = InMemoryChannel::new();
    declare_dlq(&channel).await;
    channel
        .declare_queue(&QueueSpec::durable("work").bind("w").with_dead_letter(dlx()))
        .await
        .unwrap();
    channel.publish("w", b"poison".to_vec()).await.unwrap();

    let mut rx = channel.consume("work").await.unwrap();
    let delivery = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    delivery.reject(false).await.unwrap();

    let mut dead_rx = channel.consume("dead").await.unwrap();
    let dead = timeout(RECV_TIMEOUT, dead_rx.recv()).await.unwrap().unwrap();
    assert_eq!(dead.payload, b"poison");
    dead.ack().await.unwrap();
}

#[tokio::test]
async fn given_max_length_when_overflowing_then_oldest_is_evicted_to_dlx() {
    let channel = InMemoryChannel::new();
    declare_dlq(&channel).await;
    channel
        .declare_queue(
            &QueueSpec::durable("bounded")
                .bind("b")
                .with_max_length(2)
                .with_dead_letter(dlx()),
        )
        .await
        .unwrap();

    channel.publish("b", b"first".to_vec()).await.unwrap();
    channel.publish("b", b"second".to_vec()).await.unwrap();
    channel.publish("b", b"third".to_vec()).await.unwrap();

    let mut dead_rx = channel.consume("dead").await.unwrap();
    let evicted = timeout(RECV_TIMEOUT, dead_rx.recv()).await.unwrap().unwrap();
    assert_eq!(evicted.payload, b"first");
    evicted.ack().await.unwrap();

    let mut rx = channel.consume("bounded").await.unwrap();
    let kept = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(kept.payload, b"second");
    kept.ack().await.unwrap();
}

#[tokio::test]
async fn given_expired_message_when_delivered_then_dead_lettered_instead() {
    let channel = InMemoryChannel::new();
    declare_dlq(&channel).await;
    channel
        .declare_queue(
            &QueueSpec::durable("expiring")
                .bind("e")
                .with_ttl(Duration::from_millis(20))
                .with_dead_letter(dlx()),
        )
        .await
        .unwrap();

    channel.publish("e", b"stale".to_vec()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    let mut rx = channel.consume("expiring").await.unwrap();
    assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());

    let mut dead_rx = channel.consume("dead").await.unwrap();
    let dead = timeout(RECV_TIMEOUT, dead_rx.recv()).await.unwrap().unwrap();
    assert_eq!(dead.payload, b"stale");
    dead.ack().await.unwrap();
}

#[tokio::test]
async fn given_two_consumers_when_publishing_then_messages_are_shared_not_duplicated() {
    let channel = InMemoryChannel::new();
    channel
        .declare_queue(&QueueSpec::durable("shared").bind("s"))
        .await
        .unwrap();

    let mut rx1 = channel.consume("shared").await.unwrap();
    let mut rx2 = channel.consume("shared").await.unwrap();

    channel.publish("s", b"one".to_vec()).await.unwrap();
    channel.publish("s", b"two".to_vec()).await.unwrap();

    let d1 = timeout(RECV_TIMEOUT, rx1.recv()).await.unwrap().unwrap();
    let d2 = timeout(RECV_TIMEOUT, rx2.recv()).await.unwrap().unwrap();
    let mut payloads = vec![d1.payload.clone(), d2.payload.clone()];
    payloads.sort();
    assert_eq!(payloads, vec![b"one".to_vec(), b"two".to_vec()]);
    d1.ack().await.unwrap();
    d2.ack().await.unwrap();
}
