use capture_pipeline::broadcast::{BroadcastChannel, Delivery};
use std::time::Duration;

#[tokio::test]
async fn test_late_joiner_sees_only_later_payloads() {
    let channel = BroadcastChannel::new();
    let mut early = channel.subscribe();
    channel.publish(1);
    let mut late = channel.subscribe();
    channel.publish(2);

    assert_eq!(early.recv().await, Some(1));
    assert_eq!(early.recv().await, Some(2));
    assert_eq!(late.recv().await, Some(2));
    assert_eq!(late.try_recv(), None);
}

#[tokio::test]
async fn test_order_is_preserved_per_subscriber() {
    let channel = BroadcastChannel::new();
    let mut a = channel.subscribe();
    let mut b = channel.subscribe();
    for i in 0..100 {
        channel.publish(i);
    }
    for i in 0..100 {
        assert_eq!(a.recv().await, Some(i));
    }
    for i in 0..100 {
        assert_eq!(b.recv().await, Some(i));
    }
}

#[tokio::test]
async fn test_slow_subscriber_does_not_block_others() {
    let channel = BroadcastChannel::new();
    let _idle = channel.subscribe();
    let mut active = channel.subscribe();
    for i in 0..1000 {
        channel.publish(i);
    }
    assert_eq!(active.recv().await, Some(0));
}

#[tokio::test]
async fn test_publish_without_subscribers_is_a_noop() {
    let channel: BroadcastChannel<String> = BroadcastChannel::new();
    channel.publish("nobody listening".to_string());
    assert_eq!(channel.subscriber_count(), 0);
}

#[tokio::test]
async fn test_unsubscribe_is_idempotent() {
    let channel = BroadcastChannel::new();
    let mut subscription = channel.subscribe();
    let other = channel.subscribe();
    channel.publish("before");

    channel.unsubscribe(&subscription);
    channel.unsubscribe(&subscription);
    assert_eq!(channel.subscriber_count(), 1);

    channel.publish("after");
    assert_eq!(subscription.recv().await, Some("before"));
    assert_eq!(subscription.recv().await, None);
    drop(other);
    assert_eq!(channel.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_when_idle() {
    let channel = BroadcastChannel::new();
    let mut subscription = channel.subscribe();
    let keep_alive = Duration::from_secs(10);

    assert_eq!(subscription.next_or_heartbeat(keep_alive).await, Delivery::Heartbeat);
    channel.publish(7);
    assert_eq!(subscription.next_or_heartbeat(keep_alive).await, Delivery::Payload(7));

    channel.unsubscribe(&subscription);
    assert_eq!(subscription.next_or_heartbeat(keep_alive).await, Delivery::Closed);
}

#[tokio::test]
async fn test_concurrent_publishers_and_subscribers() {
    let channel = BroadcastChannel::new();
    let mut subscription = channel.subscribe();

    let mut tasks = Vec::new();
    for worker in 0..4u32 {
        let channel = channel.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..50u32 {
                channel.publish(worker * 1000 + i);
                let _transient = channel.subscribe();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let mut received = Vec::new();
    while let Some(value) = subscription.try_recv() {
        received.push(value);
    }
    assert_eq!(received.len(), 200);
    for worker in 0..4u32 {
        let mine: Vec<u32> = received.iter().copied().filter(|v| v / 1000 == worker).collect();
        let mut sorted = mine.clone();
        sorted.sort();
        assert_eq!(mine, sorted);
    }
    assert_eq!(channel.subscriber_count(), 1);
}

#[test]
fn test_waiting_subscriber_is_woken_by_publish() {
    let channel = BroadcastChannel::new();
    let mut subscription = channel.subscribe();
    let mut recv = tokio_test::task::spawn(subscription.recv());

    tokio_test::assert_pending!(recv.poll());
    channel.publish(3);
    assert!(recv.is_woken());
    assert_eq!(tokio_test::assert_ready!(recv.poll()), Some(3));
}
