use std::time::Duration;
use taskrelay_core::messaging::{InMemoryQueueClient, MessagingError, QueueClient, TaskMessage, TaskPublisher};
use taskrelay_core::resilience::RetryPolicy;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_publish_backs_off_exponentially() {
    let broker = InMemoryQueueClient::new("tasks", 10).with_publish_policy(RetryPolicy::exponential(
        5,
        Duration::from_secs(2),
        Duration::from_secs(60),
    ));
    broker.fail_next_publishes(3);
    let started = Instant::now();

    broker.publish(&TaskMessage::new(1, "payload")).await.unwrap();

    // 2s + 4s + 8s between the four attempts
    assert_eq!(started.elapsed(), Duration::from_secs(14));
    assert_eq!(broker.ready_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_gives_up_after_max_attempts() {
    let broker = InMemoryQueueClient::new("tasks", 10)
        .with_connect_policy(RetryPolicy::fixed(4, Duration::from_millis(500)));
    broker.fail_next_connects(u32::MAX);
    let started = Instant::now();

    let err = broker.connect().await.unwrap_err();

    assert!(matches!(
        err,
        MessagingError::ConnectionRetriesExhausted { attempts: 4, .. }
    ));
    assert!(err.is_connection_error());
    assert_eq!(broker.connect_attempts(), 4);
    assert_eq!(started.elapsed(), Duration::from_millis(1500));
    assert!(!broker.connection_state().is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_connect_recovers_within_policy() {
    let broker = InMemoryQueueClient::new("tasks", 10)
        .with_connect_policy(RetryPolicy::fixed(4, Duration::from_millis(500)));
    broker.fail_next_connects(2);

    broker.connect().await.unwrap();

    assert_eq!(broker.connect_attempts(), 3);
    assert!(broker.connection_state().is_connected());
}
