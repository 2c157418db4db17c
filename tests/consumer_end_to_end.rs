mod common;

use common::{wait_until, Pipeline, ScriptedWork, QUEUE};
use std::sync::Arc;
use std::time::Duration;
use taskrelay_core::health::HealthChecker;
use taskrelay_core::messaging::{BatchConfig, MessagingError, QueueClient};
use taskrelay_core::metrics::MetricLabel;
use taskrelay_core::orchestration::TaskConsumer;
use taskrelay_core::services::TaskService;
use taskrelay_core::state_machine::TaskStatus;
use tokio::sync::watch;

const WORK: Duration = Duration::from_millis(200);

fn consumer(pipeline: &Pipeline, batch: BatchConfig) -> TaskConsumer {
    TaskConsumer::new(
        Arc::new(pipeline.broker.clone()),
        pipeline.simulated(WORK),
        batch,
        QUEUE,
    )
    .unwrap()
}

fn service(pipeline: &Pipeline) -> TaskService {
    TaskService::new(
        pipeline.store.clone(),
        pipeline.cache.clone(),
        Arc::new(pipeline.broker.clone()),
    )
}

#[tokio::test(start_paused = true)]
async fn test_published_tasks_are_consumed_and_acknowledged() {
    let pipeline = Pipeline::new();
    let service = service(&pipeline);
    let mut ids = Vec::new();
    for i in 0..5 {
        let task = service.create_task(&format!("job {i}")).await.unwrap();
        ids.push(task.id().unwrap());
    }

    let consumer = consumer(&pipeline, BatchConfig::new(3, Duration::from_millis(100)));
    let stats = consumer.stats();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let driver = async {
        wait_until(|| stats.snapshot().messages_acknowledged == 5).await;
        shutdown_tx.send(true).unwrap();
    };
    let (result, ()) = tokio::join!(consumer.run(shutdown_rx), driver);
    let snapshot = result.unwrap();

    assert_eq!(snapshot.batches_processed, 2);
    assert_eq!(snapshot.messages_acknowledged, 5);
    assert_eq!(snapshot.messages_requeued, 0);
    for id in ids {
        assert_eq!(pipeline.store.status_of(id), Some(TaskStatus::Completed));
    }
    assert_eq!(pipeline.metrics.count(MetricLabel::Success), 5);
    assert_eq!(pipeline.broker.ready_count(), 0);
    assert_eq!(pipeline.broker.unacked_count(), 0);
    assert!(pipeline.broker.close_calls() >= 1);
    assert!(!pipeline.broker.connection_state().is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_before_consumption_is_acknowledged_without_work() {
    let pipeline = Pipeline::new();
    let service = service(&pipeline);
    let task = service.create_task("cancel me").await.unwrap();
    let task_id = task.id().unwrap();
    service.cancel_task(task_id).await.unwrap();

    let consumer = consumer(&pipeline, BatchConfig::new(10, Duration::from_millis(50)));
    let stats = consumer.stats();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let driver = async {
        wait_until(|| stats.snapshot().messages_acknowledged == 1).await;
        shutdown_tx.send(true).unwrap();
    };
    let (result, ()) = tokio::join!(consumer.run(shutdown_rx), driver);
    result.unwrap();

    assert_eq!(pipeline.store.status_of(task_id), Some(TaskStatus::Canceled));
    assert_eq!(pipeline.metrics.count(MetricLabel::Success), 0);
    assert!(pipeline.metrics.processing_durations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_consumer_reconnects_after_connection_loss() {
    let pipeline = Pipeline::new();
    let service = service(&pipeline);
    for i in 0..2 {
        service.create_task(&format!("before {i}")).await.unwrap();
    }

    let consumer = consumer(&pipeline, BatchConfig::new(2, Duration::from_millis(100)));
    let stats = consumer.stats();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let driver = async {
        wait_until(|| stats.snapshot().messages_acknowledged == 2).await;
        pipeline.broker.sever_connection();
        for i in 0..2 {
            service.create_task(&format!("after {i}")).await.unwrap();
        }
        wait_until(|| stats.snapshot().messages_acknowledged == 4).await;
        shutdown_tx.send(true).unwrap();
    };
    let (result, ()) = tokio::join!(consumer.run(shutdown_rx), driver);
    let snapshot = result.unwrap();

    assert_eq!(snapshot.reconnects, 1);
    assert_eq!(pipeline.broker.connection_state().reconnect_count(), 1);
    assert_eq!(pipeline.store.len(), 4);
    for id in 1..=4 {
        assert_eq!(pipeline.store.status_of(id), Some(TaskStatus::Completed));
    }
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_broker_is_fatal() {
    let pipeline = Pipeline::new();
    pipeline.broker.fail_next_connects(100);
    let consumer = consumer(&pipeline, BatchConfig::default());
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let err = consumer.run(shutdown_rx).await.unwrap_err();

    assert!(matches!(
        err,
        MessagingError::ConnectionRetriesExhausted { attempts: 3, .. }
    ));
    assert_eq!(pipeline.broker.connect_attempts(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_failed_reconnect_stops_consumer() {
    let pipeline = Pipeline::new();
    let service = service(&pipeline);
    service.create_task("first").await.unwrap();

    let consumer = consumer(&pipeline, BatchConfig::new(1, Duration::from_millis(100)));
    let stats = consumer.stats();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let driver = async {
        wait_until(|| stats.snapshot().messages_acknowledged == 1).await;
        pipeline.broker.fail_next_connects(100);
        pipeline.broker.sever_connection();
    };
    let (result, ()) = tokio::join!(consumer.run(shutdown_rx), driver);

    assert!(result.is_err());
    assert_eq!(stats.snapshot().reconnects, 0);
}

#[tokio::test(start_paused = true)]
async fn test_requeued_task_is_completed_on_redelivery() {
    let pipeline = Pipeline::new();
    let service = service(&pipeline);
    let task = service.create_task("flaky").await.unwrap();
    let task_id = task.id().unwrap();

    let consumer = TaskConsumer::new(
        Arc::new(pipeline.broker.clone()),
        pipeline.orchestrator(Arc::new(ScriptedWork::new(WORK).failing_once(task_id))),
        BatchConfig::new(1, Duration::from_millis(100)),
        QUEUE,
    )
    .unwrap();
    let stats = consumer.stats();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let driver = async {
        wait_until(|| stats.snapshot().messages_acknowledged == 1).await;
        shutdown_tx.send(true).unwrap();
    };
    let (result, ()) = tokio::join!(consumer.run(shutdown_rx), driver);
    let snapshot = result.unwrap();

    assert_eq!(snapshot.messages_requeued, 1);
    assert_eq!(snapshot.batches_processed, 2);
    assert_eq!(pipeline.store.status_of(task_id), Some(TaskStatus::Completed));
    assert_eq!(pipeline.metrics.count(MetricLabel::Failed), 1);
    assert_eq!(pipeline.metrics.count(MetricLabel::Success), 1);
}

#[tokio::test(start_paused = true)]
async fn test_health_follows_consumer_connection() {
    let pipeline = Pipeline::new();
    let service = service(&pipeline);
    service.create_task("first").await.unwrap();

    let checker = HealthChecker::new(pipeline.store.clone())
        .with_connection_state(pipeline.broker.connection_state());
    assert!(!checker.check().await.is_healthy());

    let consumer = consumer(&pipeline, BatchConfig::new(1, Duration::from_millis(100)));
    let stats = consumer.stats();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let driver = async {
        wait_until(|| stats.snapshot().messages_acknowledged == 1).await;
        let report = checker.check().await;
        assert!(report.is_healthy());
        assert_eq!(report.queue_connected, Some(true));

        pipeline.broker.fail_next_connects(100);
        pipeline.broker.sever_connection();
    };
    let (result, ()) = tokio::join!(consumer.run(shutdown_rx), driver);
    assert!(result.is_err());

    let report = checker.check().await;
    assert!(!report.is_healthy());
    assert_eq!(report.queue_connected, Some(false));
    assert!(report.last_queue_error.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_returns_open_batch_to_queue() {
    let pipeline = Pipeline::new();
    let service = service(&pipeline);
    let task = service.create_task("slow to batch").await.unwrap();

    // the batch stays open for 10s waiting for more messages
    let consumer = consumer(&pipeline, BatchConfig::new(5, Duration::from_secs(10)));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let driver = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(pipeline.broker.unacked_count(), 1);
        shutdown_tx.send(true).unwrap();
    };
    let (result, ()) = tokio::join!(consumer.run(shutdown_rx), driver);
    let snapshot = result.unwrap();

    assert_eq!(snapshot.batches_processed, 0);
    assert_eq!(pipeline.broker.ready_count(), 1);
    assert!(pipeline.broker.acknowledged().is_empty());
    assert_eq!(pipeline.store.status_of(task.id().unwrap()), Some(TaskStatus::Pending));
}
