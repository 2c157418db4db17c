use futures::channel::mpsc;
use futures::StreamExt;
use std::time::Duration;
use taskrelay_core::messaging::{batched, BatchConfig};
use tokio::time::{sleep, Instant};

const WINDOW: Duration = Duration::from_millis(100);

#[tokio::test(start_paused = true)]
async fn test_full_batch_is_emitted_without_waiting() {
    let (tx, rx) = mpsc::unbounded();
    for i in 1..=3 {
        tx.unbounded_send(i).unwrap();
    }

    let mut batches = Box::pin(batched(rx, BatchConfig::new(3, WINDOW)));
    let started = Instant::now();

    assert_eq!(batches.next().await, Some(vec![1, 2, 3]));
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_single_item_is_emitted_after_window() {
    let (tx, rx) = mpsc::unbounded();
    tx.unbounded_send("only").unwrap();

    let mut batches = Box::pin(batched(rx, BatchConfig::new(3, WINDOW)));
    let started = Instant::now();

    assert_eq!(batches.next().await, Some(vec!["only"]));
    let elapsed = started.elapsed();
    assert!(elapsed >= WINDOW, "emitted early after {elapsed:?}");
    assert!(elapsed < WINDOW + Duration::from_millis(5), "emitted late after {elapsed:?}");

    // sender still open: nothing more until the next item arrives
    drop(tx);
    assert_eq!(batches.next().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_window_starts_at_first_item() {
    let (tx, rx) = mpsc::unbounded();
    tokio::spawn(async move {
        sleep(Duration::from_secs(1)).await;
        tx.unbounded_send(1).unwrap();
        sleep(Duration::from_millis(50)).await;
        tx.unbounded_send(2).unwrap();
        sleep(Duration::from_millis(200)).await;
        tx.unbounded_send(3).unwrap();
    });

    let mut batches = Box::pin(batched(rx, BatchConfig::new(10, WINDOW)));
    let started = Instant::now();

    assert_eq!(batches.next().await, Some(vec![1, 2]));
    assert_eq!(started.elapsed(), Duration::from_millis(1100));

    // the producer drops its sender after the last item
    assert_eq!(batches.next().await, Some(vec![3]));
    assert_eq!(batches.next().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_source_end_flushes_partial_batch_once() {
    let (tx, rx) = mpsc::unbounded();
    tx.unbounded_send('a').unwrap();
    tx.unbounded_send('b').unwrap();
    drop(tx);

    let batches: Vec<Vec<char>> = batched(rx, BatchConfig::new(5, WINDOW)).collect().await;

    assert_eq!(batches, vec![vec!['a', 'b']]);
}

#[tokio::test(start_paused = true)]
async fn test_size_limit_splits_a_burst() {
    let (tx, rx) = mpsc::unbounded();
    for i in 0..7 {
        tx.unbounded_send(i).unwrap();
    }
    drop(tx);

    let sizes: Vec<usize> = batched(rx, BatchConfig::new(3, WINDOW))
        .map(|batch| batch.len())
        .collect()
        .await;

    assert_eq!(sizes, vec![3, 3, 1]);
}
