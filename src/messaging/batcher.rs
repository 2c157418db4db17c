//! # Size-or-Timeout Batcher
//!
//! Groups a stream of items into non-empty batches. A batch is emitted when it
//! reaches `max_size`, or when `max_wait` has elapsed since its first item,
//! whichever comes first. When the source ends, a partial batch is emitted
//! once and the batched stream ends.
//!
//! The timer only runs while a batch is open: waiting for the first item of a
//! batch is unbounded.

use crate::config::ConsumerConfig;
use futures::stream::{self, Stream, StreamExt};
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    pub max_size: usize,
    pub max_wait: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: 32,
            max_wait: Duration::from_millis(100),
        }
    }
}

impl BatchConfig {
    pub fn new(max_size: usize, max_wait: Duration) -> Self {
        Self { max_size, max_wait }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_size == 0 {
            return Err("batch size must be at least 1".to_string());
        }
        if self.max_wait.is_zero() {
            return Err("batch timeout must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl From<&ConsumerConfig> for BatchConfig {
    fn from(config: &ConsumerConfig) -> Self {
        Self::new(config.batch_size, config.batch_timeout())
    }
}

struct BatchState<S> {
    source: S,
    exhausted: bool,
}

/// Batch `source` according to `config`
///
/// `max_size` is clamped to at least 1.
pub fn batched<S>(source: S, config: BatchConfig) -> impl Stream<Item = Vec<S::Item>>
where
    S: Stream + Unpin,
{
    let max_size = config.max_size.max(1);
    let max_wait = config.max_wait;

    stream::unfold(
        BatchState {
            source,
            exhausted: false,
        },
        move |mut state| async move {
            if state.exhausted {
                return None;
            }

            let first = match state.source.next().await {
                Some(item) => item,
                None => return None,
            };
            let mut batch = Vec::with_capacity(max_size);
            batch.push(first);

            let deadline = Instant::now() + max_wait;
            while batch.len() < max_size {
                match timeout_at(deadline, state.source.next()).await {
                    Ok(Some(item)) => batch.push(item),
                    Ok(None) => {
                        state.exhausted = true;
                        break;
                    }
                    Err(_elapsed) => break,
                }
            }

            Some((batch, state))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn test_splits_ready_items_by_size() {
        let source = stream::iter(1..=7);
        let batches: Vec<Vec<i32>> =
            batched(source, BatchConfig::new(3, Duration::from_secs(60)))
                .collect()
                .await;
        assert_eq!(batches, vec![vec![1, 2, 3], vec![4, 5, 6], vec![7]]);
    }

    #[tokio::test]
    async fn test_empty_source_yields_nothing() {
        let source = stream::iter(Vec::<u8>::new());
        let batches: Vec<Vec<u8>> = batched(source, BatchConfig::default()).collect().await;
        assert!(batches.is_empty());
    }

    #[test]
    fn test_validation() {
        assert!(BatchConfig::default().validate().is_ok());
        assert!(BatchConfig::new(0, Duration::from_millis(1)).validate().is_err());
        assert!(BatchConfig::new(1, Duration::ZERO).validate().is_err());
    }
}
