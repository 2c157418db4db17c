#![allow(dead_code)]

pub mod strategies;
pub mod work;

use std::sync::Arc;
use std::time::Duration;
use taskrelay_core::cache::InMemoryCancellationCache;
use taskrelay_core::database::InMemoryTaskStore;
use taskrelay_core::messaging::{Delivery, InMemoryQueueClient, TaskMessage};
use taskrelay_core::metrics::InMemoryMetricsSink;
use taskrelay_core::orchestration::{
    PoisonMessagePolicy, SimulatedWork, TaskExecutionOrchestrator, UnitOfWork,
};
use taskrelay_core::resilience::RetryPolicy;

pub use work::{ScriptedWork, StoreOutage};

pub const QUEUE: &str = "tasks";

/// In-memory store, cache, metrics and broker wired together
pub struct Pipeline {
    pub store: Arc<InMemoryTaskStore>,
    pub cache: Arc<InMemoryCancellationCache>,
    pub metrics: Arc<InMemoryMetricsSink>,
    pub broker: InMemoryQueueClient,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_prefetch(100)
    }

    pub fn with_prefetch(prefetch: usize) -> Self {
        Self {
            store: Arc::new(InMemoryTaskStore::new()),
            cache: Arc::new(InMemoryCancellationCache::default()),
            metrics: Arc::new(InMemoryMetricsSink::new()),
            broker: InMemoryQueueClient::new(QUEUE, prefetch)
                .with_connect_policy(RetryPolicy::fixed(3, Duration::from_millis(10)))
                .with_publish_policy(RetryPolicy::fixed(3, Duration::from_millis(10))),
        }
    }

    pub fn orchestrator(&self, work: Arc<dyn UnitOfWork>) -> TaskExecutionOrchestrator {
        self.orchestrator_with_policy(work, PoisonMessagePolicy::Reject)
    }

    pub fn orchestrator_with_policy(
        &self,
        work: Arc<dyn UnitOfWork>,
        policy: PoisonMessagePolicy,
    ) -> TaskExecutionOrchestrator {
        TaskExecutionOrchestrator::new(
            self.store.clone(),
            self.cache.clone(),
            self.metrics.clone(),
            work,
            policy,
        )
    }

    /// Orchestrator whose unit of work sleeps for `delay`
    pub fn simulated(&self, delay: Duration) -> TaskExecutionOrchestrator {
        self.orchestrator(Arc::new(SimulatedWork::new(delay)))
    }
}

pub fn message_body(task_id: i64) -> Vec<u8> {
    TaskMessage::new(task_id, format!("payload-{task_id}"))
        .to_bytes()
        .unwrap()
}

/// One delivery per id, tags starting at 1
pub fn deliveries_for(task_ids: &[i64]) -> Vec<Delivery> {
    task_ids
        .iter()
        .enumerate()
        .map(|(index, task_id)| Delivery::new(index as u64 + 1, message_body(*task_id)))
        .collect()
}

/// Poll `condition` on the (usually paused) tokio clock
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
