//! In-memory cancellation flags with expiry
//!
//! Expiry is measured with `tokio::time::Instant`, so paused-clock tests can
//! advance past the TTL.

use super::{CacheError, CacheResult, CancellationFlagStore};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct InMemoryCancellationCache {
    flags: DashMap<i64, Instant>,
    ttl: Duration,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl Default for InMemoryCancellationCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

impl InMemoryCancellationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            flags: DashMap::new(),
            ttl,
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl CancellationFlagStore for InMemoryCancellationCache {
    async fn set_cancelled(&self, task_id: i64) -> CacheResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::BackendError("injected write failure".to_string()));
        }
        self.flags.insert(task_id, Instant::now() + self.ttl);
        Ok(())
    }

    async fn is_cancelled(&self, task_id: i64) -> CacheResult<bool> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CacheError::BackendError("injected read failure".to_string()));
        }
        let now = Instant::now();
        // Drop the read guard before removing an expired entry
        let expires_at = self.flags.get(&task_id).map(|entry| *entry);
        match expires_at {
            Some(expires_at) if expires_at > now => Ok(true),
            Some(_) => {
                self.flags.remove(&task_id);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn health_check(&self) -> CacheResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CacheError::ConnectionError("cache marked unhealthy".to_string()));
        }
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}
