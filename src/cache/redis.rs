//! Redis cancellation flags
//!
//! Uses `redis::aio::ConnectionManager` for a multiplexed connection with
//! automatic reconnection.

use super::{cancellation_key, CacheError, CacheResult, CancellationFlagStore};
use crate::config::loader::redact_url;
use crate::config::RedisConfig;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct RedisCancellationCache {
    connection_manager: redis::aio::ConnectionManager,
    ttl: Duration,
}

impl std::fmt::Debug for RedisCancellationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCancellationCache")
            .field("connection_manager", &"ConnectionManager")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl RedisCancellationCache {
    pub async fn from_config(config: &RedisConfig) -> CacheResult<Self> {
        let client = redis::Client::open(config.url.as_str()).map_err(|e| {
            CacheError::ConnectionError(format!("Failed to create Redis client: {e}"))
        })?;

        let connection_manager = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::ConnectionError(format!("Failed to connect to Redis: {e}")))?;

        debug!(url = %redact_url(&config.url), "Redis cancellation cache connected");

        Ok(Self {
            connection_manager,
            ttl: config.cancellation_ttl(),
        })
    }
}

#[async_trait]
impl CancellationFlagStore for RedisCancellationCache {
    async fn set_cancelled(&self, task_id: i64) -> CacheResult<()> {
        let mut conn = self.connection_manager.clone();
        let key = cancellation_key(task_id);
        let ttl_seconds = self.ttl.as_secs().max(1);

        redis::cmd("SET")
            .arg(&key)
            .arg("1")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::BackendError(format!("Redis SET failed: {e}")))?;

        debug!(task_id, ttl_seconds, "Cancellation flag set");
        Ok(())
    }

    async fn is_cancelled(&self, task_id: i64) -> CacheResult<bool> {
        let mut conn = self.connection_manager.clone();
        let exists: bool = redis::cmd("EXISTS")
            .arg(cancellation_key(task_id))
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::BackendError(format!("Redis EXISTS failed: {e}")))?;
        Ok(exists)
    }

    async fn health_check(&self) -> CacheResult<()> {
        let mut conn = self.connection_manager.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::BackendError(format!("Redis PING failed: {e}")))?;

        if pong == "PONG" {
            Ok(())
        } else {
            Err(CacheError::BackendError(format!("Unexpected PING reply: {pong}")))
        }
    }

    fn provider_name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Redis (REDIS_URL)"]
    async fn test_flag_round_trip_against_redis() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into());
        let cache = RedisCancellationCache::from_config(&RedisConfig {
            url,
            cancellation_ttl_seconds: 30,
        })
        .await
        .unwrap();

        let task_id = chrono::Utc::now().timestamp_micros();
        assert!(!cache.is_cancelled(task_id).await.unwrap());
        cache.set_cancelled(task_id).await.unwrap();
        assert!(cache.is_cancelled(task_id).await.unwrap());
        cache.health_check().await.unwrap();
    }
}
