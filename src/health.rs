//! Health reporting for the consumer and the task service

use crate::cache::CancellationFlagStore;
use crate::database::TaskStore;
use crate::messaging::ConnectionState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Point-in-time health of every dependency
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// `None` when no queue client is attached (e.g. the CLI)
    pub queue_connected: Option<bool>,
    pub database_connected: bool,
    pub cache_connected: Option<bool>,
    pub reconnects: u64,
    pub last_queue_error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

pub struct HealthChecker {
    connection_state: Option<Arc<ConnectionState>>,
    store: Arc<dyn TaskStore>,
    cache: Option<Arc<dyn CancellationFlagStore>>,
}

impl HealthChecker {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self {
            connection_state: None,
            store,
            cache: None,
        }
    }

    pub fn with_connection_state(mut self, state: Arc<ConnectionState>) -> Self {
        self.connection_state = Some(state);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CancellationFlagStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Unhealthy when the queue (if attached) or the database is down; the
    /// cancellation cache is reported but does not decide the status.
    pub async fn check(&self) -> HealthReport {
        let database_connected = match self.store.health_check().await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Store health check failed");
                false
            }
        };

        let cache_connected = match &self.cache {
            Some(cache) => Some(match cache.health_check().await {
                Ok(()) => true,
                Err(e) => {
                    debug!(error = %e, "Cache health check failed");
                    false
                }
            }),
            None => None,
        };

        let queue_connected = self.connection_state.as_ref().map(|s| s.is_connected());
        let (reconnects, last_queue_error) = match &self.connection_state {
            Some(state) => (state.reconnect_count(), state.last_error()),
            None => (0, None),
        };

        let status = if database_connected && queue_connected.unwrap_or(true) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };

        HealthReport {
            status,
            queue_connected,
            database_connected,
            cache_connected,
            reconnects,
            last_queue_error,
            checked_at: Utc::now(),
        }
    }
}
