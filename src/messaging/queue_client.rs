//! # Queue Client
//!
//! Broker-agnostic consumer side of the task queue: connect with bounded
//! retry, stream deliveries from a durable queue, settle each delivery
//! individually and close.
//!
//! Connection health is exposed through [`ConnectionState`], owned by the
//! client and shared by `Arc` with health checks.

use super::{Delivery, MessagingError};
use crate::resilience::RetryPolicy;
use async_trait::async_trait;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// Stream of deliveries; an `Err` item or the end of the stream means the
/// connection is gone
pub type DeliveryStream = BoxStream<'static, Result<Delivery, MessagingError>>;

/// Connection flags shared between a queue client and its observers
#[derive(Debug)]
pub struct ConnectionState {
    queue_name: String,
    connected: AtomicBool,
    reconnects: AtomicU64,
    last_error: Mutex<Option<String>>,
}

/// Point-in-time copy of a [`ConnectionState`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    pub queue_name: String,
    pub connected: bool,
    pub reconnects: u64,
    pub last_error: Option<String>,
}

impl ConnectionState {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            connected: AtomicBool::new(false),
            reconnects: AtomicU64::new(0),
            last_error: Mutex::new(None),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn mark_connected(&self) {
        self.connected.store(true, Ordering::Release);
        *self.last_error.lock() = None;
    }

    pub fn mark_disconnected(&self, reason: impl Into<String>) {
        self.connected.store(false, Ordering::Release);
        *self.last_error.lock() = Some(reason.into());
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reconnect_count(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            queue_name: self.queue_name.clone(),
            connected: self.is_connected(),
            reconnects: self.reconnect_count(),
            last_error: self.last_error(),
        }
    }
}

#[async_trait]
pub trait QueueClient: Send + Sync {
    /// One connection attempt: connection, channel and prefetch limit
    async fn try_connect(&self) -> Result<(), MessagingError>;

    /// Policy used by [`QueueClient::connect`]
    fn connect_policy(&self) -> &RetryPolicy;

    /// Connect, retrying with the configured bounded policy
    ///
    /// Exhausting the policy yields `MessagingError::ConnectionRetriesExhausted`,
    /// which callers treat as fatal.
    async fn connect(&self) -> Result<(), MessagingError> {
        let policy = self.connect_policy().clone();
        let state = self.connection_state();

        match policy.retry("queue_connect", || self.try_connect()).await {
            Ok(()) => {
                state.mark_connected();
                info!(
                    provider = self.provider_name(),
                    queue = state.queue_name(),
                    "Queue client connected"
                );
                Ok(())
            }
            Err(e) => {
                state.mark_disconnected(e.to_string());
                error!(
                    provider = self.provider_name(),
                    attempts = policy.max_attempts,
                    error = %e,
                    "Queue client could not connect"
                );
                Err(MessagingError::connection_retries_exhausted(
                    policy.max_attempts,
                    e,
                ))
            }
        }
    }

    /// Declare `queue_name` as durable and start consuming it
    async fn consume(&self, queue_name: &str) -> Result<DeliveryStream, MessagingError>;

    async fn acknowledge(&self, delivery: &Delivery) -> Result<(), MessagingError>;

    /// Negative-acknowledge; `requeue` returns the message to the queue
    async fn reject(&self, delivery: &Delivery, requeue: bool) -> Result<(), MessagingError>;

    /// Release the connection; calling it again is a no-op
    async fn close(&self) -> Result<(), MessagingError>;

    fn connection_state(&self) -> Arc<ConnectionState>;

    fn provider_name(&self) -> &'static str;
}
