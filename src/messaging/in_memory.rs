//! In-memory broker
//!
//! A single durable queue with AMQP-like delivery semantics, used by tests and
//! local runs:
//!
//! - at most `prefetch` unacknowledged deliveries per connection
//! - delivery tags are unique for the lifetime of the broker
//! - a requeued or connection-orphaned message goes back to the head of the
//!   queue with `redelivered` set
//! - losing the connection ends every open delivery stream with an error
//!
//! `InMemoryQueueClient` is a cheap handle; clones share the same broker, so a
//! test can keep one to publish and inspect while the consumer owns another.

use super::queue_client::{ConnectionState, DeliveryStream, QueueClient};
use super::{Delivery, MessagingError, TaskMessage, TaskPublisher};
use crate::resilience::RetryPolicy;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Clone)]
struct QueuedMessage {
    body: Vec<u8>,
    redelivered: bool,
}

#[derive(Debug, Default)]
struct BrokerState {
    ready: VecDeque<QueuedMessage>,
    unacked: HashMap<u64, QueuedMessage>,
    next_tag: u64,
    connected: bool,
    /// Bumped on every disconnect so streams from an older connection end
    session: u64,
    acknowledged: Vec<Vec<u8>>,
    requeued: Vec<Vec<u8>>,
    dead_lettered: Vec<Vec<u8>>,
    connect_attempts: u32,
    close_calls: u32,
}

impl BrokerState {
    /// Return every unacknowledged message to the head of the queue
    fn recover_unacked(&mut self) {
        let mut orphaned: Vec<(u64, QueuedMessage)> = self.unacked.drain().collect();
        orphaned.sort_by_key(|(tag, _)| std::cmp::Reverse(*tag));
        for (_, mut message) in orphaned {
            message.redelivered = true;
            self.ready.push_front(message);
        }
    }

    fn drop_connection(&mut self) {
        self.connected = false;
        self.session += 1;
        self.recover_unacked();
    }
}

#[derive(Debug)]
struct Broker {
    state: Mutex<BrokerState>,
    notify: Notify,
    prefetch: usize,
    failing_connects: AtomicU32,
    failing_publishes: AtomicU32,
}

#[derive(Debug, Clone)]
pub struct InMemoryQueueClient {
    broker: Arc<Broker>,
    connection_state: Arc<ConnectionState>,
    connect_policy: RetryPolicy,
    publish_policy: RetryPolicy,
}

impl InMemoryQueueClient {
    pub fn new(queue_name: impl Into<String>, prefetch: usize) -> Self {
        Self {
            broker: Arc::new(Broker {
                state: Mutex::new(BrokerState::default()),
                notify: Notify::new(),
                prefetch: prefetch.max(1),
                failing_connects: AtomicU32::new(0),
                failing_publishes: AtomicU32::new(0),
            }),
            connection_state: Arc::new(ConnectionState::new(queue_name)),
            connect_policy: RetryPolicy::fixed(10, Duration::from_millis(10)),
            publish_policy: RetryPolicy::fixed(5, Duration::from_millis(10)),
        }
    }

    pub fn with_connect_policy(mut self, policy: RetryPolicy) -> Self {
        self.connect_policy = policy;
        self
    }

    pub fn with_publish_policy(mut self, policy: RetryPolicy) -> Self {
        self.publish_policy = policy;
        self
    }

    /// Enqueue a raw body, bypassing task message encoding
    pub fn publish_raw(&self, body: impl Into<Vec<u8>>) {
        self.broker.state.lock().ready.push_back(QueuedMessage {
            body: body.into(),
            redelivered: false,
        });
        self.broker.notify.notify_waiters();
    }

    /// Make the next `count` connection attempts fail
    pub fn fail_next_connects(&self, count: u32) {
        self.broker.failing_connects.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` publish attempts fail
    pub fn fail_next_publishes(&self, count: u32) {
        self.broker.failing_publishes.store(count, Ordering::SeqCst);
    }

    /// Simulate the broker dropping the connection
    pub fn sever_connection(&self) {
        self.broker.state.lock().drop_connection();
        self.connection_state.mark_disconnected("connection severed");
        self.broker.notify.notify_waiters();
    }

    pub fn ready_count(&self) -> usize {
        self.broker.state.lock().ready.len()
    }

    pub fn unacked_count(&self) -> usize {
        self.broker.state.lock().unacked.len()
    }

    pub fn acknowledged(&self) -> Vec<Vec<u8>> {
        self.broker.state.lock().acknowledged.clone()
    }

    pub fn requeued(&self) -> Vec<Vec<u8>> {
        self.broker.state.lock().requeued.clone()
    }

    pub fn dead_lettered(&self) -> Vec<Vec<u8>> {
        self.broker.state.lock().dead_lettered.clone()
    }

    pub fn connect_attempts(&self) -> u32 {
        self.broker.state.lock().connect_attempts
    }

    pub fn close_calls(&self) -> u32 {
        self.broker.state.lock().close_calls
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn settle(&self, delivery: &Delivery) -> Result<QueuedMessage, String> {
        let mut state = self.broker.state.lock();
        if !state.connected {
            return Err("not connected".to_string());
        }
        state
            .unacked
            .remove(&delivery.delivery_tag)
            .ok_or_else(|| format!("unknown delivery tag {}", delivery.delivery_tag))
    }
}

/// Next delivery for the stream opened in `session`, waiting while the queue
/// is empty or the prefetch window is full
async fn next_delivery(broker: &Broker, session: u64) -> Result<Delivery, MessagingError> {
    loop {
        let notified = broker.notify.notified();
        {
            let mut state = broker.state.lock();
            if state.session != session || !state.connected {
                return Err(MessagingError::connection("connection lost"));
            }
            if state.unacked.len() < broker.prefetch {
                if let Some(message) = state.ready.pop_front() {
                    state.next_tag += 1;
                    let delivery_tag = state.next_tag;
                    let delivery = Delivery {
                        delivery_tag,
                        body: message.body.clone(),
                        redelivered: message.redelivered,
                    };
                    state.unacked.insert(delivery_tag, message);
                    return Ok(delivery);
                }
            }
        }
        notified.await;
    }
}

#[async_trait]
impl QueueClient for InMemoryQueueClient {
    async fn try_connect(&self) -> Result<(), MessagingError> {
        self.broker.state.lock().connect_attempts += 1;
        if Self::take_failure(&self.broker.failing_connects) {
            return Err(MessagingError::connection("broker unavailable"));
        }
        self.broker.state.lock().connected = true;
        Ok(())
    }

    fn connect_policy(&self) -> &RetryPolicy {
        &self.connect_policy
    }

    async fn consume(&self, queue_name: &str) -> Result<DeliveryStream, MessagingError> {
        let session = {
            let state = self.broker.state.lock();
            if !state.connected {
                return Err(MessagingError::NotConnected);
            }
            state.session
        };
        debug!(queue = queue_name, session, "Consuming from in-memory queue");

        let broker = Arc::clone(&self.broker);
        let stream = futures::stream::unfold(Some(broker), move |broker| async move {
            let Some(broker) = broker else {
                return None;
            };
            match next_delivery(&broker, session).await {
                Ok(delivery) => Some((Ok(delivery), Some(broker))),
                Err(e) => Some((Err(e), None)),
            }
        });
        Ok(Box::pin(stream))
    }

    async fn acknowledge(&self, delivery: &Delivery) -> Result<(), MessagingError> {
        let message = self
            .settle(delivery)
            .map_err(|reason| MessagingError::ack(delivery.delivery_tag, reason))?;
        self.broker.state.lock().acknowledged.push(message.body);
        self.broker.notify.notify_waiters();
        Ok(())
    }

    async fn reject(&self, delivery: &Delivery, requeue: bool) -> Result<(), MessagingError> {
        let mut message = self
            .settle(delivery)
            .map_err(|reason| MessagingError::nack(delivery.delivery_tag, reason))?;
        {
            let mut state = self.broker.state.lock();
            if requeue {
                state.requeued.push(message.body.clone());
                message.redelivered = true;
                state.ready.push_front(message);
            } else {
                state.dead_lettered.push(message.body);
            }
        }
        self.broker.notify.notify_waiters();
        Ok(())
    }

    async fn close(&self) -> Result<(), MessagingError> {
        {
            let mut state = self.broker.state.lock();
            state.close_calls += 1;
            if state.connected {
                state.drop_connection();
            }
        }
        self.connection_state.mark_disconnected("closed");
        self.broker.notify.notify_waiters();
        Ok(())
    }

    fn connection_state(&self) -> Arc<ConnectionState> {
        Arc::clone(&self.connection_state)
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}

#[async_trait]
impl TaskPublisher for InMemoryQueueClient {
    async fn try_publish(&self, message: &TaskMessage) -> Result<(), MessagingError> {
        if Self::take_failure(&self.broker.failing_publishes) {
            return Err(MessagingError::publish(
                self.connection_state.queue_name(),
                "broker unavailable",
            ));
        }
        self.publish_raw(message.to_bytes()?);
        Ok(())
    }

    fn publish_policy(&self) -> &RetryPolicy {
        &self.publish_policy
    }
}
