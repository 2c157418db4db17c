//! # Task Publisher
//!
//! Producer side of the task queue. A publish is a single message written as
//! persistent, retried with a bounded exponential policy.

use super::rabbitmq::{open_channel, AmqpSession};
use super::{MessagingError, TaskMessage};
use crate::config::RabbitmqConfig;
use crate::resilience::RetryPolicy;
use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel};
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[async_trait]
pub trait TaskPublisher: Send + Sync {
    /// One publish attempt
    async fn try_publish(&self, message: &TaskMessage) -> Result<(), MessagingError>;

    fn publish_policy(&self) -> &RetryPolicy;

    /// Publish with the configured bounded retry, returning the last error
    /// once attempts are exhausted
    async fn publish(&self, message: &TaskMessage) -> Result<(), MessagingError> {
        let policy = self.publish_policy().clone();
        policy
            .retry("task_publish", || self.try_publish(message))
            .await
    }
}

/// Publishes task messages to a durable RabbitMQ queue
///
/// The connection is opened lazily and dropped after a failed attempt so the
/// next attempt starts from a fresh connection.
pub struct RabbitMqTaskPublisher {
    config: RabbitmqConfig,
    policy: RetryPolicy,
    session: Mutex<Option<AmqpSession>>,
}

impl std::fmt::Debug for RabbitMqTaskPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RabbitMqTaskPublisher")
            .field("queue_name", &self.config.queue_name)
            .field("policy", &self.policy)
            .finish()
    }
}

impl RabbitMqTaskPublisher {
    pub fn new(config: RabbitmqConfig, policy: RetryPolicy) -> Self {
        Self {
            config,
            policy,
            session: Mutex::new(None),
        }
    }

    pub async fn close(&self) {
        if let Some(session) = self.session.lock().await.take() {
            session.close().await;
        }
    }
}

async fn publish_persistent(
    channel: &Channel,
    queue_name: &str,
    bytes: &[u8],
) -> Result<(), MessagingError> {
    let confirm = channel
        .basic_publish(
            "",
            queue_name,
            BasicPublishOptions::default(),
            bytes,
            BasicProperties::default()
                .with_delivery_mode(2)
                .with_content_type("application/json".into()),
        )
        .await
        .map_err(|e| MessagingError::publish(queue_name, format!("Publish failed: {e}")))?;

    confirm.await.map_err(|e| {
        MessagingError::publish(queue_name, format!("Publish confirmation failed: {e}"))
    })?;
    Ok(())
}

#[async_trait]
impl TaskPublisher for RabbitMqTaskPublisher {
    async fn try_publish(&self, message: &TaskMessage) -> Result<(), MessagingError> {
        let queue_name = self.config.queue_name.as_str();
        let bytes = message.to_bytes()?;
        let mut session = self.session.lock().await;

        if session.is_none() {
            let opened = open_channel(&self.config, "taskrelay-publisher").await?;
            opened
                .channel
                .queue_declare(
                    queue_name,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| MessagingError::queue_operation(queue_name, "declare", e.to_string()))?;
            *session = Some(opened);
        }

        let Some(active) = session.as_ref() else {
            return Err(MessagingError::NotConnected);
        };

        let published = publish_persistent(&active.channel, queue_name, &bytes).await;

        match published {
            Ok(()) => {
                debug!(task_id = message.task_id, queue = queue_name, "Task message published");
                Ok(())
            }
            Err(e) => {
                warn!(task_id = message.task_id, error = %e, "Dropping publisher connection");
                if let Some(broken) = session.take() {
                    broken.close().await;
                }
                Err(e)
            }
        }
    }

    fn publish_policy(&self) -> &RetryPolicy {
        &self.policy
    }
}
