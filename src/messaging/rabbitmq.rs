//! # RabbitMQ Queue Client
//!
//! `QueueClient` over AMQP 0.9.1 using the `lapin` crate.
//!
//! One connection with one channel per client. The channel's QoS prefetch
//! bounds the number of unacknowledged deliveries held by this consumer, and
//! the queue is declared durable before consuming.

use super::queue_client::{ConnectionState, DeliveryStream, QueueClient};
use super::{Delivery, MessagingError};
use crate::config::loader::redact_url;
use crate::config::RabbitmqConfig;
use crate::resilience::RetryPolicy;
use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const REPLY_SUCCESS: u16 = 200;

/// An open connection and its channel
pub(crate) struct AmqpSession {
    pub(crate) connection: Connection,
    pub(crate) channel: Channel,
}

impl AmqpSession {
    /// Close channel then connection, logging instead of failing
    pub(crate) async fn close(self) {
        if let Err(e) = self.channel.close(REPLY_SUCCESS, "closing").await {
            debug!(error = %e, "Channel close failed");
        }
        if let Err(e) = self.connection.close(REPLY_SUCCESS, "closing").await {
            debug!(error = %e, "Connection close failed");
        }
    }
}

/// Open a connection and channel with the configured prefetch limit
///
/// The connection is named `{role}-{uuid}` so each client is distinguishable
/// in the broker's management view.
pub(crate) async fn open_channel(
    config: &RabbitmqConfig,
    role: &str,
) -> Result<AmqpSession, MessagingError> {
    let connection_name = format!("{role}-{}", Uuid::new_v4());
    let connect = Connection::connect(
        &config.url,
        ConnectionProperties::default().with_connection_name(connection_name.into()),
    );
    let connection = tokio::time::timeout(config.connection_timeout(), connect)
        .await
        .map_err(|_| {
            MessagingError::connection(format!(
                "RabbitMQ connection timed out after {}s",
                config.connection_timeout_seconds
            ))
        })?
        .map_err(|e| MessagingError::connection(format!("RabbitMQ connection failed: {e}")))?;

    let channel = connection.create_channel().await.map_err(|e| {
        MessagingError::connection(format!("RabbitMQ channel creation failed: {e}"))
    })?;

    channel
        .basic_qos(config.prefetch_count, BasicQosOptions::default())
        .await
        .map_err(|e| MessagingError::configuration("rabbitmq", format!("Failed to set QoS: {e}")))?;

    Ok(AmqpSession {
        connection,
        channel,
    })
}

pub struct RabbitMqQueueClient {
    config: RabbitmqConfig,
    session: Mutex<Option<AmqpSession>>,
    connection_state: Arc<ConnectionState>,
}

impl std::fmt::Debug for RabbitMqQueueClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RabbitMqQueueClient")
            .field("url", &redact_url(&self.config.url))
            .field("queue_name", &self.config.queue_name)
            .field("prefetch_count", &self.config.prefetch_count)
            .field("connected", &self.connection_state.is_connected())
            .finish()
    }
}

impl RabbitMqQueueClient {
    pub fn new(config: RabbitmqConfig) -> Self {
        let connection_state = Arc::new(ConnectionState::new(config.queue_name.clone()));
        Self {
            config,
            session: Mutex::new(None),
            connection_state,
        }
    }

    fn channel(&self) -> Result<Channel, MessagingError> {
        self.session
            .lock()
            .as_ref()
            .map(|session| session.channel.clone())
            .ok_or(MessagingError::NotConnected)
    }
}

#[async_trait]
impl QueueClient for RabbitMqQueueClient {
    async fn try_connect(&self) -> Result<(), MessagingError> {
        let session = open_channel(&self.config, "taskrelay-consumer").await?;

        info!(
            url = %redact_url(&self.config.url),
            prefetch = self.config.prefetch_count,
            "RabbitMQ connection established"
        );

        let previous = self.session.lock().replace(session);
        if let Some(previous) = previous {
            previous.close().await;
        }
        Ok(())
    }

    fn connect_policy(&self) -> &RetryPolicy {
        &self.config.connect_retry
    }

    async fn consume(&self, queue_name: &str) -> Result<DeliveryStream, MessagingError> {
        let channel = self.channel()?;

        channel
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

        let consumer = channel
            .basic_consume(
                queue_name,
                "taskrelay-consumer",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "consume", e.to_string()))?;

        debug!(queue = queue_name, "Consuming from RabbitMQ queue");

        let stream = consumer.map(|item| {
            item.map(|delivery| Delivery {
                delivery_tag: delivery.delivery_tag,
                body: delivery.data,
                redelivered: delivery.redelivered,
            })
            .map_err(|e| MessagingError::connection(format!("RabbitMQ consumer failed: {e}")))
        });
        Ok(stream.boxed())
    }

    async fn acknowledge(&self, delivery: &Delivery) -> Result<(), MessagingError> {
        self.channel()?
            .basic_ack(delivery.delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| MessagingError::ack(delivery.delivery_tag, e.to_string()))
    }

    async fn reject(&self, delivery: &Delivery, requeue: bool) -> Result<(), MessagingError> {
        self.channel()?
            .basic_nack(
                delivery.delivery_tag,
                BasicNackOptions {
                    requeue,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| MessagingError::nack(delivery.delivery_tag, e.to_string()))
    }

    async fn close(&self) -> Result<(), MessagingError> {
        let session = self.session.lock().take();
        self.connection_state.mark_disconnected("closed");

        match session {
            Some(session) => {
                session.close().await;
                info!(queue = %self.config.queue_name, "RabbitMQ connection closed");
            }
            None => debug!("RabbitMQ client already closed"),
        }
        Ok(())
    }

    fn connection_state(&self) -> Arc<ConnectionState> {
        Arc::clone(&self.connection_state)
    }

    fn provider_name(&self) -> &'static str {
        "rabbitmq"
    }
}
