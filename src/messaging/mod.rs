//! # Messaging
//!
//! Queue-side plumbing for the task pipeline.
//!
//! - [`QueueClient`]: connect with bounded retry, consume, settle, close
//! - [`TaskPublisher`]: producer-side publish with bounded retry
//! - [`batched`]: size-or-timeout batching of a delivery stream
//! - [`RabbitMqQueueClient`] / [`RabbitMqTaskPublisher`]: AMQP via `lapin`
//! - [`InMemoryQueueClient`]: process-local broker implementing both traits

pub mod batcher;
pub mod errors;
pub mod in_memory;
pub mod message;
pub mod publisher;
pub mod queue_client;
pub mod rabbitmq;

pub use batcher::{batched, BatchConfig};
pub use errors::MessagingError;
pub use in_memory::InMemoryQueueClient;
pub use message::{Delivery, TaskMessage};
pub use publisher::{RabbitMqTaskPublisher, TaskPublisher};
pub use queue_client::{ConnectionSnapshot, ConnectionState, DeliveryStream, QueueClient};
pub use rabbitmq::RabbitMqQueueClient;
