//! # TaskRelay Consumer
//!
//! Runs one task consumer until Ctrl+C or SIGTERM, with an HTTP health
//! endpoint reporting the consumer's own broker connection.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default configuration
//! cargo run --bin taskrelay-consumer
//!
//! # Run with a specific environment and batch size
//! TASKRELAY_ENV=production TASKRELAY__CONSUMER__BATCH_SIZE=64 cargo run --bin taskrelay-consumer
//! ```

use anyhow::Context;
use std::sync::Arc;
use taskrelay_core::cache::RedisCancellationCache;
use taskrelay_core::config::ConfigManager;
use taskrelay_core::database::PgTaskStore;
use taskrelay_core::health::HealthChecker;
use taskrelay_core::logging;
use taskrelay_core::messaging::{BatchConfig, QueueClient, RabbitMqQueueClient};
use taskrelay_core::metrics::OtelMetricsSink;
use taskrelay_core::orchestration::{SimulatedWork, TaskConsumer, TaskExecutionOrchestrator};
use taskrelay_core::web;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    logging::init_structured_logging();

    info!("Starting TaskRelay consumer");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));

    let manager = ConfigManager::load().context("failed to load configuration")?;
    let config = manager.config();
    info!("   Environment: {}", manager.environment());

    let store = Arc::new(
        PgTaskStore::connect(&config.database)
            .await
            .context("failed to connect to PostgreSQL")?,
    );
    let cancellations = Arc::new(
        RedisCancellationCache::from_config(&config.redis)
            .await
            .context("failed to connect to Redis")?,
    );
    let metrics = Arc::new(OtelMetricsSink::new(&config.telemetry.service_name));
    let work = Arc::new(SimulatedWork::new(config.consumer.processing_delay()));

    let orchestrator = TaskExecutionOrchestrator::new(
        store.clone(),
        cancellations.clone(),
        metrics,
        work,
        config.consumer.poison_message_policy,
    )
    .with_write_back_retry(config.consumer.write_back_retry.clone());

    let client: Arc<dyn QueueClient> = Arc::new(RabbitMqQueueClient::new(config.rabbitmq.clone()));
    let checker = Arc::new(
        HealthChecker::new(store)
            .with_connection_state(client.connection_state())
            .with_cache(cancellations),
    );
    let consumer = TaskConsumer::new(
        client,
        orchestrator,
        BatchConfig::from(&config.consumer),
        config.rabbitmq.queue_name.clone(),
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if config.health.enabled {
        let listener = TcpListener::bind(&config.health.bind_address)
            .await
            .with_context(|| format!("failed to bind {}", config.health.bind_address))?;
        let health_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = web::serve(listener, checker, health_shutdown).await {
                error!(error = %e, "Health endpoint stopped");
            }
        });
    }
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, finishing in-flight batch");
        if shutdown_tx.send(true).is_err() {
            warn!("Consumer already stopped");
        }
    });

    match consumer.run(shutdown_rx).await {
        Ok(stats) => {
            info!(
                batches = stats.batches_processed,
                acknowledged = stats.messages_acknowledged,
                requeued = stats.messages_requeued,
                rejected = stats.messages_rejected,
                "Consumer shutdown complete"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Consumer stopped");
            Err(e.into())
        }
    }
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
