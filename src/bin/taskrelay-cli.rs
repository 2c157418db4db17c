//! # TaskRelay CLI
//!
//! Command-line interface for creating, cancelling and inspecting tasks, and
//! for checking the health and configuration of a deployment.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use taskrelay_core::cache::RedisCancellationCache;
use taskrelay_core::config::{loader::redact_url, ConfigManager};
use taskrelay_core::database::PgTaskStore;
use taskrelay_core::health::HealthChecker;
use taskrelay_core::logging;
use taskrelay_core::messaging::{QueueClient, RabbitMqQueueClient, RabbitMqTaskPublisher};
use taskrelay_core::services::TaskService;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "taskrelay-cli")]
#[command(about = "Command-line interface for the TaskRelay task pipeline")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration directory (default: $TASKRELAY_CONFIG_DIR or ./config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Environment override (default: $TASKRELAY_ENV, $APP_ENV or development)
    #[arg(short, long)]
    environment: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Task management operations
    #[command(subcommand)]
    Task(TaskCommands),

    /// Check database, cache and broker connectivity
    Health,

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Debug, Subcommand)]
pub enum TaskCommands {
    /// Create a task and publish it to the queue
    Create {
        /// Opaque task payload
        payload: String,
    },
    /// Cancel a pending or processing task
    Cancel {
        #[arg(value_name = "TASK_ID")]
        task_id: i64,
    },
    /// Show a task's current status
    Status {
        #[arg(value_name = "TASK_ID")]
        task_id: i64,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Load and validate the configuration, then print it with secrets redacted
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_structured_logging();
    let cli = Cli::parse();

    let manager = match &cli.environment {
        Some(environment) => {
            ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), environment)
        }
        None => ConfigManager::load_from_directory(cli.config_dir.clone()),
    }
    .context("failed to load configuration")?;
    let config = manager.config();

    match cli.command {
        Commands::Task(command) => {
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
            let publisher = Arc::new(RabbitMqTaskPublisher::new(
                config.rabbitmq.clone(),
                config.publisher.retry.clone(),
            ));
            let service = TaskService::new(store, cancellations, publisher.clone());

            let result = match command {
                TaskCommands::Create { payload } => service.create_task(&payload).await,
                TaskCommands::Cancel { task_id } => service.cancel_task(task_id).await,
                TaskCommands::Status { task_id } => service.get_task(task_id).await,
            };
            publisher.close().await;

            let task = result?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        Commands::Health => {
            let store = Arc::new(PgTaskStore::connect_lazy(&config.database)?);
            let mut checker = HealthChecker::new(store);

            match RedisCancellationCache::from_config(&config.redis).await {
                Ok(cache) => checker = checker.with_cache(Arc::new(cache)),
                Err(e) => debug!(error = %e, "Redis unavailable"),
            }

            // Single attempt; the consumer's connect retry policy is not wanted here
            let client = RabbitMqQueueClient::new(config.rabbitmq.clone());
            match client.try_connect().await {
                Ok(()) => client.connection_state().mark_connected(),
                Err(e) => {
                    debug!(error = %e, "RabbitMQ unavailable");
                    client.connection_state().mark_disconnected(e.to_string());
                }
            }
            checker = checker.with_connection_state(client.connection_state());

            let report = checker.check().await;
            if let Err(e) = client.close().await {
                debug!(error = %e, "RabbitMQ close failed");
            }

            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_healthy() {
                anyhow::bail!("unhealthy");
            }
        }
        Commands::Config(ConfigCommands::Validate) => {
            let mut shown = config.clone();
            shown.database.url = redact_url(&shown.database.url);
            shown.rabbitmq.url = redact_url(&shown.rabbitmq.url);
            shown.redis.url = redact_url(&shown.redis.url);

            println!("Environment: {}", manager.environment());
            println!("Directory:   {}", manager.config_directory().display());
            println!("{}", serde_json::to_string_pretty(&shown)?);
            println!("Configuration is valid");
        }
    }

    Ok(())
}
