//! PostgreSQL task store
//!
//! Runtime-checked `sqlx` queries against the `tasks` table. Batch reads use
//! `id = ANY($1)` and batch writes use `UPDATE ... FROM UNNEST(...)`, so one
//! batch costs one round trip in each direction.

use super::{StoreError, StoreResult, TaskStore};
use crate::config::loader::redact_url;
use crate::config::DatabaseConfig;
use crate::models::Task;
use crate::state_machine::TaskStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const SELECT_COLUMNS: &str = "id, payload, status, created_at";

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: i64,
    payload: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<TaskStatus>()
            .map_err(StoreError::decode)?;
        Ok(Task::from_parts(row.id, row.payload, status, row.created_at))
    }
}

/// `TaskStore` backed by a PostgreSQL connection pool
#[derive(Debug, Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    /// Open a pool and apply pending migrations when configured to
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect(&config.url)
            .await
            .map_err(|e| StoreError::connection(format!("Failed to connect to PostgreSQL: {e}")))?;

        info!(
            url = %redact_url(&config.url),
            max_connections = config.max_connections,
            "PostgreSQL task store connected"
        );

        let store = Self::from_pool(pool);
        if config.run_migrations {
            store.migrate().await?;
        }
        Ok(store)
    }

    /// Build a pool without connecting; connections are opened on first use
    pub fn connect_lazy(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect_lazy(&config.url)
            .map_err(|e| StoreError::connection(format!("Invalid PostgreSQL URL: {e}")))?;
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(StoreError::migration)?;
        debug!("Task store migrations applied");
        Ok(())
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn create_task(&self, task: &Task) -> StoreResult<Task> {
        let sql = format!(
            "INSERT INTO tasks (payload, status, created_at) VALUES ($1, $2, $3) RETURNING {SELECT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(task.payload())
            .bind(task.status().as_str())
            .bind(task.created_at())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::query("create_task", e))?;

        let created = Task::try_from(row)?;
        debug!(task_id = ?created.id(), "Task created");
        Ok(created)
    }

    async fn get_task(&self, task_id: i64) -> StoreResult<Task> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM tasks WHERE id = $1");
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::query("get_task", e))?;

        match row {
            Some(row) => Task::try_from(row),
            None => Err(StoreError::not_found(task_id)),
        }
    }

    async fn update_task(&self, task: &Task) -> StoreResult<()> {
        let task_id = task.id().ok_or(StoreError::MissingId)?;
        let result = sqlx::query("UPDATE tasks SET status = $2 WHERE id = $1")
            .bind(task_id)
            .bind(task.status().as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::query("update_task", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(task_id));
        }
        Ok(())
    }

    async fn get_tasks_by_ids(&self, task_ids: &[i64]) -> StoreResult<Vec<Task>> {
        if task_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!("SELECT {SELECT_COLUMNS} FROM tasks WHERE id = ANY($1)");
        let rows = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(task_ids.to_vec())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::query("get_tasks_by_ids", e))?;

        rows.into_iter().map(Task::try_from).collect()
    }

    async fn update_tasks(&self, tasks: &[Task]) -> StoreResult<u64> {
        if tasks.is_empty() {
            return Ok(0);
        }

        let mut ids = Vec::with_capacity(tasks.len());
        let mut statuses = Vec::with_capacity(tasks.len());
        for task in tasks {
            ids.push(task.id().ok_or(StoreError::MissingId)?);
            statuses.push(task.status().as_str().to_string());
        }

        let result = sqlx::query(
            r#"
            UPDATE tasks AS t
            SET status = u.status
            FROM UNNEST($1::bigint[], $2::text[]) AS u(id, status)
            WHERE t.id = u.id
            "#,
        )
        .bind(ids)
        .bind(statuses)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::query("update_tasks", e))?;

        debug!(
            requested = tasks.len(),
            updated = result.rows_affected(),
            "Batch status write-back"
        );
        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::query("health_check", e))?;
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "postgres"
    }
}
