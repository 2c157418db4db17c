//! # Task Model
//!
//! One queued unit of work and its lifecycle status.
//!
//! ## Overview
//!
//! A `Task` is created by the producer side with an opaque string payload, persisted as
//! `PENDING`, and then advanced by a consumer through `PROCESSING` to `COMPLETED`, or
//! cancelled by an independent caller while still `PENDING` or `PROCESSING`.
//!
//! ## Database Schema
//!
//! Maps to the `tasks` table:
//! ```sql
//! CREATE TABLE tasks (
//!   id BIGSERIAL PRIMARY KEY,
//!   payload TEXT NOT NULL,
//!   status VARCHAR(12) NOT NULL DEFAULT 'PENDING',
//!   created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```
//!
//! ## Lifecycle
//!
//! `status` is private and only changes through [`Task::mark_processing`],
//! [`Task::mark_completed`] and [`Task::cancel`], all of which delegate to
//! [`TaskStateMachine`]. A refused transition leaves the task untouched.

use crate::state_machine::{StateMachineResult, TaskEvent, TaskStateMachine, TaskStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Error returned when a payload is rejected at creation time
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Payload cannot be empty or whitespace")]
pub struct InvalidPayload;

/// In-memory copy of a task record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    id: Option<i64>,
    payload: String,
    status: TaskStatus,
    created_at: DateTime<Utc>,
}

impl Task {
    /// Build a new, not yet persisted, `PENDING` task
    pub fn new(payload: impl Into<String>) -> Result<Self, InvalidPayload> {
        let payload = payload.into();
        Self::validate_payload(&payload)?;

        Ok(Self {
            id: None,
            payload,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
        })
    }

    /// Rehydrate a task from its stored representation
    pub fn from_parts(
        id: i64,
        payload: String,
        status: TaskStatus,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Some(id),
            payload,
            status,
            created_at,
        }
    }

    /// Payloads must contain at least one non-whitespace character
    pub fn validate_payload(payload: &str) -> Result<(), InvalidPayload> {
        if payload.trim().is_empty() {
            return Err(InvalidPayload);
        }
        Ok(())
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Assign the store-generated identifier after insertion
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Time elapsed since the task was created, clamped at zero
    pub fn age(&self) -> std::time::Duration {
        (Utc::now() - self.created_at)
            .to_std()
            .unwrap_or_default()
    }

    /// `PENDING -> PROCESSING`
    pub fn mark_processing(&mut self) -> StateMachineResult<()> {
        self.apply(TaskEvent::MarkProcessing)
    }

    /// `PROCESSING -> COMPLETED`
    pub fn mark_completed(&mut self) -> StateMachineResult<()> {
        self.apply(TaskEvent::MarkCompleted)
    }

    /// `PENDING | PROCESSING -> CANCELED`
    pub fn cancel(&mut self) -> StateMachineResult<()> {
        self.apply(TaskEvent::Cancel)
    }

    /// Apply a lifecycle event, leaving the status unchanged when it is refused
    pub fn apply(&mut self, event: TaskEvent) -> StateMachineResult<()> {
        self.status = TaskStateMachine::determine_target_state(self.status, event)?;
        Ok(())
    }
}
