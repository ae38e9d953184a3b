//! Ports to the scheduler's external collaborators.
//!
//! The scheduler only ever talks to storage and the OS alarm service through
//! these traits. `storage::Database` and `storage::MemoryStore` implement
//! the store ports; embedders provide their own [`AlarmBridge`].

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AlarmError, StoreError};
use crate::task::{TaskId, TaskRecord};

/// One durable record of a finished session of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Idempotency key: appending the same session twice stores it once.
    pub session_id: Uuid,
    pub task_id: TaskId,
    pub elapsed_ms: i64,
    pub completed_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn elapsed(&self) -> Duration {
        Duration::milliseconds(self.elapsed_ms)
    }
}

/// CRUD access to task records. Source of truth for completion flags.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn get_tasks(&self) -> Result<Vec<TaskRecord>, StoreError>;

    async fn get_task(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError>;

    /// Persist a new record and return the assigned id.
    async fn insert_task(&self, record: &TaskRecord) -> Result<TaskId, StoreError>;

    /// Replace the stored record with the same id.
    async fn update_task(&self, record: &TaskRecord) -> Result<(), StoreError>;

    async fn delete_task(&self, id: TaskId) -> Result<(), StoreError>;
}

/// Append-only session history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append `record`. A second append with the same `session_id` is a no-op.
    async fn append(&self, record: &HistoryRecord) -> Result<(), StoreError>;
}

/// OS-level wake-up / banner scheduling.
pub trait AlarmBridge: Send + Sync {
    fn schedule(&self, task_id: TaskId, at: DateTime<Utc>) -> Result<(), AlarmError>;

    fn cancel(&self, task_id: TaskId) -> Result<(), AlarmError>;
}

/// Alarm bridge for hosts without an alarm service.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAlarms;

impl AlarmBridge for NoopAlarms {
    fn schedule(&self, _task_id: TaskId, _at: DateTime<Utc>) -> Result<(), AlarmError> {
        Ok(())
    }

    fn cancel(&self, _task_id: TaskId) -> Result<(), AlarmError> {
        Ok(())
    }
}
