//! In-process implementations of the storage and alarm ports.
//!
//! Used by tests and by embedders that keep tasks elsewhere. `MemoryStore`
//! can be told to fail upcoming calls, which is how the scheduler's
//! persistence-failure paths are exercised.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{AlarmError, StoreError};
use crate::ports::{AlarmBridge, HistoryRecord, HistoryStore, TaskStore};
use crate::task::{TaskId, TaskRecord};

#[derive(Debug, Default)]
struct Inner {
    tasks: BTreeMap<TaskId, TaskRecord>,
    next_id: TaskId,
    history: Vec<HistoryRecord>,
}

/// Task and history store backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    failing_appends: AtomicUsize,
    failing_updates: AtomicUsize,
    append_attempts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store mutex poisoned".into()))
    }

    /// Insert a record synchronously and return it with its new id.
    pub fn add(&self, record: TaskRecord) -> Result<TaskRecord, StoreError> {
        let mut inner = self.lock()?;
        inner.next_id += 1;
        let id = inner.next_id;
        let stored = record.with_id(id);
        inner.tasks.insert(id, stored.clone());
        Ok(stored)
    }

    pub fn task(&self, id: TaskId) -> Option<TaskRecord> {
        self.lock().ok()?.tasks.get(&id).cloned()
    }

    pub fn history(&self) -> Vec<HistoryRecord> {
        self.lock().map(|inner| inner.history.clone()).unwrap_or_default()
    }

    /// Make the next `n` history appends fail.
    pub fn fail_next_appends(&self, n: usize) {
        self.failing_appends.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` task updates fail.
    pub fn fail_next_updates(&self, n: usize) {
        self.failing_updates.store(n, Ordering::SeqCst);
    }

    /// Number of append calls seen, including failed and duplicate ones.
    pub fn append_attempts(&self) -> usize {
        self.append_attempts.load(Ordering::SeqCst)
    }
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn get_tasks(&self) -> Result<Vec<TaskRecord>, StoreError> {
        Ok(self.lock()?.tasks.values().cloned().collect())
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.lock()?.tasks.get(&id).cloned())
    }

    async fn insert_task(&self, record: &TaskRecord) -> Result<TaskId, StoreError> {
        self.add(record.clone()).map(|stored| stored.id.unwrap_or_default())
    }

    async fn update_task(&self, record: &TaskRecord) -> Result<(), StoreError> {
        if take_failure(&self.failing_updates) {
            return Err(StoreError::Unavailable("injected update failure".into()));
        }
        let id = record
            .id
            .ok_or_else(|| StoreError::QueryFailed("cannot update a task without an id".into()))?;
        let mut inner = self.lock()?;
        match inner.tasks.get_mut(&id) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn delete_task(&self, id: TaskId) -> Result<(), StoreError> {
        self.lock()?
            .tasks
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn append(&self, record: &HistoryRecord) -> Result<(), StoreError> {
        self.append_attempts.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failing_appends) {
            return Err(StoreError::Unavailable("injected append failure".into()));
        }
        let mut inner = self.lock()?;
        if !inner.history.iter().any(|h| h.session_id == record.session_id) {
            inner.history.push(record.clone());
        }
        Ok(())
    }
}

/// A call observed by [`RecordingAlarms`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmCall {
    Scheduled(TaskId, DateTime<Utc>),
    Cancelled(TaskId),
}

/// Alarm bridge that records calls and tracks what is currently armed.
#[derive(Debug, Default)]
pub struct RecordingAlarms {
    calls: Mutex<Vec<AlarmCall>>,
    armed: Mutex<HashMap<TaskId, DateTime<Utc>>>,
}

impl RecordingAlarms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<AlarmCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// When the alarm for `task_id` is set to fire, if armed.
    pub fn armed_at(&self, task_id: TaskId) -> Option<DateTime<Utc>> {
        self.armed.lock().ok()?.get(&task_id).copied()
    }

    fn record(&self, call: AlarmCall) -> Result<(), AlarmError> {
        let mut armed = self
            .armed
            .lock()
            .map_err(|_| AlarmError::Bridge("alarm mutex poisoned".into()))?;
        match call {
            AlarmCall::Scheduled(id, at) => {
                armed.insert(id, at);
            }
            AlarmCall::Cancelled(id) => {
                armed.remove(&id);
            }
        }
        self.calls
            .lock()
            .map_err(|_| AlarmError::Bridge("alarm mutex poisoned".into()))?
            .push(call);
        Ok(())
    }
}

impl AlarmBridge for RecordingAlarms {
    fn schedule(&self, task_id: TaskId, at: DateTime<Utc>) -> Result<(), AlarmError> {
        self.record(AlarmCall::Scheduled(task_id, at))
    }

    fn cancel(&self, task_id: TaskId) -> Result<(), AlarmError> {
        self.record(AlarmCall::Cancelled(task_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn injected_append_failure_is_consumed_once() {
        let store = MemoryStore::new();
        store.fail_next_appends(1);
        let record = HistoryRecord {
            session_id: Uuid::new_v4(),
            task_id: 1,
            elapsed_ms: 1_000,
            completed_at: Utc::now(),
        };
        assert!(store.append(&record).await.is_err());
        store.append(&record).await.unwrap();
        store.append(&record).await.unwrap();
        assert_eq!(store.history().len(), 1);
        assert_eq!(store.append_attempts(), 3);
    }

    #[tokio::test]
    async fn add_assigns_increasing_ids() {
        let store = MemoryStore::new();
        let a = store.add(TaskRecord::new("a")).unwrap();
        let b = store.add(TaskRecord::new("b")).unwrap();
        assert_eq!((a.id, b.id), (Some(1), Some(2)));
        assert_eq!(store.get_tasks().await.unwrap().len(), 2);
    }

    #[test]
    fn recording_alarms_tracks_armed_state() {
        let alarms = RecordingAlarms::new();
        let at = Utc::now();
        alarms.schedule(3, at).unwrap();
        assert_eq!(alarms.armed_at(3), Some(at));
        alarms.cancel(3).unwrap();
        assert_eq!(alarms.armed_at(3), None);
        assert_eq!(alarms.calls().len(), 2);
    }
}
