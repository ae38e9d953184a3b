//! Pending registry of snoozed tasks.
//!
//! Keyed by task id: deferring a task that is already pending replaces its
//! entry and restarts the countdown from the full snooze duration. Expired
//! entries are removed as they are handed out, so each one surfaces once.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::task::{TaskId, TaskRecord};

/// A deferred task awaiting re-arbitration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEntry {
    pub task: TaskRecord,
    pub deferred_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingEntry {
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}

/// Deferred tasks by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingRegistry {
    entries: HashMap<TaskId, PendingEntry>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `task`, expiring `duration` from `now`.
    ///
    /// Returns `None` for records without an id, which cannot be keyed.
    pub fn defer(
        &mut self,
        task: TaskRecord,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Option<PendingEntry> {
        let id = task.id?;
        let entry = PendingEntry {
            task,
            deferred_at: now,
            expires_at: now + duration,
        };
        self.entries.insert(id, entry.clone());
        Some(entry)
    }

    pub fn cancel(&mut self, id: TaskId) -> Option<PendingEntry> {
        self.entries.remove(&id)
    }

    /// Remove and return every task whose expiry is at or before `now`,
    /// earliest expiry first.
    pub fn expired(&mut self, now: DateTime<Utc>) -> Vec<TaskRecord> {
        let mut due: Vec<(DateTime<Utc>, TaskId)> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(id, entry)| (entry.expires_at, *id))
            .collect();
        due.sort();
        due.into_iter()
            .filter_map(|(_, id)| self.entries.remove(&id))
            .map(|entry| entry.task)
            .collect()
    }

    pub fn remaining(&self, id: TaskId, now: DateTime<Utc>) -> Option<Duration> {
        self.entries.get(&id).map(|entry| entry.remaining(now))
    }

    pub fn get(&self, id: TaskId) -> Option<&PendingEntry> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered by expiry.
    pub fn entries(&self) -> Vec<&PendingEntry> {
        let mut all: Vec<_> = self.entries.values().collect();
        all.sort_by_key(|entry| (entry.expires_at, entry.task.id));
        all
    }

    /// Earliest expiry, if anything is pending.
    pub fn next_expiry(&self) -> Option<DateTime<Utc>> {
        self.entries.values().map(|entry| entry.expires_at).min()
    }
}
