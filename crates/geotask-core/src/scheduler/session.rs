use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ports::HistoryRecord;
use crate::task::{TaskId, TaskRecord};
use crate::timer::SessionClock;

/// A task with an open session of work: the active slot, or a member of
/// the paused set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub task_id: TaskId,
    pub task: TaskRecord,
    pub clock: SessionClock,
    /// Idempotency key for the history append that closes this session.
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Set once the closing history append has succeeded but the rest of
    /// the close did not; the clock is frozen from then on.
    #[serde(default)]
    pub recorded: Option<HistoryRecord>,
}

impl Session {
    pub(crate) fn start(task_id: TaskId, task: TaskRecord, now: DateTime<Utc>) -> Self {
        Self {
            task_id,
            task,
            clock: SessionClock::started(now),
            session_id: Uuid::new_v4(),
            started_at: now,
            recorded: None,
        }
    }

    /// Pause the clock if it is running.
    pub(crate) fn freeze(&mut self, now: DateTime<Utc>) {
        if self.clock.is_running() {
            let _ = self.clock.pause(now);
        }
    }

    /// The record that closes this session at `now`, or the one already
    /// stored for it.
    pub(crate) fn history_record(&self, now: DateTime<Utc>) -> HistoryRecord {
        if let Some(record) = &self.recorded {
            return record.clone();
        }
        HistoryRecord {
            session_id: self.session_id,
            task_id: self.task_id,
            elapsed_ms: self.clock.elapsed(now).num_milliseconds(),
            completed_at: now,
        }
    }

    pub(crate) fn mark_recorded(&mut self, record: HistoryRecord, now: DateTime<Utc>) {
        self.freeze(now);
        self.recorded = Some(record);
    }

    pub fn is_recorded(&self) -> bool {
        self.recorded.is_some()
    }
}
