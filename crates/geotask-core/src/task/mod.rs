//! Task records and their lifecycle states.
//!
//! A [`TaskRecord`] is the persisted description of a reminder. The scheduler
//! treats each record as immutable per version: updates go through the task
//! store, and the scheduler re-reads the store whenever it needs the current
//! completion flag.
//!
//! Scheduler-side lifecycle of a task id:
//!
//! ```text
//!            start_task (wins)
//!   Idle ─────────────────────────> Active ───── stop / complete ───> Idle / Completed
//!    │                               │  ^
//!    │ start_task (loses)            │  │ resume_paused_task (wins)
//!    v                               v  │
//!  Pending ── expiry ─> start_task   Paused
//!    │
//!    └── escalation ─> AwaitingDecision ── resolve ─> Active | Pending
//! ```

mod recurrence;

pub use recurrence::Recurrence;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

/// Persisted task identity. Absent until the store assigns one.
pub type TaskId = i64;

/// Declared priority, 1 (lowest) to 5 (highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const LOWEST: Priority = Priority(1);
    pub const HIGHEST: Priority = Priority(5);

    pub fn new(value: u8) -> Result<Self, ValidationError> {
        if (1..=5).contains(&value) {
            Ok(Priority(value))
        } else {
            Err(ValidationError::InvalidValue {
                field: "priority".into(),
                message: format!("{value} is outside 1..=5"),
            })
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority(3)
    }
}

impl TryFrom<u8> for Priority {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Priority::new(value)
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> Self {
        p.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// A reminder task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Store-assigned identity
    pub id: Option<TaskId>,
    /// Display name
    pub name: String,
    /// User-declared priority
    #[serde(default)]
    pub priority: Priority,
    /// Optional due date
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    /// Optional due time (today when no date is set)
    #[serde(default)]
    pub due_time: Option<NaiveTime>,
    /// Optional recurrence descriptor
    #[serde(default)]
    pub recurrence: Option<Recurrence>,
    /// Whether the task is completed
    #[serde(default)]
    pub completed: bool,
    /// Trigger region this task is attached to
    #[serde(default)]
    pub region_id: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Create a new, unpersisted task with default priority.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            priority: Priority::default(),
            due_date: None,
            due_time: None,
            recurrence: None,
            completed: false,
            region_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set both due date and time from a single instant.
    pub fn due_at_instant(mut self, at: DateTime<Utc>) -> Self {
        self.due_date = Some(at.date_naive());
        self.due_time = Some(at.time());
        self
    }

    pub fn with_region(mut self, region_id: impl Into<String>) -> Self {
        self.region_id = Some(region_id.into());
        self
    }

    pub fn with_recurrence(mut self, recurrence: Recurrence) -> Self {
        self.recurrence = Some(recurrence);
        self
    }

    /// The moment this task is due, if any.
    ///
    /// A time without a date means that time today (relative to `now`); a
    /// date without a time means the last second of that day.
    pub fn due_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let end_of_day = NaiveTime::from_hms_opt(23, 59, 59)?;
        match (self.due_date, self.due_time) {
            (Some(date), Some(time)) => Some(date.and_time(time).and_utc()),
            (Some(date), None) => Some(date.and_time(end_of_day).and_utc()),
            (None, Some(time)) => Some(now.date_naive().and_time(time).and_utc()),
            (None, None) => None,
        }
    }

    /// Completed records never take part in arbitration.
    pub fn is_eligible(&self) -> bool {
        !self.completed && self.id.is_some()
    }

    /// The record to persist when the user completes this task.
    ///
    /// Recurring tasks roll their due date to the next occurrence and stay
    /// open; everything else is flagged completed.
    pub fn completed_version(&self, now: DateTime<Utc>) -> TaskRecord {
        let mut next = self.clone();
        match &self.recurrence {
            Some(rule) => {
                let from = self.due_date.unwrap_or_else(|| now.date_naive()).max(now.date_naive());
                next.due_date = rule.next_after(from);
                if next.due_date.is_none() {
                    next.completed = true;
                }
            }
            None => next.completed = true,
        }
        next
    }
}

/// Where a task id currently sits from the scheduler's point of view.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Not tracked by the scheduler
    Idle,
    /// Occupies the active slot
    Active,
    /// Displaced mid-session, clock retained
    Paused,
    /// Deferred before starting
    Pending,
    /// Waiting on an external switch decision
    AwaitingDecision,
    /// Flagged completed in the store. Only [`Scheduler::record_state`]
    /// reports it, since the live sets never hold completed tasks.
    ///
    /// [`Scheduler::record_state`]: crate::Scheduler::record_state
    Completed,
}

impl TaskState {
    pub fn is_live(&self) -> bool {
        !matches!(self, TaskState::Idle | TaskState::Completed)
    }
}

impl Default for TaskState {
    fn default() -> Self {
        TaskState::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn priority_rejects_out_of_range() {
        assert!(Priority::new(0).is_err());
        assert!(Priority::new(6).is_err());
        assert_eq!(Priority::new(5).unwrap(), Priority::HIGHEST);
    }

    #[test]
    fn priority_deserialization_is_validated() {
        let ok: Result<Priority, _> = serde_json::from_str("4");
        assert_eq!(ok.unwrap().get(), 4);
        let bad: Result<Priority, _> = serde_json::from_str("9");
        assert!(bad.is_err());
    }

    #[test]
    fn due_at_combines_date_and_time() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let mut task = TaskRecord::new("water plants");
        assert_eq!(task.due_at(now), None);

        task.due_time = NaiveTime::from_hms_opt(17, 30, 0);
        assert_eq!(
            task.due_at(now),
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 17, 30, 0).unwrap())
        );

        task.due_date = NaiveDate::from_ymd_opt(2026, 3, 4);
        task.due_time = None;
        assert_eq!(
            task.due_at(now),
            Some(Utc.with_ymd_and_hms(2026, 3, 4, 23, 59, 59).unwrap())
        );
    }

    #[test]
    fn completed_or_unsaved_tasks_are_not_eligible() {
        let task = TaskRecord::new("buy milk");
        assert!(!task.is_eligible());
        let mut saved = task.with_id(3);
        assert!(saved.is_eligible());
        saved.completed = true;
        assert!(!saved.is_eligible());
    }

    #[test]
    fn completing_recurring_task_rolls_forward() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let mut task = TaskRecord::new("standup").with_id(1).with_recurrence(Recurrence::Daily);
        task.due_date = NaiveDate::from_ymd_opt(2026, 3, 2);

        let next = task.completed_version(now);
        assert!(!next.completed);
        assert_eq!(next.due_date, NaiveDate::from_ymd_opt(2026, 3, 3));

        let once = TaskRecord::new("once").with_id(2).completed_version(now);
        assert!(once.completed);
    }
}
