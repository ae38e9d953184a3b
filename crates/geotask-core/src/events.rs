//! Scheduler change notifications.
//!
//! Completed state transitions are announced as [`SchedulerEvent`]s on the
//! [`EventBus`]. Observers subscribe and react; they never mutate scheduler
//! state directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::arbitration::SwitchId;
use crate::task::TaskId;

/// Default broadcast capacity.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SchedulerEvent {
    TaskStarted {
        task_id: TaskId,
        session_id: Uuid,
        /// True when a paused session was picked up again.
        resumed_session: bool,
        at: DateTime<Utc>,
    },
    TaskPaused {
        task_id: TaskId,
        elapsed_ms: i64,
        at: DateTime<Utc>,
    },
    TaskResumed {
        task_id: TaskId,
        elapsed_ms: i64,
        at: DateTime<Utc>,
    },
    TaskStopped {
        task_id: TaskId,
        session_id: Uuid,
        elapsed_ms: i64,
        at: DateTime<Utc>,
    },
    TaskDeferred {
        task_id: TaskId,
        expires_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    /// The active task was displaced into the paused set.
    TaskPreempted {
        displaced: TaskId,
        by: TaskId,
        at: DateTime<Utc>,
    },
    TaskCompleted {
        task_id: TaskId,
        at: DateTime<Utc>,
    },
    SwitchRequested {
        switch_id: SwitchId,
        candidate: TaskId,
        incumbent: Option<TaskId>,
        deadline: DateTime<Utc>,
    },
    SwitchResolved {
        switch_id: SwitchId,
        candidate: TaskId,
        start_now: bool,
        timed_out: bool,
        at: DateTime<Utc>,
    },
    /// Persisted task fields changed; list views should refresh.
    TasksInvalidated {
        at: DateTime<Utc>,
    },
}

impl SchedulerEvent {
    /// Task the event is about, if it concerns a single task.
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            SchedulerEvent::TaskStarted { task_id, .. }
            | SchedulerEvent::TaskPaused { task_id, .. }
            | SchedulerEvent::TaskResumed { task_id, .. }
            | SchedulerEvent::TaskStopped { task_id, .. }
            | SchedulerEvent::TaskDeferred { task_id, .. }
            | SchedulerEvent::TaskCompleted { task_id, .. } => Some(*task_id),
            SchedulerEvent::TaskPreempted { by, .. } => Some(*by),
            SchedulerEvent::SwitchRequested { candidate, .. }
            | SchedulerEvent::SwitchResolved { candidate, .. } => Some(*candidate),
            SchedulerEvent::TasksInvalidated { .. } => None,
        }
    }
}

/// Broadcast channel for scheduler events.
///
/// Publishing never blocks. Events are dropped when nobody is subscribed,
/// and receivers that fall more than `capacity` events behind observe
/// `RecvError::Lagged`.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<SchedulerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: SchedulerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}
