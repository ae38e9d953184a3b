//! # Geotask Core Library
//!
//! Core logic for geotask, a location- and time-triggered task reminder.
//! Region entries, OS alarms and manual calls all propose tasks; the
//! scheduler decides which single task is active, defers or pauses the rest,
//! and records every finished session of work exactly once.
//!
//! ## Architecture
//!
//! - **Scheduler**: A wall-clock state machine over the active slot, paused
//!   set and pending registry. Callers pass `now` and invoke `tick()`
//!   periodically; it never spawns anything itself
//! - **Runtime**: A tokio owner loop that marshals commands, ticks and
//!   escalation answers into the scheduler one at a time
//! - **Ranking / Arbitration**: Effective priority and the start/defer/escalate
//!   decision between a candidate and the incumbent
//! - **Storage**: SQLite task and history storage and TOML configuration
//!
//! ## Key Components
//!
//! - [`Scheduler`]: Arbitration state machine
//! - [`Runtime`] / [`SchedulerHandle`]: Single-owner event loop and its front door
//! - [`Database`]: Task and history persistence
//! - [`Config`]: Application configuration management

pub mod arbitration;
pub mod error;
pub mod events;
pub mod pending;
pub mod ports;
pub mod ranking;
pub mod runtime;
pub mod scheduler;
pub mod storage;
pub mod task;
pub mod timer;
pub mod trigger;

pub use arbitration::{ArbitrationPolicy, Decision, SwitchArbitrator, SwitchId, SwitchRequest, SwitchResponder};
pub use error::{AlarmError, ClockError, ConfigError, CoreError, SchedulerError, StoreError, TriggerError, ValidationError};
pub use events::{EventBus, SchedulerEvent};
pub use pending::{PendingEntry, PendingRegistry};
pub use ports::{AlarmBridge, HistoryRecord, HistoryStore, NoopAlarms, TaskStore};
pub use ranking::{rank, EffectivePriority};
pub use runtime::{DecisionRequest, Runtime, SchedulerHandle};
pub use scheduler::{Ports, Scheduler, SchedulerSnapshot, Session, TickReport, TriggerOutcome};
pub use storage::{Config, Database, MemoryStore, RecordingAlarms, SchedulerConfig};
pub use task::{Priority, Recurrence, TaskId, TaskRecord, TaskState};
pub use timer::SessionClock;
pub use trigger::{NotificationPayload, TriggerKind, TriggerMessage};
