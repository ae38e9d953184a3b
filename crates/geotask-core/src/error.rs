//! Core error types for geotask-core.
//!
//! Every fallible operation returns one of the enums below. Errors are scoped
//! to the operation that produced them; none of them put the scheduler into
//! a global failure state.

use std::path::PathBuf;
use thiserror::Error;

use crate::arbitration::SwitchId;
use crate::task::TaskId;

/// Umbrella error type for geotask-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Scheduler state-machine errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Storage errors
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Trigger payload errors
    #[error("Trigger error: {0}")]
    Trigger(#[from] TriggerError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors reported by scheduler operations.
///
/// None of these mutate state: the operation that failed left the active
/// slot, paused set and pending registry exactly as they were.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The operation needs an active task and there is none.
    #[error("no active task")]
    NoActiveTask,

    /// The operation is not valid in the current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// `resume_paused_task` was called for a task outside the paused set.
    #[error("task {0} is not paused")]
    NotPaused(TaskId),

    /// The record cannot take part in arbitration.
    #[error("task {name:?} is not eligible: {reason}")]
    Ineligible { name: String, reason: String },

    /// A switch resolution referenced a request that is not outstanding.
    #[error("no outstanding switch request {0}")]
    UnknownSwitch(SwitchId),

    /// A persistence port failed; state was retained and the call may be retried.
    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),

    /// The owner loop is gone; the command was not processed.
    #[error("scheduler runtime has stopped")]
    Stopped,
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// No record with this id
    #[error("Task {0} not found")]
    NotFound(TaskId),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// Backend temporarily unavailable
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Key does not exist in the configuration tree
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Errors raised while decoding trigger payloads at the boundary.
#[derive(Error, Debug)]
pub enum TriggerError {
    /// Payload is not valid JSON or has the wrong shape
    #[error("malformed trigger payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Payload parsed but failed validation
    #[error("invalid trigger payload: {0}")]
    Invalid(String),
}

/// Alarm/notification bridge failures. Logged by the scheduler, never fatal.
#[derive(Error, Debug)]
pub enum AlarmError {
    #[error("alarm bridge failed: {0}")]
    Bridge(String),
}

/// Session clock misuse.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    #[error("clock is already running")]
    AlreadyRunning,

    #[error("clock is already paused")]
    AlreadyPaused,
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked
                    || e.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

impl From<ClockError> for SchedulerError {
    fn from(err: ClockError) -> Self {
        SchedulerError::InvalidOperation(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
