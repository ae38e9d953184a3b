//! Session clock.
//!
//! Wall-clock based like an old-fashioned stopwatch: nothing ticks inside the
//! clock itself. Each command takes the current instant, and elapsed time is
//! derived from the accumulator plus the open running interval.
//!
//! ```text
//! Stopped --start--> Running --pause--> Paused
//!                       ^                  |
//!                       +------resume------+
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ClockError;

/// Tracks elapsed active time across pause/resume cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClock {
    /// Accumulated time from closed running intervals, in milliseconds.
    accumulated_ms: i64,
    running: bool,
    /// Start of the open running interval.
    #[serde(default)]
    last_resume: Option<DateTime<Utc>>,
}

impl SessionClock {
    /// A clock that has never run.
    pub fn new() -> Self {
        Self {
            accumulated_ms: 0,
            running: false,
            last_resume: None,
        }
    }

    /// A clock started at `now`.
    pub fn started(now: DateTime<Utc>) -> Self {
        let mut clock = Self::new();
        clock.start(now);
        clock
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn last_resume(&self) -> Option<DateTime<Utc>> {
        self.last_resume
    }

    /// Accumulated time plus the open running interval, if any.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        Duration::milliseconds(self.accumulated_ms) + self.open_interval(now)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start from zero at `now`, discarding any previous accumulation.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.accumulated_ms = 0;
        self.running = true;
        self.last_resume = Some(now);
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<(), ClockError> {
        if !self.running {
            return Err(ClockError::AlreadyPaused);
        }
        self.accumulated_ms += self.open_interval(now).num_milliseconds();
        self.running = false;
        self.last_resume = None;
        Ok(())
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<(), ClockError> {
        if self.running {
            return Err(ClockError::AlreadyRunning);
        }
        self.running = true;
        self.last_resume = Some(now);
        Ok(())
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Length of the open running interval; a `now` before the last resume
    /// counts as zero.
    fn open_interval(&self, now: DateTime<Utc>) -> Duration {
        match (self.running, self.last_resume) {
            (true, Some(since)) if now > since => now - since,
            _ => Duration::zero(),
        }
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}
