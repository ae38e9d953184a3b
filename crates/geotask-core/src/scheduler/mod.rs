//! Task arbitration & timer scheduler.
//!
//! The scheduler owns the active slot, the paused set, the pending registry
//! and the outstanding switch requests. Like the session clock it has no
//! internal threads: every operation takes the current instant, and the
//! owner (see [`crate::runtime`]) calls [`Scheduler::tick`] periodically.
//!
//! Operations that only rearrange in-memory state are synchronous.
//! Operations that write history or task records are `async`; they await the
//! port before mutating anything, so a failed write leaves every set exactly
//! as it was and the call can simply be retried.

mod session;

pub use session::Session;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::arbitration::{Decision, SwitchArbitrator, SwitchId, SwitchRequest};
use crate::error::SchedulerError;
use crate::events::{EventBus, SchedulerEvent};
use crate::pending::{PendingEntry, PendingRegistry};
use crate::ports::{AlarmBridge, HistoryRecord, HistoryStore, TaskStore};
use crate::storage::SchedulerConfig;
use crate::task::{TaskId, TaskRecord, TaskState};
use crate::trigger::{self, TriggerMessage};

/// External collaborators injected into the scheduler.
#[derive(Clone)]
pub struct Ports {
    pub tasks: Arc<dyn TaskStore>,
    pub history: Arc<dyn HistoryStore>,
    pub alarms: Arc<dyn AlarmBridge>,
}

impl Ports {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        history: Arc<dyn HistoryStore>,
        alarms: Arc<dyn AlarmBridge>,
    ) -> Self {
        Self {
            tasks,
            history,
            alarms,
        }
    }
}

/// What a [`Scheduler::tick`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    /// Switch requests that ran past their deadline and were kept deferred.
    pub timed_out_switches: Vec<SwitchId>,
    /// Expired pending tasks that won re-arbitration.
    pub started: Vec<TaskId>,
    /// Expired pending tasks that lost again (deferred, escalated or kept paused).
    pub requeued: Vec<TaskId>,
    /// Expired pending tasks that were deleted or completed in the meantime.
    pub discarded: Vec<TaskId>,
}

impl TickReport {
    pub fn is_empty(&self) -> bool {
        self.timed_out_switches.is_empty()
            && self.started.is_empty()
            && self.requeued.is_empty()
            && self.discarded.is_empty()
    }
}

/// Outcome of proposing one trigger candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerOutcome {
    pub task_id: TaskId,
    pub started: bool,
}

/// Serializable copy of the scheduler's live sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    pub active: Option<Session>,
    #[serde(default)]
    pub paused: Vec<Session>,
    #[serde(default)]
    pub pending: Vec<PendingEntry>,
    #[serde(default)]
    pub switches: Vec<SwitchRequest>,
    #[serde(default)]
    pub next_switch_id: SwitchId,
}

pub struct Scheduler {
    arbitrator: SwitchArbitrator,
    switch_timeout: Duration,
    ports: Ports,
    bus: EventBus,
    active: Option<Session>,
    paused: BTreeMap<TaskId, Session>,
    pending: PendingRegistry,
    switches: BTreeMap<SwitchId, SwitchRequest>,
    next_switch_id: SwitchId,
    /// Requests raised since the owner last drained them.
    raised: Vec<SwitchRequest>,
}

impl Scheduler {
    pub fn new(config: &SchedulerConfig, ports: Ports, bus: EventBus) -> Self {
        Self {
            arbitrator: SwitchArbitrator::new(config.policy.clone()),
            switch_timeout: config.switch_timeout,
            ports,
            bus,
            active: None,
            paused: BTreeMap::new(),
            pending: PendingRegistry::new(),
            switches: BTreeMap::new(),
            next_switch_id: 1,
            raised: Vec::new(),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn ports(&self) -> &Ports {
        &self.ports
    }

    pub fn default_snooze(&self) -> Duration {
        self.arbitrator.policy().default_snooze
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn has_active_task(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_task(&self) -> Option<&TaskRecord> {
        self.active.as_ref().map(|s| &s.task)
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.active.as_ref()
    }

    /// True when the active task's clock is paused.
    pub fn is_paused(&self) -> bool {
        self.active
            .as_ref()
            .map(|s| !s.clock.is_running())
            .unwrap_or(false)
    }

    pub fn is_pending(&self, id: TaskId) -> bool {
        self.pending.contains(id)
    }

    /// True when `id` is the active task and its clock is running.
    pub fn is_running(&self, id: TaskId) -> bool {
        self.active
            .as_ref()
            .map(|s| s.task_id == id && s.clock.is_running())
            .unwrap_or(false)
    }

    pub fn pending_remaining(&self, id: TaskId, now: DateTime<Utc>) -> Option<Duration> {
        self.pending.remaining(id, now)
    }

    pub fn pending_entries(&self) -> Vec<&PendingEntry> {
        self.pending.entries()
    }

    pub fn paused_tasks(&self) -> Vec<&TaskRecord> {
        self.paused.values().map(|s| &s.task).collect()
    }

    pub fn paused_sessions(&self) -> impl Iterator<Item = &Session> {
        self.paused.values()
    }

    pub fn active_elapsed(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.active.as_ref().map(|s| s.clock.elapsed(now))
    }

    pub fn outstanding_switches(&self) -> Vec<&SwitchRequest> {
        self.switches.values().collect()
    }

    pub fn is_awaiting_decision(&self, id: TaskId) -> bool {
        self.switches.values().any(|r| r.candidate.id == Some(id))
    }

    /// Live state of `id`. Tasks the scheduler does not track are `Idle`,
    /// whatever their stored completion flag.
    pub fn task_state(&self, id: TaskId) -> TaskState {
        if self.active.as_ref().map(|s| s.task_id) == Some(id) {
            TaskState::Active
        } else if self.is_awaiting_decision(id) {
            TaskState::AwaitingDecision
        } else if self.paused.contains_key(&id) {
            TaskState::Paused
        } else if self.pending.contains(id) {
            TaskState::Pending
        } else {
            TaskState::Idle
        }
    }

    /// State of a stored record: its live state, or `Completed` when the
    /// scheduler does not track it and the record is flagged done.
    pub fn record_state(&self, task: &TaskRecord) -> TaskState {
        match task.id.map(|id| self.task_state(id)) {
            Some(state) if state.is_live() => state,
            _ if task.completed => TaskState::Completed,
            _ => TaskState::Idle,
        }
    }

    /// Drain switch requests raised since the last call.
    pub fn take_switch_requests(&mut self) -> Vec<SwitchRequest> {
        std::mem::take(&mut self.raised)
    }

    // ── Arbitration ──────────────────────────────────────────────────

    /// Propose `task` for the active slot.
    ///
    /// Returns `Ok(true)` iff the task is active when the call returns.
    /// Deferral and escalation both return `Ok(false)`; an escalation answered
    /// later does not change this call's result.
    pub fn start_task(&mut self, task: TaskRecord, now: DateTime<Utc>) -> Result<bool, SchedulerError> {
        let id = eligible_id(&task)?;

        if self.active.as_ref().map(|s| s.task_id) == Some(id) {
            debug!(task_id = id, "start requested for the active task");
            return Ok(true);
        }
        if self.is_awaiting_decision(id) {
            debug!(task_id = id, "start requested while a switch decision is outstanding");
            return Ok(false);
        }
        if self.pending.cancel(id).is_some() {
            debug!(task_id = id, "re-arbitrating pending task");
        }

        let incumbent = self.active.as_ref().map(|s| &s.task);
        match self.arbitrator.arbitrate(incumbent, &task, now) {
            Decision::StartImmediately => {
                self.install(id, task, now);
                Ok(true)
            }
            Decision::DeferCandidate(snooze) => {
                self.defer_or_keep_paused(id, task, snooze, now);
                Ok(false)
            }
            Decision::EscalateToExternalDecision => {
                self.raise_switch(task, now);
                Ok(false)
            }
        }
    }

    /// Promote a paused task back through arbitration.
    pub fn resume_paused_task(&mut self, id: TaskId, now: DateTime<Utc>) -> Result<bool, SchedulerError> {
        let task = self
            .paused
            .get(&id)
            .map(|s| s.task.clone())
            .ok_or(SchedulerError::NotPaused(id))?;
        self.start_task(task, now)
    }

    /// Answer an outstanding switch request.
    pub fn resolve_switch(
        &mut self,
        switch_id: SwitchId,
        start_now: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, SchedulerError> {
        let request = self
            .switches
            .remove(&switch_id)
            .ok_or(SchedulerError::UnknownSwitch(switch_id))?;
        self.raised.retain(|r| r.id != switch_id);
        Ok(self.settle_switch(request, start_now, false, now))
    }

    // ── Active slot controls ─────────────────────────────────────────

    pub fn pause_task(&mut self, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        let session = self.active.as_mut().ok_or(SchedulerError::NoActiveTask)?;
        session.clock.pause(now)?;
        let event = SchedulerEvent::TaskPaused {
            task_id: session.task_id,
            elapsed_ms: session.clock.elapsed(now).num_milliseconds(),
            at: now,
        };
        info!(task_id = session.task_id, "task paused");
        self.bus.publish(event);
        Ok(())
    }

    pub fn resume_task(&mut self, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        let session = self.active.as_mut().ok_or(SchedulerError::NoActiveTask)?;
        if session.is_recorded() {
            return Err(SchedulerError::InvalidOperation(
                "session is already recorded; complete or stop the task".into(),
            ));
        }
        session.clock.resume(now)?;
        let event = SchedulerEvent::TaskResumed {
            task_id: session.task_id,
            elapsed_ms: session.clock.elapsed(now).num_milliseconds(),
            at: now,
        };
        info!(task_id = session.task_id, "task resumed");
        self.bus.publish(event);
        Ok(())
    }

    /// Close the active session and record it.
    ///
    /// The slot is cleared only after the history append succeeds.
    pub async fn stop_task(&mut self, now: DateTime<Utc>) -> Result<HistoryRecord, SchedulerError> {
        let record = self
            .active
            .as_ref()
            .ok_or(SchedulerError::NoActiveTask)?
            .history_record(now);
        self.append_history(&record).await?;

        self.active = None;
        self.cancel_alarm(record.task_id);
        info!(
            task_id = record.task_id,
            session_id = %record.session_id,
            elapsed_ms = record.elapsed_ms,
            "task stopped"
        );
        self.bus.publish(SchedulerEvent::TaskStopped {
            task_id: record.task_id,
            session_id: record.session_id,
            elapsed_ms: record.elapsed_ms,
            at: now,
        });
        Ok(record)
    }

    /// Snooze `task` for the default duration, whatever state it is in.
    ///
    /// An open session for the task is recorded to history first.
    pub async fn reschedule_task_later(
        &mut self,
        task: TaskRecord,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        let id = eligible_id(&task)?;
        let record = self.session_for(id).map(|s| s.history_record(now));
        if let Some(record) = &record {
            self.append_history(record).await?;
        }

        self.pending.cancel(id);
        self.drop_switches_for(id);
        self.close_session(id);
        if let Some(record) = record {
            info!(
                task_id = id,
                session_id = %record.session_id,
                elapsed_ms = record.elapsed_ms,
                "session closed for reschedule"
            );
            self.bus.publish(SchedulerEvent::TaskStopped {
                task_id: id,
                session_id: record.session_id,
                elapsed_ms: record.elapsed_ms,
                at: now,
            });
        }
        let snooze = self.default_snooze();
        self.defer(id, task, snooze, now);
        Ok(())
    }

    /// Mark `task` complete and drop it from every live set.
    ///
    /// An open session is recorded first, then the completion is persisted;
    /// the live sets change only after both writes succeed. Once the history
    /// append succeeds the session is frozen, so a retry after a failed
    /// completion write returns the record already stored. Recurring tasks
    /// are rolled to their next occurrence instead of being flagged done.
    pub async fn complete_task_manually(
        &mut self,
        task: TaskRecord,
        now: DateTime<Utc>,
    ) -> Result<Option<HistoryRecord>, SchedulerError> {
        let id = task.id.ok_or_else(|| SchedulerError::Ineligible {
            name: task.name.clone(),
            reason: "record has not been persisted".into(),
        })?;

        let record = self.session_for(id).map(|s| s.history_record(now));
        if let Some(record) = &record {
            self.append_history(record).await?;
            if let Some(session) = self.session_for_mut(id) {
                session.mark_recorded(record.clone(), now);
            }
        }

        let stored = self.ports.tasks.get_task(id).await?;
        let updated = match stored {
            Some(current) => {
                let updated = current.completed_version(now);
                self.ports.tasks.update_task(&updated).await.map_err(|e| {
                    warn!(task_id = id, error = %e, "failed to persist completion");
                    e
                })?;
                Some(updated)
            }
            None => {
                warn!(task_id = id, "completed task is missing from the store");
                None
            }
        };

        self.forget(id);
        if let Some(next_due) = updated
            .as_ref()
            .filter(|t| !t.completed)
            .and_then(|t| t.due_at(now))
            .filter(|due| *due > now)
        {
            self.schedule_alarm(id, next_due);
        }
        info!(task_id = id, "task completed");
        self.bus.publish(SchedulerEvent::TaskCompleted { task_id: id, at: now });
        self.bus.publish(SchedulerEvent::TasksInvalidated { at: now });
        Ok(record)
    }

    /// Delete the stored record and drop the id from every live set.
    ///
    /// An open session is discarded without a history record.
    pub async fn delete_task(&mut self, id: TaskId, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        self.ports.tasks.delete_task(id).await?;
        if self.task_state(id).is_live() {
            info!(task_id = id, "dropping deleted task from live sets");
        }
        self.forget(id);
        self.bus.publish(SchedulerEvent::TasksInvalidated { at: now });
        Ok(())
    }

    // ── Timers and triggers ──────────────────────────────────────────

    /// Periodic housekeeping: time out switch requests, then re-arbitrate
    /// expired pending tasks one at a time in expiry order.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        let overdue: Vec<SwitchId> = self
            .switches
            .values()
            .filter(|r| r.deadline <= now)
            .map(|r| r.id)
            .collect();
        for switch_id in overdue {
            if let Some(request) = self.switches.remove(&switch_id) {
                self.raised.retain(|r| r.id != switch_id);
                info!(switch_id, "switch request timed out");
                self.settle_switch(request, false, true, now);
                report.timed_out_switches.push(switch_id);
            }
        }

        for cached in self.pending.expired(now) {
            let Some(id) = cached.id else { continue };
            let candidate = match self.ports.tasks.get_task(id).await {
                Ok(Some(current)) if !current.completed => current,
                Ok(_) => {
                    info!(task_id = id, "discarding expired snooze for deleted or completed task");
                    self.cancel_alarm(id);
                    report.discarded.push(id);
                    continue;
                }
                Err(e) => {
                    warn!(task_id = id, error = %e, "task store unavailable; re-arbitrating cached record");
                    cached
                }
            };
            match self.start_task(candidate, now) {
                Ok(true) => report.started.push(id),
                Ok(false) => report.requeued.push(id),
                Err(e) => {
                    debug!(task_id = id, error = %e, "expired task no longer eligible");
                    report.discarded.push(id);
                }
            }
        }

        report
    }

    /// An OS alarm for `id` fired.
    ///
    /// Alarms for deleted or completed tasks, and alarms that predate a
    /// refreshed snooze, are discarded without touching any state.
    pub async fn on_alarm_fired(&mut self, id: TaskId, now: DateTime<Utc>) -> Result<bool, SchedulerError> {
        let task = match self.ports.tasks.get_task(id).await? {
            Some(task) if !task.completed => task,
            _ => {
                info!(task_id = id, "discarding stale alarm");
                return Ok(false);
            }
        };
        if let Some(remaining) = self.pending.remaining(id, now) {
            if remaining > Duration::zero() {
                debug!(task_id = id, "alarm predates the current snooze; ignoring");
                return Ok(false);
            }
        }
        self.start_task(task, now)
    }

    /// Resolve a trigger to stored candidates and propose them best-first.
    pub async fn handle_trigger(
        &mut self,
        message: &TriggerMessage,
        now: DateTime<Utc>,
    ) -> Result<Vec<TriggerOutcome>, SchedulerError> {
        let Some(region_ids) = message.proposing_regions() else {
            debug!(?message, "trigger proposes no candidates");
            return Ok(Vec::new());
        };
        let tasks = self.ports.tasks.get_tasks().await?;
        let candidates = trigger::resolve_candidates(tasks, region_ids, now);
        if candidates.is_empty() {
            debug!(?region_ids, "no eligible tasks for trigger");
        }

        let mut outcomes = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let Some(task_id) = candidate.id else { continue };
            match self.start_task(candidate, now) {
                Ok(started) => outcomes.push(TriggerOutcome { task_id, started }),
                Err(e) => warn!(task_id, error = %e, "trigger candidate rejected"),
            }
        }
        Ok(outcomes)
    }

    // ── Snapshot ─────────────────────────────────────────────────────

    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            active: self.active.clone(),
            paused: self.paused.values().cloned().collect(),
            pending: self.pending.entries().into_iter().cloned().collect(),
            switches: self.switches.values().cloned().collect(),
            next_switch_id: self.next_switch_id,
        }
    }

    /// Replace the live sets with `snapshot`. Publishes nothing.
    pub fn restore(&mut self, snapshot: SchedulerSnapshot) {
        self.active = snapshot.active;
        self.paused = snapshot
            .paused
            .into_iter()
            .map(|s| (s.task_id, s))
            .collect();
        self.pending = PendingRegistry::new();
        for entry in snapshot.pending {
            let duration = entry.expires_at - entry.deferred_at;
            self.pending.defer(entry.task, duration, entry.deferred_at);
        }
        let max_seen = snapshot.switches.iter().map(|r| r.id).max().unwrap_or(0);
        self.switches = snapshot.switches.into_iter().map(|r| (r.id, r)).collect();
        self.next_switch_id = snapshot.next_switch_id.max(max_seen + 1).max(1);
        self.raised.clear();
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Put `task` in the active slot, displacing any incumbent into the
    /// paused set. Publishes a single event once both moves are done.
    fn install(&mut self, id: TaskId, task: TaskRecord, now: DateTime<Utc>) {
        let (session, resumed) = match self.paused.remove(&id) {
            Some(mut session) if !session.is_recorded() => {
                session.task = task;
                if !session.clock.is_running() {
                    let _ = session.clock.resume(now);
                }
                (session, true)
            }
            _ => (Session::start(id, task, now), false),
        };
        let session_id = session.session_id;

        let displaced = self.active.take().map(|mut incumbent| {
            incumbent.freeze(now);
            let displaced_id = incumbent.task_id;
            self.paused.insert(displaced_id, incumbent);
            displaced_id
        });
        self.active = Some(session);
        self.cancel_alarm(id);

        match displaced {
            Some(displaced) => {
                info!(task_id = id, displaced, "task preempted active task");
                self.bus.publish(SchedulerEvent::TaskPreempted {
                    displaced,
                    by: id,
                    at: now,
                });
            }
            None => {
                info!(task_id = id, resumed, "task started");
                self.bus.publish(SchedulerEvent::TaskStarted {
                    task_id: id,
                    session_id,
                    resumed_session: resumed,
                    at: now,
                });
            }
        }
    }

    /// A losing candidate that is already paused stays paused; anything else
    /// goes to the pending registry.
    fn defer_or_keep_paused(&mut self, id: TaskId, task: TaskRecord, snooze: Duration, now: DateTime<Utc>) {
        if let Some(session) = self.paused.get_mut(&id) {
            session.task = task;
            info!(task_id = id, "paused task lost arbitration; staying paused");
            return;
        }
        self.defer(id, task, snooze, now);
    }

    fn defer(&mut self, id: TaskId, task: TaskRecord, snooze: Duration, now: DateTime<Utc>) {
        let Some(entry) = self.pending.defer(task, snooze, now) else {
            return;
        };
        self.schedule_alarm(id, entry.expires_at);
        info!(task_id = id, expires_at = %entry.expires_at, "task deferred");
        self.bus.publish(SchedulerEvent::TaskDeferred {
            task_id: id,
            expires_at: entry.expires_at,
            at: now,
        });
    }

    fn raise_switch(&mut self, candidate: TaskRecord, now: DateTime<Utc>) {
        let switch_id = self.next_switch_id;
        self.next_switch_id += 1;
        let request = SwitchRequest {
            id: switch_id,
            incumbent: self.active.as_ref().map(|s| s.task.clone()),
            candidate,
            requested_at: now,
            deadline: now + self.switch_timeout,
        };
        let candidate_id = request.candidate.id.unwrap_or_default();
        info!(switch_id, task_id = candidate_id, "escalating start request");
        self.bus.publish(SchedulerEvent::SwitchRequested {
            switch_id,
            candidate: candidate_id,
            incumbent: request.incumbent.as_ref().and_then(|t| t.id),
            deadline: request.deadline,
        });
        self.switches.insert(switch_id, request.clone());
        self.raised.push(request);
    }

    fn settle_switch(&mut self, request: SwitchRequest, start_now: bool, timed_out: bool, now: DateTime<Utc>) -> bool {
        let Some(id) = request.candidate.id else {
            return false;
        };
        self.bus.publish(SchedulerEvent::SwitchResolved {
            switch_id: request.id,
            candidate: id,
            start_now,
            timed_out,
            at: now,
        });
        if self.active.as_ref().map(|s| s.task_id) == Some(id) {
            return true;
        }
        if start_now {
            self.install(id, request.candidate, now);
            true
        } else {
            let snooze = self.default_snooze();
            self.defer_or_keep_paused(id, request.candidate, snooze, now);
            false
        }
    }

    fn session_for(&self, id: TaskId) -> Option<&Session> {
        self.active
            .as_ref()
            .filter(|s| s.task_id == id)
            .or_else(|| self.paused.get(&id))
    }

    fn session_for_mut(&mut self, id: TaskId) -> Option<&mut Session> {
        match self.active.as_mut() {
            Some(session) if session.task_id == id => Some(session),
            _ => self.paused.get_mut(&id),
        }
    }

    /// Remove `id`'s open session, if any, without recording it.
    fn close_session(&mut self, id: TaskId) {
        if self.active.as_ref().map(|s| s.task_id) == Some(id) {
            self.active = None;
        }
        self.paused.remove(&id);
    }

    fn drop_switches_for(&mut self, id: TaskId) {
        self.switches.retain(|_, r| r.candidate.id != Some(id));
        self.raised.retain(|r| r.candidate.id != Some(id));
    }

    /// Drop `id` from every live set and cancel its alarm.
    fn forget(&mut self, id: TaskId) {
        self.close_session(id);
        self.pending.cancel(id);
        self.drop_switches_for(id);
        self.cancel_alarm(id);
    }

    async fn append_history(&self, record: &HistoryRecord) -> Result<(), SchedulerError> {
        self.ports.history.append(record).await.map_err(|e| {
            warn!(
                task_id = record.task_id,
                session_id = %record.session_id,
                error = %e,
                "history append failed; session retained"
            );
            SchedulerError::Persistence(e)
        })
    }

    fn schedule_alarm(&self, id: TaskId, at: DateTime<Utc>) {
        if let Err(e) = self.ports.alarms.schedule(id, at) {
            warn!(task_id = id, error = %e, "failed to schedule alarm");
        }
    }

    fn cancel_alarm(&self, id: TaskId) {
        if let Err(e) = self.ports.alarms.cancel(id) {
            warn!(task_id = id, error = %e, "failed to cancel alarm");
        }
    }
}

fn eligible_id(task: &TaskRecord) -> Result<TaskId, SchedulerError> {
    let ineligible = |reason: &str| SchedulerError::Ineligible {
        name: task.name.clone(),
        reason: reason.to_string(),
    };
    if task.completed {
        return Err(ineligible("task is completed"));
    }
    task.id.ok_or_else(|| ineligible("record has not been persisted"))
}
