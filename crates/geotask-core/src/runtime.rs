//! Owner loop for the scheduler.
//!
//! [`Runtime`] owns a [`Scheduler`] and is the only context that touches it.
//! Everything else goes through a [`SchedulerHandle`], which marshals calls
//! onto a bounded command channel and waits for the reply. Commands run one
//! at a time in arrival order; a periodic tick drives pending expiry.
//!
//! Escalations leave the loop as [`DecisionRequest`]s. Each one is watched
//! by a spawned task that waits for the answer up to the switch timeout and
//! sends the outcome back in as an ordinary command.

use std::time::Duration as StdDuration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::arbitration::{SwitchId, SwitchRequest, SwitchResponder};
use crate::error::SchedulerError;
use crate::events::EventBus;
use crate::ports::HistoryRecord;
use crate::scheduler::{Scheduler, SchedulerSnapshot, TickReport, TriggerOutcome};
use crate::storage::SchedulerConfig;
use crate::task::{TaskId, TaskRecord, TaskState};
use crate::trigger::TriggerMessage;

type Reply<T> = oneshot::Sender<Result<T, SchedulerError>>;

enum Command {
    Start { task: TaskRecord, reply: Reply<bool> },
    Pause { reply: Reply<()> },
    Resume { reply: Reply<()> },
    Stop { reply: Reply<HistoryRecord> },
    Reschedule { task: TaskRecord, reply: Reply<()> },
    Complete { task: TaskRecord, reply: Reply<Option<HistoryRecord>> },
    ResumePaused { id: TaskId, reply: Reply<bool> },
    Trigger { message: TriggerMessage, reply: Reply<Vec<TriggerOutcome>> },
    AlarmFired { id: TaskId, reply: Reply<bool> },
    ResolveSwitch {
        id: SwitchId,
        start_now: bool,
        reply: Option<Reply<bool>>,
    },
    Delete { id: TaskId, reply: Reply<()> },
    Tick { reply: oneshot::Sender<TickReport> },
    Snapshot { reply: oneshot::Sender<SchedulerSnapshot> },
    State { id: TaskId, reply: oneshot::Sender<TaskState> },
    Shutdown,
}

/// An escalation handed to the external decision-maker.
#[derive(Debug)]
pub struct DecisionRequest {
    pub request: SwitchRequest,
    pub responder: SwitchResponder,
}

/// Cloneable front door to a running [`Runtime`].
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<Command>,
    bus: EventBus,
}

impl SchedulerHandle {
    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| SchedulerError::Stopped)?;
        rx.await.map_err(|_| SchedulerError::Stopped)?
    }

    async fn query<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| SchedulerError::Stopped)?;
        rx.await.map_err(|_| SchedulerError::Stopped)
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub async fn start_task(&self, task: TaskRecord) -> Result<bool, SchedulerError> {
        self.call(|reply| Command::Start { task, reply }).await
    }

    pub async fn pause_task(&self) -> Result<(), SchedulerError> {
        self.call(|reply| Command::Pause { reply }).await
    }

    pub async fn resume_task(&self) -> Result<(), SchedulerError> {
        self.call(|reply| Command::Resume { reply }).await
    }

    pub async fn stop_task(&self) -> Result<HistoryRecord, SchedulerError> {
        self.call(|reply| Command::Stop { reply }).await
    }

    pub async fn reschedule_task_later(&self, task: TaskRecord) -> Result<(), SchedulerError> {
        self.call(|reply| Command::Reschedule { task, reply }).await
    }

    pub async fn complete_task_manually(
        &self,
        task: TaskRecord,
    ) -> Result<Option<HistoryRecord>, SchedulerError> {
        self.call(|reply| Command::Complete { task, reply }).await
    }

    pub async fn resume_paused_task(&self, id: TaskId) -> Result<bool, SchedulerError> {
        self.call(|reply| Command::ResumePaused { id, reply }).await
    }

    pub async fn trigger(&self, message: TriggerMessage) -> Result<Vec<TriggerOutcome>, SchedulerError> {
        self.call(|reply| Command::Trigger { message, reply }).await
    }

    pub async fn alarm_fired(&self, id: TaskId) -> Result<bool, SchedulerError> {
        self.call(|reply| Command::AlarmFired { id, reply }).await
    }

    pub async fn resolve_switch(&self, id: SwitchId, start_now: bool) -> Result<bool, SchedulerError> {
        self.call(|reply| Command::ResolveSwitch {
            id,
            start_now,
            reply: Some(reply),
        })
        .await
    }

    pub async fn delete_task(&self, id: TaskId) -> Result<(), SchedulerError> {
        self.call(|reply| Command::Delete { id, reply }).await
    }

    /// Run a tick now instead of waiting for the interval.
    pub async fn tick(&self) -> Result<TickReport, SchedulerError> {
        self.query(|reply| Command::Tick { reply }).await
    }

    pub async fn snapshot(&self) -> Result<SchedulerSnapshot, SchedulerError> {
        self.query(|reply| Command::Snapshot { reply }).await
    }

    pub async fn task_state(&self, id: TaskId) -> Result<TaskState, SchedulerError> {
        self.query(|reply| Command::State { id, reply }).await
    }

    /// Ask the loop to stop after the commands already queued.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown).await;
    }
}

pub struct Runtime {
    scheduler: Scheduler,
    commands: mpsc::Receiver<Command>,
    loopback: mpsc::WeakSender<Command>,
    decisions: mpsc::Sender<DecisionRequest>,
    tick_interval: StdDuration,
    switch_timeout: StdDuration,
}

impl Runtime {
    /// Wrap `scheduler` in an owner loop.
    ///
    /// Returns the loop (drive it with [`Runtime::run`]), a handle, and the
    /// receiving end of the decision channel. Dropping that receiver makes
    /// every escalation resolve as "keep deferred".
    pub fn new(
        scheduler: Scheduler,
        config: &SchedulerConfig,
    ) -> (Self, SchedulerHandle, mpsc::Receiver<DecisionRequest>) {
        let capacity = config.command_queue_capacity.max(1);
        let (tx, commands) = mpsc::channel(capacity);
        let (decisions, decision_rx) = mpsc::channel(capacity);
        let handle = SchedulerHandle {
            bus: scheduler.bus().clone(),
            tx: tx.clone(),
        };
        let runtime = Self {
            scheduler,
            commands,
            loopback: tx.downgrade(),
            decisions,
            tick_interval: config.tick_interval,
            switch_timeout: config.switch_timeout.to_std().unwrap_or(StdDuration::ZERO),
        };
        (runtime, handle, decision_rx)
    }

    /// Process commands and ticks until shutdown or until every handle is
    /// dropped, then hand the scheduler back.
    pub async fn run(mut self) -> Scheduler {
        let mut ticker = time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(tick_ms = self.tick_interval.as_millis() as u64, "scheduler runtime started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command).await,
                },
                _ = ticker.tick() => {
                    let report = self.scheduler.tick(Utc::now()).await;
                    if !report.is_empty() {
                        debug!(?report, "tick");
                    }
                }
            }
            self.forward_switch_requests();
        }

        info!("scheduler runtime stopped");
        self.scheduler
    }

    async fn handle(&mut self, command: Command) {
        let now = Utc::now();
        let scheduler = &mut self.scheduler;
        match command {
            Command::Start { task, reply } => {
                let _ = reply.send(scheduler.start_task(task, now));
            }
            Command::Pause { reply } => {
                let _ = reply.send(scheduler.pause_task(now));
            }
            Command::Resume { reply } => {
                let _ = reply.send(scheduler.resume_task(now));
            }
            Command::Stop { reply } => {
                let _ = reply.send(scheduler.stop_task(now).await);
            }
            Command::Reschedule { task, reply } => {
                let _ = reply.send(scheduler.reschedule_task_later(task, now).await);
            }
            Command::Complete { task, reply } => {
                let _ = reply.send(scheduler.complete_task_manually(task, now).await);
            }
            Command::ResumePaused { id, reply } => {
                let _ = reply.send(scheduler.resume_paused_task(id, now));
            }
            Command::Trigger { message, reply } => {
                let _ = reply.send(scheduler.handle_trigger(&message, now).await);
            }
            Command::AlarmFired { id, reply } => {
                let _ = reply.send(scheduler.on_alarm_fired(id, now).await);
            }
            Command::ResolveSwitch { id, start_now, reply } => {
                let result = scheduler.resolve_switch(id, start_now, now);
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            debug!(switch_id = id, error = %e, "late switch answer ignored");
                        }
                    }
                }
            }
            Command::Delete { id, reply } => {
                let _ = reply.send(scheduler.delete_task(id, now).await);
            }
            Command::Tick { reply } => {
                let _ = reply.send(scheduler.tick(now).await);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(scheduler.snapshot());
            }
            Command::State { id, reply } => {
                let _ = reply.send(scheduler.task_state(id));
            }
            Command::Shutdown => {}
        }
    }

    fn forward_switch_requests(&mut self) {
        for request in self.scheduler.take_switch_requests() {
            let switch_id = request.id;
            let (responder, answer) = SwitchResponder::channel(switch_id);
            if self
                .decisions
                .try_send(DecisionRequest { request, responder })
                .is_err()
            {
                warn!(switch_id, "no decision-maker available; keeping candidate deferred");
                if let Err(e) = self.scheduler.resolve_switch(switch_id, false, Utc::now()) {
                    debug!(switch_id, error = %e, "switch already settled");
                }
                continue;
            }

            let timeout = self.switch_timeout;
            let loopback = self.loopback.clone();
            tokio::spawn(async move {
                let start_now = match time::timeout(timeout, answer).await {
                    Ok(Ok(start_now)) => start_now,
                    Ok(Err(_)) => {
                        debug!(switch_id, "decision-maker dropped the request");
                        false
                    }
                    Err(_) => {
                        info!(switch_id, "no answer before the switch timeout");
                        false
                    }
                };
                if let Some(tx) = loopback.upgrade() {
                    let _ = tx
                        .send(Command::ResolveSwitch {
                            id: switch_id,
                            start_now,
                            reply: None,
                        })
                        .await;
                }
            });
        }
    }
}
