use chrono::Utc;
use geotask_core::trigger::parse_notification_payload;
use geotask_core::{Scheduler, TaskId, TriggerMessage};
use serde_json::json;

use crate::context::{print_json, CliResult, Context};

/// One-shot scheduler operations.
pub enum Control {
    Start(TaskId),
    Pause,
    Resume,
    Stop,
    Later(TaskId),
    Complete(TaskId),
    ResumePaused(TaskId),
    Status,
    Tick,
    Alarm(TaskId),
    Trigger(String),
}

pub async fn run(control: Control) -> CliResult {
    let mut ctx = Context::open()?;
    let now = Utc::now();

    let output = match control {
        Control::Start(id) => {
            let task = ctx.task(id)?;
            let started = ctx.scheduler.start_task(task, now)?;
            started_output(&mut ctx.scheduler, id, started)
        }
        Control::Pause => {
            ctx.scheduler.pause_task(now)?;
            status(&ctx.scheduler)
        }
        Control::Resume => {
            ctx.scheduler.resume_task(now)?;
            status(&ctx.scheduler)
        }
        Control::Stop => {
            let record = ctx.scheduler.stop_task(now).await?;
            json!({ "type": "task_stopped", "history": record })
        }
        Control::Later(id) => {
            let task = ctx.task(id)?;
            ctx.scheduler.reschedule_task_later(task, now).await?;
            json!({
                "type": "task_deferred",
                "task_id": id,
                "remaining_secs": ctx.scheduler.pending_remaining(id, now).map(|d| d.num_seconds()),
            })
        }
        Control::Complete(id) => {
            let task = ctx.task(id)?;
            let record = ctx.scheduler.complete_task_manually(task, now).await?;
            json!({ "type": "task_completed", "task_id": id, "history": record })
        }
        Control::ResumePaused(id) => {
            let started = ctx.scheduler.resume_paused_task(id, now)?;
            started_output(&mut ctx.scheduler, id, started)
        }
        Control::Status => status(&ctx.scheduler),
        Control::Tick => {
            let report = ctx.scheduler.tick(now).await;
            json!({ "type": "tick", "report": report })
        }
        Control::Alarm(id) => {
            let started = ctx.scheduler.on_alarm_fired(id, now).await?;
            started_output(&mut ctx.scheduler, id, started)
        }
        Control::Trigger(raw) => {
            let message = TriggerMessage::NotificationAction(parse_notification_payload(&raw)?);
            let outcomes = ctx.scheduler.handle_trigger(&message, now).await?;
            let switch_requests = ctx.scheduler.take_switch_requests();
            json!({
                "type": "trigger",
                "outcomes": outcomes,
                "switch_requests": switch_requests,
            })
        }
    };

    ctx.save()?;
    print_json(&output)
}

fn started_output(scheduler: &mut Scheduler, id: TaskId, started: bool) -> serde_json::Value {
    // one-shot invocations leave escalations outstanding for `switch resolve`
    let switch_requests = scheduler.take_switch_requests();
    json!({
        "task_id": id,
        "started": started,
        "state": scheduler.task_state(id),
        "switch_requests": switch_requests,
    })
}

fn status(scheduler: &Scheduler) -> serde_json::Value {
    let now = Utc::now();
    let active = scheduler.active_session().map(|session| {
        json!({
            "task": session.task,
            "session_id": session.session_id,
            "running": session.clock.is_running(),
            "elapsed_secs": session.clock.elapsed(now).num_seconds(),
        })
    });
    let paused: Vec<_> = scheduler
        .paused_sessions()
        .map(|session| {
            json!({
                "task": session.task,
                "elapsed_secs": session.clock.elapsed(now).num_seconds(),
            })
        })
        .collect();
    let pending: Vec<_> = scheduler
        .pending_entries()
        .into_iter()
        .map(|entry| {
            json!({
                "task": entry.task,
                "expires_at": entry.expires_at,
                "remaining_secs": entry.remaining(now).num_seconds(),
            })
        })
        .collect();
    json!({
        "active": active,
        "paused": paused,
        "pending": pending,
        "switches": scheduler.outstanding_switches(),
    })
}
