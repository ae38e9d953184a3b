//! Task management commands for CLI.

use chrono::{NaiveDate, NaiveTime, Utc};
use clap::Subcommand;
use geotask_core::{Priority, Recurrence, TaskId, TaskRecord};
use serde_json::json;

use crate::context::{print_json, CliResult, Context};

#[derive(Subcommand)]
pub enum TaskAction {
    /// Create a new task
    Add {
        /// Task name
        name: String,
        /// Priority 1 (lowest) to 5 (highest)
        #[arg(long, default_value = "3")]
        priority: u8,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<String>,
        /// Due time (HH:MM, UTC)
        #[arg(long)]
        time: Option<String>,
        /// Trigger region ID
        #[arg(long)]
        region: Option<String>,
        /// Recurrence: daily, weekly:<days 0=Sun..6=Sat, comma-separated>, monthly:<day>
        #[arg(long)]
        every: Option<String>,
    },
    /// List tasks
    List {
        /// Include completed tasks
        #[arg(long)]
        all: bool,
    },
    /// Get task details
    Get {
        /// Task ID
        id: TaskId,
    },
    /// Delete a task
    Delete {
        /// Task ID
        id: TaskId,
    },
}

pub async fn run(action: TaskAction) -> CliResult {
    let mut ctx = Context::open()?;

    match action {
        TaskAction::Add {
            name,
            priority,
            due,
            time,
            region,
            every,
        } => {
            let mut record = TaskRecord::new(name).with_priority(Priority::new(priority)?);
            record.due_date = due.as_deref().map(parse_date).transpose()?;
            record.due_time = time.as_deref().map(parse_time).transpose()?;
            record.recurrence = every.as_deref().map(parse_recurrence).transpose()?;
            record.region_id = region;
            let id = ctx.db.insert_task(&record)?;
            print_json(&record.with_id(id))?;
        }
        TaskAction::List { all } => {
            let now = Utc::now();
            let tasks: Vec<_> = ctx
                .db
                .list_tasks()?
                .into_iter()
                .filter(|t| all || !t.completed)
                .map(|t| {
                    let state = ctx.scheduler.record_state(&t);
                    let score = geotask_core::rank(&t, now).score();
                    json!({ "task": t, "state": state, "score": score })
                })
                .collect();
            print_json(&tasks)?;
        }
        TaskAction::Get { id } => {
            let task = ctx.task(id)?;
            print_json(&json!({
                "task": task,
                "state": ctx.scheduler.record_state(&task),
                "due_at": task.due_at(Utc::now()),
            }))?;
        }
        TaskAction::Delete { id } => {
            ctx.scheduler.delete_task(id, Utc::now()).await?;
            ctx.save()?;
            println!("task {id} deleted");
        }
    }
    Ok(())
}

fn parse_date(raw: &str) -> CliResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| format!("invalid date {raw:?}: {e}").into())
}

fn parse_time(raw: &str) -> CliResult<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|e| format!("invalid time {raw:?}: {e}").into())
}

fn parse_recurrence(raw: &str) -> CliResult<Recurrence> {
    let (kind, arg) = raw.split_once(':').unwrap_or((raw, ""));
    match kind {
        "daily" => Ok(Recurrence::Daily),
        "weekly" => {
            let days = arg
                .split(',')
                .filter(|d| !d.trim().is_empty())
                .map(|d| d.trim().parse::<u8>())
                .collect::<Result<Vec<_>, _>>()?;
            if days.is_empty() || days.iter().any(|d| *d > 6) {
                return Err(format!("weekly recurrence needs days 0-6, got {arg:?}").into());
            }
            Ok(Recurrence::Weekly { days })
        }
        "monthly" => {
            let day: u32 = arg.trim().parse()?;
            if !(1..=31).contains(&day) {
                return Err(format!("monthly recurrence needs a day 1-31, got {day}").into());
            }
            Ok(Recurrence::Monthly { day })
        }
        other => Err(format!("unknown recurrence {other:?}").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_recurrence_forms() {
        assert_eq!(parse_recurrence("daily").unwrap(), Recurrence::Daily);
        assert_eq!(
            parse_recurrence("weekly:1,3").unwrap(),
            Recurrence::Weekly { days: vec![1, 3] }
        );
        assert_eq!(
            parse_recurrence("monthly:31").unwrap(),
            Recurrence::Monthly { day: 31 }
        );
        assert!(parse_recurrence("weekly:9").is_err());
        assert!(parse_recurrence("yearly").is_err());
    }

    #[test]
    fn parses_due_time_with_or_without_seconds() {
        assert_eq!(parse_time("14:30").unwrap(), NaiveTime::from_hms_opt(14, 30, 0).unwrap());
        assert_eq!(parse_time("14:30:15").unwrap(), NaiveTime::from_hms_opt(14, 30, 15).unwrap());
        assert!(parse_date("2026-13-01").is_err());
    }
}
