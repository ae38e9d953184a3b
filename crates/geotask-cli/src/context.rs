//! Shared setup for commands that touch the scheduler.
//!
//! Each one-shot invocation rebuilds the scheduler from the snapshot saved in
//! the database's kv table, applies one operation, and saves it back.

use std::error::Error;
use std::sync::Arc;

use geotask_core::storage::Database;
use geotask_core::{
    Config, EventBus, NoopAlarms, Ports, Scheduler, SchedulerConfig, SchedulerSnapshot, TaskId,
    TaskRecord,
};
use tracing::warn;

const SNAPSHOT_KEY: &str = "scheduler_snapshot";

pub type CliResult<T = ()> = Result<T, Box<dyn Error>>;

pub fn open_database(config: &Config) -> CliResult<Arc<Database>> {
    let db = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::open()?,
    };
    Ok(Arc::new(db))
}

pub struct Context {
    pub db: Arc<Database>,
    pub config: SchedulerConfig,
    pub scheduler: Scheduler,
}

impl Context {
    pub fn open() -> CliResult<Self> {
        let config = Config::load()?;
        let scheduler_config = config.scheduler_config()?;
        let db = open_database(&config)?;
        let ports = Ports::new(db.clone(), db.clone(), Arc::new(NoopAlarms));
        let mut scheduler = Scheduler::new(&scheduler_config, ports, EventBus::default());
        if let Some(snapshot) = load_snapshot(&db) {
            scheduler.restore(snapshot);
        }
        Ok(Self {
            db,
            config: scheduler_config,
            scheduler,
        })
    }

    pub fn task(&self, id: TaskId) -> CliResult<TaskRecord> {
        self.db
            .get_task(id)?
            .ok_or_else(|| format!("task {id} not found").into())
    }

    pub fn save(&self) -> CliResult {
        save_snapshot(&self.db, &self.scheduler.snapshot())
    }
}

fn load_snapshot(db: &Database) -> Option<SchedulerSnapshot> {
    let json = db.kv_get(SNAPSHOT_KEY).ok()??;
    match serde_json::from_str(&json) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!(error = %e, "ignoring unreadable scheduler snapshot");
            None
        }
    }
}

pub fn save_snapshot(db: &Database, snapshot: &SchedulerSnapshot) -> CliResult {
    let json = serde_json::to_string(snapshot)?;
    db.kv_set(SNAPSHOT_KEY, &json)?;
    Ok(())
}

pub fn print_json<T: serde::Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
