//! SQLite-based task and history storage.
//!
//! Provides persistent storage for:
//! - Task records (CRUD)
//! - Append-only session history, deduplicated by session id
//! - Key-value store for application state (the CLI's scheduler snapshot)

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::data_dir;
use crate::error::{ConfigError, CoreError, StoreError};
use crate::ports::{HistoryRecord, HistoryStore, TaskStore};
use crate::task::{Priority, Recurrence, TaskId, TaskRecord};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

/// SQLite database for tasks and session history.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `~/.config/geotask/geotask.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    pub fn open() -> Result<Self, CoreError> {
        let dir = data_dir().map_err(|e| ConfigError::DataDir(e.to_string()))?;
        Ok(Self::open_at(dir.join("geotask.db"))?)
    }

    /// Open (or create) the database at an explicit path.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection mutex poisoned".into()))
    }

    fn migrate(&self) -> Result<(), StoreError> {
        self.conn()?.execute_batch(
            "CREATE TABLE IF NOT EXISTS tasks (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL,
                priority    INTEGER NOT NULL DEFAULT 3,
                due_date    TEXT,
                due_time    TEXT,
                recurrence  TEXT,
                completed   INTEGER NOT NULL DEFAULT 0,
                region_id   TEXT,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS history (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id   TEXT NOT NULL UNIQUE,
                task_id      INTEGER NOT NULL,
                elapsed_ms   INTEGER NOT NULL,
                completed_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_region_id ON tasks(region_id);
            CREATE INDEX IF NOT EXISTS idx_history_task_id ON history(task_id);",
        )?;
        Ok(())
    }

    // ── Tasks ────────────────────────────────────────────────────────

    pub fn insert_task(&self, record: &TaskRecord) -> Result<TaskId, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO tasks (name, priority, due_date, due_time, recurrence, completed, region_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.name,
                record.priority.get(),
                record.due_date.map(|d| d.format(DATE_FORMAT).to_string()),
                record.due_time.map(|t| t.format(TIME_FORMAT).to_string()),
                encode_recurrence(record.recurrence.as_ref())?,
                record.completed,
                record.region_id,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_task(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT id, name, priority, due_date, due_time, recurrence, completed, region_id, created_at
                 FROM tasks WHERE id = ?1",
                params![id],
                row_to_task,
            )
            .optional()?;
        Ok(record)
    }

    pub fn list_tasks(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, priority, due_date, due_time, recurrence, completed, region_id, created_at
             FROM tasks ORDER BY id",
        )?;
        let rows = stmt.query_map([], row_to_task)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    pub fn update_task(&self, record: &TaskRecord) -> Result<(), StoreError> {
        let id = record
            .id
            .ok_or_else(|| StoreError::QueryFailed("cannot update a task without an id".into()))?;
        let changed = self.conn()?.execute(
            "UPDATE tasks SET name = ?2, priority = ?3, due_date = ?4, due_time = ?5,
                 recurrence = ?6, completed = ?7, region_id = ?8
             WHERE id = ?1",
            params![
                id,
                record.name,
                record.priority.get(),
                record.due_date.map(|d| d.format(DATE_FORMAT).to_string()),
                record.due_time.map(|t| t.format(TIME_FORMAT).to_string()),
                encode_recurrence(record.recurrence.as_ref())?,
                record.completed,
                record.region_id,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    pub fn delete_task(&self, id: TaskId) -> Result<(), StoreError> {
        let changed = self
            .conn()?
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    // ── History ──────────────────────────────────────────────────────

    /// Append a session record; a repeated session id is ignored.
    pub fn append_history(&self, record: &HistoryRecord) -> Result<bool, StoreError> {
        let inserted = self.conn()?.execute(
            "INSERT OR IGNORE INTO history (session_id, task_id, elapsed_ms, completed_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.session_id.to_string(),
                record.task_id,
                record.elapsed_ms,
                record.completed_at.to_rfc3339(),
            ],
        )?;
        Ok(inserted > 0)
    }

    /// History records, oldest first, optionally for one task.
    pub fn history(&self, task_id: Option<TaskId>) -> Result<Vec<HistoryRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT session_id, task_id, elapsed_ms, completed_at
             FROM history
             WHERE ?1 IS NULL OR task_id = ?1
             ORDER BY completed_at, id",
        )?;
        let rows = stmt.query_map(params![task_id], |row| {
            let session: String = row.get(0)?;
            let completed: String = row.get(3)?;
            Ok(HistoryRecord {
                session_id: Uuid::parse_str(&session).map_err(|e| conversion_error(0, e))?,
                task_id: row.get(1)?,
                elapsed_ms: row.get(2)?,
                completed_at: parse_timestamp(3, &completed)?,
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    // ── Key-value ────────────────────────────────────────────────────

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self
            .conn()?
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn()?.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

#[async_trait]
impl TaskStore for Database {
    async fn get_tasks(&self) -> Result<Vec<TaskRecord>, StoreError> {
        self.list_tasks()
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
        Database::get_task(self, id)
    }

    async fn insert_task(&self, record: &TaskRecord) -> Result<TaskId, StoreError> {
        Database::insert_task(self, record)
    }

    async fn update_task(&self, record: &TaskRecord) -> Result<(), StoreError> {
        Database::update_task(self, record)
    }

    async fn delete_task(&self, id: TaskId) -> Result<(), StoreError> {
        Database::delete_task(self, id)
    }
}

#[async_trait]
impl HistoryStore for Database {
    async fn append(&self, record: &HistoryRecord) -> Result<(), StoreError> {
        self.append_history(record).map(|_| ())
    }
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    let priority: u8 = row.get(2)?;
    let due_date: Option<String> = row.get(3)?;
    let due_time: Option<String> = row.get(4)?;
    let recurrence: Option<String> = row.get(5)?;
    let created_at: String = row.get(8)?;

    Ok(TaskRecord {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        priority: Priority::new(priority).map_err(|e| conversion_error(2, e))?,
        due_date: due_date
            .map(|d| NaiveDate::parse_from_str(&d, DATE_FORMAT))
            .transpose()
            .map_err(|e| conversion_error(3, e))?,
        due_time: due_time
            .map(|t| NaiveTime::parse_from_str(&t, TIME_FORMAT))
            .transpose()
            .map_err(|e| conversion_error(4, e))?,
        recurrence: recurrence
            .map(|r| serde_json::from_str::<Recurrence>(&r))
            .transpose()
            .map_err(|e| conversion_error(5, e))?,
        completed: row.get(6)?,
        region_id: row.get(7)?,
        created_at: parse_timestamp(8, &created_at)?,
    })
}

fn encode_recurrence(recurrence: Option<&Recurrence>) -> Result<Option<String>, StoreError> {
    recurrence
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| StoreError::QueryFailed(format!("cannot encode recurrence: {e}")))
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample() -> TaskRecord {
        let mut task = TaskRecord::new("pick up parcel")
            .with_priority(Priority::new(4).unwrap())
            .with_region("post-office")
            .with_recurrence(Recurrence::Weekly { days: vec![1, 3] });
        task.due_date = NaiveDate::from_ymd_opt(2026, 4, 2);
        task.due_time = NaiveTime::from_hms_opt(16, 15, 0);
        task.created_at = Utc.with_ymd_and_hms(2026, 4, 1, 8, 0, 0).unwrap();
        task
    }

    #[test]
    fn task_crud() {
        let db = Database::open_in_memory().unwrap();
        let id = db.insert_task(&sample()).unwrap();

        let stored = db.get_task(id).unwrap().unwrap();
        assert_eq!(stored, sample().with_id(id));

        let mut done = stored.clone();
        done.completed = true;
        db.update_task(&done).unwrap();
        assert!(db.get_task(id).unwrap().unwrap().completed);

        db.delete_task(id).unwrap();
        assert!(db.get_task(id).unwrap().is_none());
        assert!(matches!(db.delete_task(id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn update_of_missing_task_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let ghost = sample().with_id(99);
        assert!(matches!(db.update_task(&ghost), Err(StoreError::NotFound(99))));
    }

    #[test]
    fn history_append_is_idempotent_per_session() {
        let db = Database::open_in_memory().unwrap();
        let record = HistoryRecord {
            session_id: Uuid::new_v4(),
            task_id: 1,
            elapsed_ms: Duration::seconds(20).num_milliseconds(),
            completed_at: Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap(),
        };
        assert!(db.append_history(&record).unwrap());
        assert!(!db.append_history(&record).unwrap());

        let all = db.history(None).unwrap();
        assert_eq!(all, vec![record.clone()]);
        assert!(db.history(Some(2)).unwrap().is_empty());
    }

    #[test]
    fn kv_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.kv_get("snapshot").unwrap(), None);
        db.kv_set("snapshot", "{}").unwrap();
        db.kv_set("snapshot", "{\"v\":1}").unwrap();
        assert_eq!(db.kv_get("snapshot").unwrap().as_deref(), Some("{\"v\":1}"));
    }

    #[test]
    fn on_disk_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.db");
        let id = {
            let db = Database::open_at(&path).unwrap();
            db.insert_task(&sample()).unwrap()
        };
        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.list_tasks().unwrap().len(), 1);
        assert_eq!(db.get_task(id).unwrap().unwrap().name, "pick up parcel");
    }
}
