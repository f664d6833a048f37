//! Embedded SQLite store holding the mirrored scheduler state and run
//! history.
//!
//! Three tables mirror the external world: `Executors` (jobs registered in
//! the scheduler), `Tasks` (scripts discovered inside a job's launcher) and
//! `Runs` (one row per recorded execution). A fourth single-row table,
//! `LogSequence`, backs atomic log-id allocation for the run logger.
//!
//! Every operation opens its own short-lived connection; concurrent access
//! relies on SQLite's file-level locking.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, params};
use tracing::info;

use crate::config::MachineId;
use crate::error::StoreError;

/// One mirrored scheduler job.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ExecutorRow {
    pub name: String,
    pub state: String,
    pub next_run_time: Option<String>,
    pub last_run_time: Option<String>,
    pub last_run_result: Option<String>,
    pub hidden: bool,
    pub command: String,
    pub folder: Option<String>,
    pub machine: String,
}

/// One script discovered inside a launcher.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TaskRow {
    pub script_id: String,
    pub command: String,
    pub script: String,
    pub run_dir: String,
    pub execution_command: String,
    pub machine: String,
}

/// One recorded execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RunRow {
    pub run_id: i64,
    pub script_id: String,
    pub log_file: i64,
    pub start_time: String,
    pub end_time: Option<String>,
    pub records: i64,
    pub result: String,
    pub errors: i64,
    pub warnings: i64,
    pub user: Option<String>,
    pub machine: Option<String>,
}

/// Final values written to a Run row when its execution completes.
#[derive(Debug, Clone)]
pub struct RunCompletion {
    pub end_time: String,
    pub records: i64,
    pub result: String,
    pub errors: i64,
    pub warnings: i64,
    pub user: String,
    pub machine: String,
}

/// First log id ever allocated; log files are named by the decimal id.
pub const LOG_ID_BASE: i64 = 1_000_000;

#[derive(Debug, Clone)]
pub struct LocalStore {
    db_path: PathBuf,
}

impl LocalStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        Connection::open(&self.db_path).map_err(|source| StoreError::Open {
            path: self.db_path.clone(),
            source,
        })
    }

    /// Full bootstrap: Executors and Tasks are dropped and recreated; Runs
    /// and the log-id sequence are created only if absent, so run history
    /// survives a re-initialize.
    pub fn initialize(&self) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute("DROP TABLE IF EXISTS Executors", [])
            .map_err(StoreError::from_sqlite)?;
        conn.execute("DROP TABLE IF EXISTS Tasks", [])
            .map_err(StoreError::from_sqlite)?;
        create_schema(&conn)?;
        info!(db = %self.db_path.display(), "store initialized");
        Ok(())
    }

    /// Create whatever tables are missing. This is the lazy path behind
    /// [`StoreError::SchemaMissing`]; it never touches existing rows.
    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        let conn = self.connect()?;
        create_schema(&conn)
    }

    /// Explicit reset of the run history. The log-id sequence is left
    /// untouched: log ids stay strictly increasing across the store's whole
    /// life.
    pub fn reset_runs(&self) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute("DROP TABLE IF EXISTS Runs", [])
            .map_err(StoreError::from_sqlite)?;
        create_schema(&conn)
    }

    // --- Executors ---

    pub fn delete_executors(&self, machine: &MachineId) -> Result<usize, StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "DELETE FROM Executors WHERE machine = ?1",
            params![machine.as_str()],
        )
        .map_err(StoreError::from_sqlite)
    }

    pub fn insert_executor(&self, row: &ExecutorRow) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO Executors (name, state, next_run_time, last_run_time, \
             last_run_result, hidden, command, folder, machine) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                row.name,
                row.state,
                row.next_run_time,
                row.last_run_time,
                row.last_run_result,
                row.hidden,
                row.command,
                row.folder,
                row.machine,
            ],
        )
        .map_err(StoreError::from_sqlite)?;
        Ok(())
    }

    /// All executor rows for one machine, in insertion order.
    pub fn executors(&self, machine: &MachineId) -> Result<Vec<ExecutorRow>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT name, state, next_run_time, last_run_time, last_run_result, \
                 hidden, command, folder, machine \
                 FROM Executors WHERE machine = ?1 ORDER BY rowid",
            )
            .map_err(StoreError::from_sqlite)?;
        let rows = stmt
            .query_map(params![machine.as_str()], |row| {
                Ok(ExecutorRow {
                    name: row.get(0)?,
                    state: row.get(1)?,
                    next_run_time: row.get(2)?,
                    last_run_time: row.get(3)?,
                    last_run_result: row.get(4)?,
                    hidden: row.get(5)?,
                    command: row.get(6)?,
                    folder: row.get(7)?,
                    machine: row.get(8)?,
                })
            })
            .map_err(StoreError::from_sqlite)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(StoreError::from_sqlite)?);
        }
        Ok(results)
    }

    // --- Tasks ---

    pub fn delete_tasks(&self, machine: &MachineId) -> Result<usize, StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "DELETE FROM Tasks WHERE machine = ?1",
            params![machine.as_str()],
        )
        .map_err(StoreError::from_sqlite)
    }

    pub fn insert_task(&self, row: &TaskRow) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO Tasks (script_id, command, script, run_dir, execution_command, machine) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                row.script_id,
                row.command,
                row.script,
                row.run_dir,
                row.execution_command,
                row.machine,
            ],
        )
        .map_err(StoreError::from_sqlite)?;
        Ok(())
    }

    /// All task rows for one machine, in insertion order.
    pub fn tasks(&self, machine: &MachineId) -> Result<Vec<TaskRow>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT script_id, command, script, run_dir, execution_command, machine \
                 FROM Tasks WHERE machine = ?1 ORDER BY rowid",
            )
            .map_err(StoreError::from_sqlite)?;
        let rows = stmt
            .query_map(params![machine.as_str()], |row| {
                Ok(TaskRow {
                    script_id: row.get(0)?,
                    command: row.get(1)?,
                    script: row.get(2)?,
                    run_dir: row.get(3)?,
                    execution_command: row.get(4)?,
                    machine: row.get(5)?,
                })
            })
            .map_err(StoreError::from_sqlite)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(StoreError::from_sqlite)?);
        }
        Ok(results)
    }

    // --- Runs ---

    /// Insert a fresh Run row: result `running`, end time NULL, counters
    /// zero. Returns the allocated run id.
    pub fn insert_run(
        &self,
        script_id: &str,
        log_file: i64,
        start_time: &str,
    ) -> Result<i64, StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO Runs (script_id, log_file, start_time, end_time, records, \
             result, errors, warnings) \
             VALUES (?1, ?2, ?3, NULL, 0, 'running', 0, 0)",
            params![script_id, log_file, start_time],
        )
        .map_err(StoreError::from_sqlite)?;
        Ok(conn.last_insert_rowid())
    }

    /// Write the final outcome of a run. Called exactly once per row.
    pub fn complete_run(&self, run_id: i64, c: &RunCompletion) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE Runs SET end_time = ?1, records = ?2, result = ?3, errors = ?4, \
             warnings = ?5, user = ?6, machine = ?7 WHERE run_id = ?8",
            params![
                c.end_time, c.records, c.result, c.errors, c.warnings, c.user, c.machine, run_id,
            ],
        )
        .map_err(StoreError::from_sqlite)?;
        Ok(())
    }

    /// The most recently finished run for a script, by end time. Rows still
    /// running (NULL end time) sort last.
    pub fn latest_run(&self, script_id: &str) -> Result<Option<RunRow>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT run_id, script_id, log_file, start_time, end_time, records, \
                 result, errors, warnings, user, machine \
                 FROM Runs WHERE script_id = ?1 ORDER BY end_time DESC LIMIT 1",
            )
            .map_err(StoreError::from_sqlite)?;
        let mut rows = stmt
            .query_map(params![script_id], map_run_row)
            .map_err(StoreError::from_sqlite)?;
        match rows.next() {
            Some(row) => Ok(Some(row.map_err(StoreError::from_sqlite)?)),
            None => Ok(None),
        }
    }

    /// The most recent start time among this script's runs, excluding
    /// `current_run_id` (a logger asking about earlier runs of its own
    /// script).
    pub fn last_run_started(
        &self,
        script_id: &str,
        current_run_id: i64,
    ) -> Result<Option<String>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT start_time FROM Runs WHERE script_id = ?1 AND run_id != ?2 \
                 ORDER BY start_time DESC LIMIT 1",
            )
            .map_err(StoreError::from_sqlite)?;
        let mut rows = stmt
            .query_map(params![script_id, current_run_id], |row| row.get(0))
            .map_err(StoreError::from_sqlite)?;
        match rows.next() {
            Some(row) => Ok(Some(row.map_err(StoreError::from_sqlite)?)),
            None => Ok(None),
        }
    }

    /// All runs recorded for a script, oldest first.
    pub fn runs(&self, script_id: &str) -> Result<Vec<RunRow>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT run_id, script_id, log_file, start_time, end_time, records, \
                 result, errors, warnings, user, machine \
                 FROM Runs WHERE script_id = ?1 ORDER BY run_id",
            )
            .map_err(StoreError::from_sqlite)?;
        let rows = stmt
            .query_map(params![script_id], map_run_row)
            .map_err(StoreError::from_sqlite)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(StoreError::from_sqlite)?);
        }
        Ok(results)
    }

    /// Atomically allocate the next log id. Single statement, so two
    /// processes sharing the file cannot hand out the same id.
    pub fn allocate_log_id(&self) -> Result<i64, StoreError> {
        let conn = self.connect()?;
        conn.query_row(
            "UPDATE LogSequence SET next_id = next_id + 1 WHERE id = 1 \
             RETURNING next_id - 1",
            [],
            |row| row.get(0),
        )
        .map_err(StoreError::from_sqlite)
    }
}

fn map_run_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRow> {
    Ok(RunRow {
        run_id: row.get(0)?,
        script_id: row.get(1)?,
        log_file: row.get(2)?,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
        records: row.get(5)?,
        result: row.get(6)?,
        errors: row.get(7)?,
        warnings: row.get(8)?,
        user: row.get(9)?,
        machine: row.get(10)?,
    })
}

fn create_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS Executors (
            name TEXT NOT NULL,
            state TEXT NOT NULL,
            next_run_time TEXT,
            last_run_time TEXT,
            last_run_result TEXT,
            hidden INTEGER NOT NULL DEFAULT 0,
            command TEXT NOT NULL,
            folder TEXT,
            machine TEXT NOT NULL
        )",
        [],
    )
    .map_err(StoreError::from_sqlite)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS Tasks (
            script_id TEXT NOT NULL,
            command TEXT NOT NULL,
            script TEXT NOT NULL,
            run_dir TEXT NOT NULL DEFAULT '',
            execution_command TEXT NOT NULL,
            machine TEXT NOT NULL
        )",
        [],
    )
    .map_err(StoreError::from_sqlite)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS Runs (
            run_id INTEGER PRIMARY KEY,
            script_id TEXT NOT NULL,
            log_file INTEGER NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT,
            records INTEGER NOT NULL DEFAULT 0,
            result TEXT NOT NULL,
            errors INTEGER NOT NULL DEFAULT 0,
            warnings INTEGER NOT NULL DEFAULT 0,
            user TEXT,
            machine TEXT
        )",
        [],
    )
    .map_err(StoreError::from_sqlite)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS LogSequence (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            next_id INTEGER NOT NULL
        )",
        [],
    )
    .map_err(StoreError::from_sqlite)?;
    conn.execute(
        "INSERT OR IGNORE INTO LogSequence (id, next_id) VALUES (1, ?1)",
        params![LOG_ID_BASE],
    )
    .map_err(StoreError::from_sqlite)?;

    Ok(())
}
