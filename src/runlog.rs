//! Per-execution run tracking.
//!
//! A [`RunLogger`] is created at the top of a script's execution and lives
//! for exactly one run: it allocates a log id, opens the backing log file,
//! inserts the Run row, accumulates severity counters while the script
//! works, and writes the final outcome once on [`RunLogger::complete`].
//! Completion consumes the logger, so a finished run cannot be mutated.

use std::cmp;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::{AutomationConfig, MachineId};
use crate::error::{RunLogError, StoreError};
use crate::store::{LocalStore, RunCompletion};
use crate::timefmt::{format_timestamp, now_stamp};

/// Final classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Running,
    Success,
    Warning,
    Error,
    Critical,
    NoRecords,
}

impl RunOutcome {
    /// Strict priority: criticals beat errors beat warnings; a quiet run
    /// with nothing processed is "no records".
    pub fn classify(criticals: i64, errors: i64, warnings: i64, records: i64) -> Self {
        if criticals > 0 {
            RunOutcome::Critical
        } else if errors > 0 {
            RunOutcome::Error
        } else if warnings > 0 {
            RunOutcome::Warning
        } else if records == 0 {
            RunOutcome::NoRecords
        } else {
            RunOutcome::Success
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Running => "running",
            RunOutcome::Success => "success",
            RunOutcome::Warning => "warning",
            RunOutcome::Error => "error",
            RunOutcome::Critical => "critical",
            RunOutcome::NoRecords => "no records",
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run-lifecycle logger for one script execution.
pub struct RunLogger {
    store: LocalStore,
    script_id: String,
    machine: MachineId,
    user: String,
    run_id: i64,
    log_id: i64,
    log_path: PathBuf,
    start_time: DateTime<Utc>,
    records: i64,
    errors: i64,
    warnings: i64,
    criticals: i64,
}

impl RunLogger {
    /// Open a run: allocate the next log id, write the start marker to the
    /// log file, and insert the Run row (result `running`, end time NULL).
    ///
    /// If the store schema is missing, it is created lazily and the failed
    /// statement retried once; the retry is per-statement so an allocated
    /// log id is never abandoned.
    pub fn begin(
        config: &AutomationConfig,
        machine: MachineId,
        script_id: impl Into<String>,
    ) -> Result<Self, RunLogError> {
        let script_id = script_id.into();
        let store = LocalStore::new(config.db_path());

        let logs_dir = config.logs_dir();
        fs::create_dir_all(&logs_dir).map_err(|source| RunLogError::Log {
            path: logs_dir.clone(),
            source,
        })?;

        let start_time = Utc::now();
        let log_id = with_schema_retry(&store, |s| s.allocate_log_id())?;
        let log_path = logs_dir.join(log_id.to_string());

        let logger = Self {
            store,
            script_id,
            machine,
            user: whoami::username(),
            run_id: 0,
            log_id,
            log_path,
            start_time,
            records: 0,
            errors: 0,
            warnings: 0,
            criticals: 0,
        };
        logger.append_line("INFO", &format!("starting execution for {}", logger.script_id))?;

        let run_id = with_schema_retry(&logger.store, |s| {
            s.insert_run(
                &logger.script_id,
                logger.log_id,
                &format_timestamp(logger.start_time),
            )
        })?;
        Ok(Self { run_id, ..logger })
    }

    pub fn script_id(&self) -> &str {
        &self.script_id
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    pub fn log_id(&self) -> i64 {
        self.log_id
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn records(&self) -> i64 {
        self.records
    }

    /// Count `n` processed records without going through a progress
    /// reporter.
    pub fn add_records(&mut self, n: i64) {
        self.records += n;
    }

    pub fn info(&self, message: &str) -> Result<(), RunLogError> {
        self.append_line("INFO", message)
    }

    pub fn warning(&mut self, message: &str) -> Result<(), RunLogError> {
        self.warnings += 1;
        self.append_line("WARNING", message)
    }

    pub fn error(&mut self, message: &str) -> Result<(), RunLogError> {
        self.errors += 1;
        self.append_line("ERROR", message)
    }

    pub fn critical(&mut self, message: &str) -> Result<(), RunLogError> {
        self.criticals += 1;
        self.append_line("CRITICAL", message)
    }

    /// Start time of this script's most recent earlier run, if any.
    pub fn last_run(&self) -> Result<Option<String>, RunLogError> {
        Ok(self.store.last_run_started(&self.script_id, self.run_id)?)
    }

    /// A progress reporter over `total` upcoming work items. The caller's
    /// own loop calls [`ProgressReporter::advance`]; each advance counts
    /// records (unless disabled) and redraws the bar on the log file's
    /// trailing line.
    pub fn progress(&mut self, total: usize) -> ProgressReporter<'_> {
        ProgressReporter {
            logger: self,
            total,
            done: 0,
            count_records: true,
        }
    }

    /// Close the run: classify the outcome, write the completion marker,
    /// and update the Run row by primary key. Consumes the logger; the
    /// completed state is terminal.
    pub fn complete(self) -> Result<RunOutcome, RunLogError> {
        self.append_line(
            "INFO",
            &format!("execution for {} completed.", self.script_id),
        )?;
        let outcome =
            RunOutcome::classify(self.criticals, self.errors, self.warnings, self.records);
        self.store.complete_run(
            self.run_id,
            &RunCompletion {
                end_time: now_stamp(),
                records: self.records,
                result: outcome.as_str().to_string(),
                errors: self.errors,
                warnings: self.warnings,
                user: self.user.clone(),
                machine: self.machine.to_string(),
            },
        )?;
        Ok(outcome)
    }

    fn append_line(&self, level: &str, message: &str) -> Result<(), RunLogError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|source| self.log_err(source))?;
        writeln!(file, "{level}:{} - {message}", now_stamp()).map_err(|source| self.log_err(source))
    }

    fn log_err(&self, source: std::io::Error) -> RunLogError {
        RunLogError::Log {
            path: self.log_path.clone(),
            source,
        }
    }
}

/// Retry `op` once after lazily creating the schema, if and only if it
/// failed because a table was missing.
fn with_schema_retry<T>(
    store: &LocalStore,
    op: impl Fn(&LocalStore) -> Result<T, StoreError>,
) -> Result<T, RunLogError> {
    match op(store) {
        Err(StoreError::SchemaMissing(_)) => {
            store.ensure_schema()?;
            Ok(op(store)?)
        }
        other => Ok(other?),
    }
}

const BAR_WIDTH: usize = 10;
const PROGRESS_PREFIX: &str = "+PROGRESS";

/// Caller-driven progress over a known amount of work.
///
/// Redrawing rereads and rewrites the log file tail on every advance, so
/// this is only suitable for small iteration counts.
pub struct ProgressReporter<'a> {
    logger: &'a mut RunLogger,
    total: usize,
    done: usize,
    count_records: bool,
}

impl ProgressReporter<'_> {
    /// Disable record counting; the bar still draws.
    pub fn without_records(mut self) -> Self {
        self.count_records = false;
        self
    }

    pub fn done(&self) -> usize {
        self.done
    }

    /// Mark `n` items finished, redraw the trailing bar line, and (unless
    /// disabled) add `n` to the run's records counter.
    pub fn advance(&mut self, n: usize) -> Result<(), RunLogError> {
        if self.total == 0 {
            return Ok(());
        }
        self.done = cmp::min(self.done + n, self.total);
        if self.count_records {
            self.logger.records += n as i64;
        }

        let filled = self.done * BAR_WIDTH / self.total;
        let percent = self.done as f64 / self.total as f64 * 100.0;
        let bar = format!(
            "{PROGRESS_PREFIX} |{}{}| {percent:.1}%",
            "-".repeat(filled),
            " ".repeat(BAR_WIDTH - filled),
        );
        self.redraw_tail(&bar)
    }

    /// Terminate the bar line so later log lines start fresh.
    pub fn finish(self) -> Result<(), RunLogError> {
        let path = self.logger.log_path.clone();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| self.logger.log_err(source))?;
        file.write_all(b"\n")
            .map_err(|source| self.logger.log_err(source))
    }

    /// Replace the trailing progress line, or append one if the log does
    /// not end with a bar yet.
    fn redraw_tail(&self, bar: &str) -> Result<(), RunLogError> {
        let path = &self.logger.log_path;
        let mut contents =
            fs::read_to_string(path).map_err(|source| self.logger.log_err(source))?;
        match contents.rfind('\n') {
            Some(idx) if contents[idx + 1..].starts_with(PROGRESS_PREFIX) => {
                contents.truncate(idx + 1);
            }
            None if contents.starts_with(PROGRESS_PREFIX) => contents.clear(),
            _ => {}
        }
        contents.push_str(bar);
        fs::write(path, contents).map_err(|source| self.logger.log_err(source))
    }
}
