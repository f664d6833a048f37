//! Per-machine reconciliation of the local mirror against live scheduler
//! state.
//!
//! A sync replaces every Executors and Tasks row tagged to one machine with
//! rows rebuilt from a fresh snapshot, then synthesizes executors for
//! launchers that are only reachable through another script's trigger chain.

use std::collections::HashSet;
use std::path::Path;

use tracing::{info, warn};

use crate::config::MachineId;
use crate::error::{StoreError, SyncError};
use crate::parser::ScriptParser;
use crate::scheduler::{ExecutorState, TaskDescriptor, TaskService, snapshot};
use crate::store::{ExecutorRow, LocalStore, TaskRow};
use crate::timefmt::format_timestamp;

/// A launcher whose parse failed. The batch continues without it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLauncher {
    pub command: String,
    pub reason: String,
}

/// Structured outcome of one sync: what was written and what was skipped,
/// so callers can tell a partial success from an aborted one.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub executors: usize,
    pub tasks: usize,
    pub synthesized: usize,
    pub skipped: Vec<SkippedLauncher>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Rebuilds one machine's Executors and Tasks rows from scheduler state.
pub struct Reconciler {
    store: LocalStore,
    parser: ScriptParser,
    scheduler_folder: String,
    machine: MachineId,
}

impl Reconciler {
    pub fn new(
        store: LocalStore,
        scheduler_folder: impl Into<String>,
        machine: MachineId,
    ) -> Self {
        Self {
            store,
            parser: ScriptParser::default(),
            scheduler_folder: scheduler_folder.into(),
            machine,
        }
    }

    /// Use a non-default launcher parser (e.g. a different interpreter).
    pub fn with_parser(mut self, parser: ScriptParser) -> Self {
        self.parser = parser;
        self
    }

    /// Run one full reconciliation pass.
    ///
    /// The snapshot is taken before anything is deleted, so a fatal
    /// scheduler failure leaves the store untouched. Idempotent: unchanged
    /// external state produces identical rows.
    pub fn sync(&self, service: &dyn TaskService) -> Result<SyncReport, SyncError> {
        let descriptors = snapshot(service, &self.scheduler_folder)?;
        self.store.ensure_schema()?;

        let mut report = SyncReport::default();

        self.store.delete_executors(&self.machine)?;
        for descriptor in &descriptors {
            self.store.insert_executor(&executor_row(descriptor, &self.machine))?;
            report.executors += 1;
        }

        self.store.delete_tasks(&self.machine)?;
        for descriptor in &descriptors {
            match self.parser.parse_file(Path::new(&descriptor.command)) {
                Ok(candidates) => {
                    for candidate in candidates {
                        self.store.insert_task(&TaskRow {
                            script_id: candidate.script_id,
                            command: candidate.command,
                            script: candidate.script,
                            run_dir: candidate.run_dir,
                            execution_command: candidate.execution_command,
                            machine: self.machine.as_str().to_string(),
                        })?;
                        report.tasks += 1;
                    }
                }
                Err(err) => {
                    warn!(launcher = %descriptor.command, error = %err, "skipping launcher");
                    report.skipped.push(SkippedLauncher {
                        command: descriptor.command.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        report.synthesized = self.synthesize_trigger_chain()?;

        info!(
            machine = %self.machine,
            executors = report.executors,
            tasks = report.tasks,
            synthesized = report.synthesized,
            skipped = report.skipped.len(),
            "sync finished",
        );
        Ok(report)
    }

    /// Add executor rows for launchers that appear as a task's parent but
    /// were never directly registered in the scheduler. Their last-run
    /// fields come from the most recent Run row of the underlying script;
    /// the next-run time is inherited from the executor that owns the
    /// launcher's own task row, when such a chain exists.
    fn synthesize_trigger_chain(&self) -> Result<usize, StoreError> {
        let tasks = self.store.tasks(&self.machine)?;
        let executors = self.store.executors(&self.machine)?;
        let registered: HashSet<&str> = executors.iter().map(|e| e.command.as_str()).collect();

        let mut seen = HashSet::new();
        let mut synthesized = 0;
        for task in &tasks {
            let target = task.command.as_str();
            if registered.contains(target) || !seen.insert(target.to_string()) {
                continue;
            }

            let latest = self.store.latest_run(target)?;
            let next_run_time = tasks
                .iter()
                .find(|t| t.script_id == target)
                .and_then(|t| executors.iter().find(|e| e.command == t.command))
                .and_then(|e| e.next_run_time.clone());

            self.store.insert_executor(&ExecutorRow {
                name: target.to_string(),
                state: ExecutorState::Ready.to_string(),
                next_run_time,
                last_run_time: latest.as_ref().and_then(|run| run.end_time.clone()),
                last_run_result: latest.map(|run| run.result),
                hidden: false,
                command: target.to_string(),
                folder: None,
                machine: self.machine.as_str().to_string(),
            })?;
            synthesized += 1;
        }
        Ok(synthesized)
    }
}

fn executor_row(descriptor: &TaskDescriptor, machine: &MachineId) -> ExecutorRow {
    ExecutorRow {
        name: descriptor.name.clone(),
        state: descriptor.state.to_string(),
        next_run_time: descriptor.next_run.map(format_timestamp),
        last_run_time: descriptor.last_run.map(format_timestamp),
        last_run_result: Some(descriptor.last_result.clone()),
        hidden: descriptor.hidden,
        command: descriptor.command.clone(),
        folder: Some(descriptor.folder.clone()),
        machine: machine.as_str().to_string(),
    }
}
