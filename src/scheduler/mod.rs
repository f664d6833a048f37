//! Boundary to the external scheduler and the snapshot built from it.
//!
//! The scheduler's native API is not reimplemented here. [`TaskService`]
//! stands in for it; [`snapshot`] walks the folder tree through that trait
//! and turns raw task records into typed [`TaskDescriptor`]s, decoding state
//! and last-result codes along the way.

mod codes;

use std::collections::VecDeque;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::warn;

use crate::error::SyncError;

pub use codes::{ExecutorState, result_message};

/// One task exactly as the external scheduler reports it: raw codes, raw
/// definition blob.
#[derive(Debug, Clone)]
pub struct RawTask {
    /// Full path inside the scheduler tree, e.g. `\Automation\Nightly ETL`.
    pub path: String,
    pub state: i64,
    pub hidden: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub last_result: i64,
    /// Definition blob; the launch command is embedded as `<Command>…</Command>`.
    pub definition: String,
}

/// Read-only view of the external scheduler. Implementations wrap whatever
/// native API is available; tests substitute an in-memory tree.
pub trait TaskService {
    fn folder_exists(&self, path: &str) -> anyhow::Result<bool>;

    /// Immediate subfolders of `path`.
    fn subfolders(&self, path: &str) -> anyhow::Result<Vec<String>>;

    /// Tasks registered directly in `path`, hidden entries included.
    fn tasks(&self, path: &str) -> anyhow::Result<Vec<RawTask>>;
}

/// A snapshot entry: one scheduler task with its codes decoded and its
/// launch command extracted.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDescriptor {
    pub name: String,
    pub folder: String,
    pub state: ExecutorState,
    pub hidden: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    /// Mapped last-result message, or the raw code as a decimal string.
    pub last_result: String,
    /// The literal command string embedded in the task definition.
    pub command: String,
}

/// Walk the scheduler folder tree breadth-first from `root` and describe
/// every task found. A missing root is fatal: the caller must not have
/// touched the store yet.
pub fn snapshot(service: &dyn TaskService, root: &str) -> Result<Vec<TaskDescriptor>, SyncError> {
    if !service
        .folder_exists(root)
        .map_err(SyncError::Scheduler)?
    {
        return Err(SyncError::FolderNotFound(root.to_string()));
    }

    let mut descriptors = Vec::new();
    let mut pending = VecDeque::from([root.to_string()]);
    while let Some(folder) = pending.pop_front() {
        pending.extend(service.subfolders(&folder).map_err(SyncError::Scheduler)?);
        for raw in service.tasks(&folder).map_err(SyncError::Scheduler)? {
            descriptors.push(describe(raw));
        }
    }
    Ok(descriptors)
}

fn describe(raw: RawTask) -> TaskDescriptor {
    let (folder, name) = split_task_path(&raw.path);
    let command = embedded_command(&raw.definition).unwrap_or_else(|| {
        warn!(task = %raw.path, "task definition has no embedded command");
        String::new()
    });
    TaskDescriptor {
        name,
        folder,
        state: ExecutorState::from_code(raw.state),
        hidden: raw.hidden,
        last_run: raw.last_run,
        next_run: raw.next_run,
        last_result: result_message(raw.last_result),
        command,
    }
}

/// Split a scheduler task path into (containing folder, task name).
fn split_task_path(path: &str) -> (String, String) {
    match path.rfind(['\\', '/']) {
        Some(idx) => (path[..idx].to_string(), path[idx + 1..].to_string()),
        None => (String::new(), path.to_string()),
    }
}

fn embedded_command(definition: &str) -> Option<String> {
    static COMMAND: OnceLock<Regex> = OnceLock::new();
    let re = COMMAND.get_or_init(|| {
        Regex::new(r"<Command>(.*?)</Command>").expect("command pattern is valid")
    });
    re.captures(definition)
        .map(|caps| caps[1].to_string())
}
