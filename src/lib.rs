//! Mirror of an external job scheduler in a local SQLite store, plus
//! run-lifecycle tracking for the scripts it launches.
//!
//! Two subsystems do the real work:
//!
//! - [`Reconciler`] rebuilds one machine's `Executors` and `Tasks` rows from
//!   a live scheduler snapshot (taken through the [`TaskService`] boundary)
//!   and synthesizes executors for trigger-chain launchers.
//! - [`RunLogger`] gives one script execution a log file, severity counters,
//!   and a Run row that is finalized exactly once.
//!
//! Presentation, CLI parsing, and the scheduler's native API live outside
//! this crate; they consume the tables and the [`TaskService`] trait.

mod config;
mod error;
mod parser;
mod reconcile;
mod runlog;
mod scheduler;
mod store;
mod timefmt;

pub use config::{AutomationConfig, MachineId};
pub use error::{RunLogError, ScriptParseError, StoreError, SyncError};
pub use parser::{ScriptParser, TaskCandidate};
pub use reconcile::{Reconciler, SkippedLauncher, SyncReport};
pub use runlog::{ProgressReporter, RunLogger, RunOutcome};
pub use scheduler::{
    ExecutorState, RawTask, TaskDescriptor, TaskService, result_message, snapshot,
};
pub use store::{ExecutorRow, LOG_ID_BASE, LocalStore, RunCompletion, RunRow, TaskRow};
