//! Fixed code tables published by the external scheduler.

use std::fmt;

/// Scheduler job state, decoded from the raw state code. Codes outside the
/// published table pass through numerically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorState {
    Unknown,
    Disabled,
    Queued,
    Ready,
    Running,
    Other(i64),
}

impl ExecutorState {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => ExecutorState::Unknown,
            1 => ExecutorState::Disabled,
            2 => ExecutorState::Queued,
            3 => ExecutorState::Ready,
            4 => ExecutorState::Running,
            other => ExecutorState::Other(other),
        }
    }
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorState::Unknown => f.write_str("Unknown"),
            ExecutorState::Disabled => f.write_str("Disabled"),
            ExecutorState::Queued => f.write_str("Queued"),
            ExecutorState::Ready => f.write_str("Ready"),
            ExecutorState::Running => f.write_str("Running"),
            ExecutorState::Other(code) => write!(f, "{code}"),
        }
    }
}

/// Map a last-run result code to its message. Unmapped codes render as their
/// decimal value rather than failing.
pub fn result_message(code: i64) -> String {
    let message = match code {
        0 => "The operation completed successfully.",
        1 => "",
        10 => "The environment is incorrect.",
        267008 => "Task is ready to run at its next scheduled time.",
        267009 => "Task is currently running.",
        267010 => {
            "The task will not run at the scheduled times because it has been disabled."
        }
        267011 => "Task has not yet run.",
        267012 => "There are no more runs scheduled for this task.",
        267013 => {
            "One or more of the properties that are needed to run this task on a schedule \
             have not been set."
        }
        267014 => "The last run of the task was terminated by the user.",
        267015 => {
            "Either the task has no triggers or the existing triggers are disabled or not set."
        }
        2147750671 => "Credentials became corrupted.",
        2147750687 => "An instance of this task is already running.",
        2147943645 => {
            "The service is not available (is \"Run only when an user is logged on\" checked?)."
        }
        3221225786 => "The application terminated as a result of a CTRL+C.",
        3228369022 => "Unknown software exception.",
        -2147020576 => "The operator or administrator has refused the request.",
        other => return other.to_string(),
    };
    message.to_string()
}
