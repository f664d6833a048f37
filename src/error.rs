use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by [`crate::store::LocalStore`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database at {path:?}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    /// A statement referenced a table that does not exist yet. Callers that
    /// can bootstrap lazily (the run logger) catch this, run
    /// `ensure_schema`, and retry once.
    #[error("store schema is missing: {0}")]
    SchemaMissing(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// Wrap a rusqlite error, promoting "no such table" to `SchemaMissing`.
    pub(crate) fn from_sqlite(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(_, Some(msg)) = &err
            && msg.starts_with("no such table")
        {
            return StoreError::SchemaMissing(msg.clone());
        }
        StoreError::Sqlite(err)
    }
}

/// Fatal reconciliation failures. Per-launcher parse problems are not here:
/// they are collected in [`crate::reconcile::SyncReport::skipped`] and the
/// batch continues.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("scheduler folder {0:?} not found")]
    FolderNotFound(String),

    #[error("scheduler read failed: {0}")]
    Scheduler(anyhow::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A launcher script that could not be read during reconciliation.
#[derive(Debug, Error)]
#[error("failed to read launcher {path:?}: {source}")]
pub struct ScriptParseError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Failures raised by [`crate::runlog::RunLogger`].
#[derive(Debug, Error)]
pub enum RunLogError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to write run log {path:?}: {source}")]
    Log {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
