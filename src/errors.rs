use std::process::ExitStatus;

use thiserror::Error;

/// Failure kinds surfaced by the backup pipeline.
///
/// Stage functions propagate these through `anyhow` so callers keep the
/// full context chain; the variants exist for the cases the HTTP layer and
/// the scheduler need to tell apart.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{program} exited with {status}: {stderr}")]
    Command {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Object store error: {0}")]
    ObjectStore(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("a backup run is already in progress")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, BackupError>;
