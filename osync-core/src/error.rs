use std::path::PathBuf;
use thiserror::Error;

/// Failure kinds surfaced by the library. Backend errors stay opaque and are
/// carried as `anyhow::Error` causes.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("`{}` is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("listing bucket `{bucket}` failed: {source:#}")]
    ListFailed { bucket: String, source: anyhow::Error },

    /// A single command failed after the backend gave up. The first such
    /// failure aborts the remaining plan.
    #[error("{command} failed: {source:#}")]
    TransferFailed {
        command: String,
        source: anyhow::Error,
    },

    #[error("sync aborted")]
    Aborted,

    #[error("flatten would write `{}` more than once", .0.display())]
    PathCollision(PathBuf),

    #[error("invalid bucket path `{0}`")]
    InvalidBucketPath(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
