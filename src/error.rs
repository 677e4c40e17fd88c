use std::path::{Path, PathBuf};
use thiserror::Error;

pub type OpsResult<T> = Result<T, OpsError>;

/// Errors surfaced by the cleanup core
#[derive(Error, Debug)]
pub enum OpsError {
    /// Another scan, cleanup or revert is in flight
    #[error("another operation is already running")]
    Busy,

    /// Confirmation arrived with nothing waiting for it
    #[error("no scan result is waiting for confirmation")]
    NoPendingScan,

    /// The cooperative abort flag was observed
    #[error("operation aborted")]
    Aborted,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("trash error: {0}")]
    Trash(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OpsError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        OpsError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Short message for the calling boundary. Details go to the log.
    pub fn user_message(&self) -> String {
        match self {
            OpsError::Busy => "An operation is already in progress".to_string(),
            OpsError::NoPendingScan => "Nothing to confirm, run a scan first".to_string(),
            OpsError::Aborted => "Operation aborted".to_string(),
            OpsError::InvalidConfig(msg) => format!("Invalid settings: {}", msg),
            OpsError::Io { path, source } => match source.kind() {
                std::io::ErrorKind::NotFound => format!("Not found: {}", path.display()),
                std::io::ErrorKind::PermissionDenied => {
                    format!("Permission denied: {}", path.display())
                }
                _ => format!("Could not access {}", path.display()),
            },
            OpsError::Trash(_) => "Could not move item to trash".to_string(),
            OpsError::Persistence(_) | OpsError::Serialization(_) => {
                "Could not save or read the record file".to_string()
            }
        }
    }
}
