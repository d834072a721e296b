//! Error types

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::buffer::BufferId;

/// Errors raised by the status backend and the buffer registry.
///
/// The coordinator itself never returns these to callers: status failures
/// degrade to "unknown" and revert failures are isolated per buffer.
#[derive(Debug, Error)]
pub enum TetherError {
    /// A batch or per-file status query failed
    #[error("Status query failed: {0}")]
    StatusQuery(String),

    /// Path is not inside a Git working tree
    #[error("Not a repository: {}", .0.display())]
    NotARepository(PathBuf),

    /// A git command failed or could not be started
    #[error("git {args} failed: {stderr}")]
    Git {
        /// Arguments passed to git, space separated
        args: String,
        /// Trimmed standard error, or the spawn failure
        stderr: String,
    },

    /// A git invocation exceeded its timeout
    #[error("git {args} timed out after {timeout:?}")]
    GitTimeout {
        /// Arguments passed to git, space separated
        args: String,
        /// Configured limit
        timeout: Duration,
    },

    /// No open buffer with this id
    #[error("Buffer not found: {0}")]
    BufferNotFound(BufferId),

    /// Reloading a buffer from disk failed
    #[error("Failed to revert {}: {source}", path.display())]
    Revert {
        /// File the buffer visits
        path: PathBuf,
        /// Underlying I/O failure
        source: std::io::Error,
    },

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
