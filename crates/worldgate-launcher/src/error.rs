//! Launcher error types.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for launcher operations.
pub type LaunchResult<T> = Result<T, LaunchError>;

/// Errors that prevent a unit from being started.
///
/// Liveness and stop calls never produce these; they are best-effort.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("runtime artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("no available port in range {start}..={end}")]
    NoFreePort { start: u16, end: u16 },

    #[error("failed to prepare unit: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed (exit code {code:?}): {output}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("`{command}` timed out after {timeout:?}")]
    CommandTimeout { command: String, timeout: Duration },
}

impl LaunchError {
    /// Whether the failure stems from the request itself rather than the
    /// launch environment.
    pub fn is_request_error(&self) -> bool {
        matches!(self, LaunchError::ArtifactNotFound(_))
    }
}
