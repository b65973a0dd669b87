//! Orchestrator error types.

use thiserror::Error;

use worldgate_health::HealthError;
use worldgate_launcher::LaunchError;

/// Errors surfaced by orchestrator operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid version request: {0}")]
    Validation(String),

    #[error("launch failed: {0}")]
    Launch(#[from] LaunchError),

    #[error("health check failed: {0}")]
    Health(#[from] HealthError),
}

impl OrchestratorError {
    /// Whether the caller sent a request that can never succeed as-is.
    pub fn is_validation(&self) -> bool {
        match self {
            OrchestratorError::Validation(_) => true,
            OrchestratorError::Launch(e) => e.is_request_error(),
            OrchestratorError::Health(_) => false,
        }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
