//! Bounded readiness wait for a freshly started unit.

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use worldgate_launcher::{Launcher, UnitHandle};

use crate::checker::{ProbeResult, http_probe};

/// Path every managed unit must serve for readiness.
pub const HEALTH_PATH: &str = "/internal/health";

/// Why a unit never became ready.
#[derive(Debug, Error)]
pub enum HealthError {
    #[error("unit at {base_url} exited before becoming healthy")]
    UnitExited { base_url: String },

    #[error("unit at {base_url} not healthy after {timeout:?} ({last})")]
    Timeout {
        base_url: String,
        timeout: Duration,
        last: String,
    },
}

impl HealthError {
    /// True when the prober already stopped the unit.
    pub fn unit_stopped(&self) -> bool {
        matches!(self, HealthError::Timeout { .. })
    }
}

/// Polls a unit's health endpoint until it is ready, dies, or the
/// deadline passes.
#[derive(Debug, Clone)]
pub struct HealthProber {
    /// Overall deadline for the unit to become ready.
    timeout: Duration,
    /// Pause between probes.
    interval: Duration,
    /// Timeout of one probe request.
    probe_timeout: Duration,
}

impl HealthProber {
    pub fn new(timeout: Duration, interval: Duration, probe_timeout: Duration) -> Self {
        Self {
            timeout,
            interval,
            probe_timeout,
        }
    }

    /// Wait for `handle` to pass its readiness check.
    ///
    /// On timeout the unit is stopped through `launcher` before the error
    /// is returned.
    pub async fn wait_until_ready(
        &self,
        launcher: &dyn Launcher,
        handle: &UnitHandle,
    ) -> Result<(), HealthError> {
        let base_url = launcher.base_url(handle);
        let url = format!("{}{HEALTH_PATH}", base_url.trim_end_matches('/'));
        let deadline = Instant::now() + self.timeout;
        let mut last: Option<&'static str> = None;
        let mut attempts = 0u32;

        while Instant::now() < deadline {
            if !launcher.is_alive(handle).await {
                warn!(version = %handle.key, %base_url, "unit exited before health check passed");
                return Err(HealthError::UnitExited { base_url });
            }

            attempts += 1;
            match http_probe(&url, self.probe_timeout).await {
                ProbeResult::Healthy => {
                    info!(version = %handle.key, %base_url, attempts, "unit is healthy");
                    return Ok(());
                }
                ProbeResult::Unhealthy => last = Some("health endpoint returned non-2xx"),
                ProbeResult::Failed => last = Some("health endpoint not ready"),
            }
            debug!(version = %handle.key, attempts, "unit not ready yet");

            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(self.interval.min(remaining)).await;
        }

        warn!(version = %handle.key, %base_url, timeout = ?self.timeout, "health check timed out, stopping unit");
        launcher.stop(handle).await;
        Err(HealthError::Timeout {
            base_url,
            timeout: self.timeout,
            last: last.unwrap_or("unknown").to_string(),
        })
    }
}

impl Default for HealthProber {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(30),
            Duration::from_millis(500),
            Duration::from_secs(2),
        )
    }
}
