//! worldgate-health: readiness checking for freshly started units.
//!
//! A unit is ready once `GET {base_url}/internal/health` answers 2xx.
//! [`HealthProber::wait_until_ready`] is the only retry loop in worldgate:
//! it polls at a fixed interval and always terminates, with success, with
//! [`HealthError::UnitExited`] as soon as the launcher reports the unit
//! dead, or with [`HealthError::Timeout`] once the deadline passes (in
//! which case the unit is force-stopped first).

pub mod checker;
pub mod prober;

pub use checker::{ProbeResult, http_probe};
pub use prober::{HEALTH_PATH, HealthError, HealthProber};
