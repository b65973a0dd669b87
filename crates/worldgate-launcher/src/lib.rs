//! worldgate-launcher: start, probe, and stop versioned runtime units.
//!
//! A *unit* is one running game backend serving one version. The
//! orchestrator only ever talks to the [`Launcher`] trait; the two
//! implementations differ in how a unit is materialized:
//!
//! ```text
//! Launcher
//!   ├── ProcessLauncher    child process, port from a local range,
//!   │                      output appended to logs/game-<key>.log
//!   └── ContainerLauncher  named container on a shared network,
//!                          fixed internal port, liveness via inspect
//! ```
//!
//! `start` failures are fatal and typed ([`LaunchError`]). `is_alive` and
//! `stop` are best-effort: an error talking to the OS or container CLI is
//! reported as "dead" / logged and swallowed, so reconciliation never
//! fails because of a flaky external call.

pub mod container;
pub mod error;
pub mod process;

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use worldgate_core::{LauncherKind, VersionRequest};

pub use container::ContainerLauncher;
pub use error::{LaunchError, LaunchResult};
pub use process::ProcessLauncher;

/// Everything a launcher needs to start one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Version key the unit will be tracked under.
    pub key: String,
    pub commit_sha: String,
    pub game_version: String,
    pub artifact_path: Option<String>,
    pub port: Option<u16>,
    pub runtime_command: Option<String>,
    pub image_tag: Option<String>,
}

/// A started unit. Opaque to the orchestrator apart from status fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitHandle {
    pub key: String,
    /// Process id or short container id.
    pub unit_id: String,
    /// Host name the unit is reachable on.
    pub host: String,
    pub port: u16,
    /// Artifact path or image reference the unit runs.
    pub artifact: String,
    /// Container name, or log file name for processes.
    pub name: String,
}

/// The launch capability the orchestrator is parameterized over.
#[async_trait]
pub trait Launcher: Send + Sync {
    fn kind(&self) -> LauncherKind;

    /// Resolve a request into a launch spec, or `None` when the request
    /// does not name a version this launcher can key on.
    fn resolve(&self, request: &VersionRequest) -> Option<LaunchSpec>;

    /// Start a unit. Returns once the unit has been created; readiness is
    /// checked separately.
    async fn start(&self, spec: &LaunchSpec) -> LaunchResult<UnitHandle>;

    /// Whether the unit is still running. Errors count as dead.
    async fn is_alive(&self, handle: &UnitHandle) -> bool;

    /// Stop and release the unit. Idempotent and best-effort.
    async fn stop(&self, handle: &UnitHandle);

    /// Base address other components use to reach the unit.
    fn base_url(&self, handle: &UnitHandle) -> String {
        format!("http://{}:{}", handle.host, handle.port)
    }
}

static UNSAFE_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9-]").expect("valid name pattern"));

/// Make a version key safe for use in container and file names.
pub fn sanitize_name(key: &str) -> String {
    UNSAFE_NAME_CHARS.replace_all(key, "-").to_lowercase()
}

/// Trim a field and substitute `default` when it is blank.
pub(crate) fn or_default(value: &str, default: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Keep only a non-blank optional override, trimmed.
pub(crate) fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
