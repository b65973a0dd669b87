//! Domain types shared across worldgate crates.

use serde::{Deserialize, Serialize};

/// Identifier of a game world (shard).
pub type WorldId = i64;

/// Which launch mechanism backs the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LauncherKind {
    /// Child processes on the local host.
    #[default]
    Process,
    /// Named containers on a shared network.
    Container,
}

impl LauncherKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LauncherKind::Process => "process",
            LauncherKind::Container => "container",
        }
    }
}

impl std::fmt::Display for LauncherKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LauncherKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "process" => Ok(LauncherKind::Process),
            "container" | "docker" => Ok(LauncherKind::Container),
            other => Err(format!("unknown launcher kind: {other}")),
        }
    }
}

/// A request to serve (or pre-warm) a specific build.
///
/// Only `commit_sha` and `game_version` take part in version-key
/// resolution; the remaining fields are per-launch overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRequest {
    #[serde(default)]
    pub commit_sha: String,
    #[serde(default)]
    pub game_version: String,
    /// Explicit runtime artifact (process launcher).
    #[serde(default, alias = "jarPath", skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,
    /// Explicit listen port (process launcher).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Runtime entrypoint override (process launcher).
    #[serde(default, alias = "javaCommand", skip_serializing_if = "Option::is_none")]
    pub runtime_command: Option<String>,
    /// Image reference override (container launcher).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_tag: Option<String>,
}

impl VersionRequest {
    pub fn new(commit_sha: impl Into<String>, game_version: impl Into<String>) -> Self {
        Self {
            commit_sha: commit_sha.into(),
            game_version: game_version.into(),
            ..Self::default()
        }
    }
}

/// Point-in-time snapshot of one live instance, as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatus {
    /// Version key the instance is tracked under.
    pub version_key: String,
    pub commit_sha: String,
    pub game_version: String,
    /// Runtime artifact path or image reference.
    pub artifact: String,
    /// Assigned worlds, ascending.
    pub world_ids: Vec<WorldId>,
    pub alive: bool,
    /// Process id or container id.
    pub unit_id: String,
    pub base_url: String,
    pub port: u16,
    pub launcher: LauncherKind,
    /// Unix timestamp (seconds) when the unit became ready.
    pub started_at: u64,
}

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
