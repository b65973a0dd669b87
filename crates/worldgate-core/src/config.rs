//! worldgate.toml configuration parser.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) yields a usable process-launcher configuration. Durations are
//! written as strings: `"30s"`, `"500ms"`, `"2m"`, or a bare number of
//! seconds.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::types::LauncherKind;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldgateConfig {
    pub server: ServerConfig,
    pub orchestrator: OrchestratorConfig,
    pub process: ProcessConfig,
    pub container: ContainerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            data_dir: PathBuf::from("/var/lib/worldgate"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub launcher: LauncherKind,
    /// Deadline for a freshly started unit to pass its readiness check.
    pub health_timeout: String,
    /// Pause between readiness probes.
    pub health_interval: String,
    /// Timeout of a single readiness request.
    pub probe_timeout: String,
    /// Replay previously active worlds on startup.
    pub restore_active_worlds: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            launcher: LauncherKind::Process,
            health_timeout: "30s".to_string(),
            health_interval: "500ms".to_string(),
            probe_timeout: "2s".to_string(),
            restore_active_worlds: true,
        }
    }
}

impl OrchestratorConfig {
    pub fn health_timeout(&self) -> Duration {
        parse_duration(&self.health_timeout).unwrap_or(Duration::from_secs(30))
    }

    pub fn health_interval(&self) -> Duration {
        parse_duration(&self.health_interval).unwrap_or(Duration::from_millis(500))
    }

    pub fn probe_timeout(&self) -> Duration {
        parse_duration(&self.probe_timeout).unwrap_or(Duration::from_secs(2))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Address the spawned units listen on.
    pub host: String,
    pub runtime_command: String,
    /// Arguments placed between the command and the artifact path.
    pub runtime_args: Vec<String>,
    pub artifacts_dir: PathBuf,
    /// File name of a build's artifact; `{commit}` is substituted.
    pub artifact_template: String,
    pub logs_dir: PathBuf,
    pub port_range_start: u16,
    pub port_range_end: u16,
    /// Grace period between SIGTERM and SIGKILL.
    pub stop_timeout: String,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            runtime_command: "java".to_string(),
            runtime_args: vec!["-jar".to_string()],
            artifacts_dir: PathBuf::from("artifacts"),
            artifact_template: "game-app-{commit}.jar".to_string(),
            logs_dir: PathBuf::from("logs"),
            port_range_start: 9001,
            port_range_end: 9999,
            stop_timeout: "5s".to_string(),
        }
    }
}

impl ProcessConfig {
    pub fn stop_timeout(&self) -> Duration {
        parse_duration(&self.stop_timeout).unwrap_or(Duration::from_secs(5))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Container CLI binary.
    pub binary: String,
    pub network: String,
    pub image_prefix: String,
    /// Port the game server listens on inside every container.
    pub internal_port: u16,
    pub run_timeout: String,
    pub inspect_timeout: String,
    pub stop_timeout: String,
    pub datastore: DatastoreConfig,
    /// Extra environment passed to every container.
    pub env: BTreeMap<String, String>,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
            network: "worldgate-net".to_string(),
            image_prefix: "worldgate/game-app".to_string(),
            internal_port: 9001,
            run_timeout: "30s".to_string(),
            inspect_timeout: "5s".to_string(),
            stop_timeout: "15s".to_string(),
            datastore: DatastoreConfig::default(),
            env: BTreeMap::new(),
        }
    }
}

impl ContainerConfig {
    pub fn run_timeout(&self) -> Duration {
        parse_duration(&self.run_timeout).unwrap_or(Duration::from_secs(30))
    }

    pub fn inspect_timeout(&self) -> Duration {
        parse_duration(&self.inspect_timeout).unwrap_or(Duration::from_secs(5))
    }

    pub fn stop_timeout(&self) -> Duration {
        parse_duration(&self.stop_timeout).unwrap_or(Duration::from_secs(15))
    }
}

/// Datastore endpoints injected into containers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatastoreConfig {
    pub db_host: String,
    pub db_port: u16,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    pub redis_host: String,
    pub redis_port: u16,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            db_host: "postgres".to_string(),
            db_port: 5432,
            db_name: "game".to_string(),
            db_user: "game".to_string(),
            db_password: String::new(),
            redis_host: "redis".to_string(),
            redis_port: 6379,
        }
    }
}

impl WorldgateConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.process.port_range_start > self.process.port_range_end {
            return Err(ConfigError::Invalid(format!(
                "process port range is empty: {}..={}",
                self.process.port_range_start, self.process.port_range_end
            )));
        }
        for (field, value) in [
            ("orchestrator.health_timeout", &self.orchestrator.health_timeout),
            ("orchestrator.health_interval", &self.orchestrator.health_interval),
            ("orchestrator.probe_timeout", &self.orchestrator.probe_timeout),
            ("process.stop_timeout", &self.process.stop_timeout),
            ("container.run_timeout", &self.container.run_timeout),
            ("container.inspect_timeout", &self.container.inspect_timeout),
            ("container.stop_timeout", &self.container.stop_timeout),
        ] {
            if parse_duration(value).is_none() {
                return Err(ConfigError::Invalid(format!("{field}: bad duration {value:?}")));
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for WorldgateConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: WorldgateConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: WorldgateConfig = "".parse().unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.orchestrator.launcher, LauncherKind::Process);
        assert_eq!(config.orchestrator.health_timeout(), Duration::from_secs(30));
        assert_eq!(config.orchestrator.health_interval(), Duration::from_millis(500));
        assert!(config.orchestrator.restore_active_worlds);
        assert_eq!(config.process.port_range_start, 9001);
        assert_eq!(config.container.internal_port, 9001);
    }

    #[test]
    fn parses_container_section() {
        let toml_str = r#"
[orchestrator]
launcher = "container"
health_timeout = "45s"

[container]
network = "games"
image_prefix = "registry.local/game"

[container.datastore]
db_host = "db.internal"
db_password = "s3cret"

[container.env]
JAVA_OPTS = "-Xmx1g"
"#;
        let config: WorldgateConfig = toml_str.parse().unwrap();
        assert_eq!(config.orchestrator.launcher, LauncherKind::Container);
        assert_eq!(config.orchestrator.health_timeout(), Duration::from_secs(45));
        assert_eq!(config.container.network, "games");
        assert_eq!(config.container.datastore.db_host, "db.internal");
        assert_eq!(config.container.datastore.db_port, 5432);
        assert_eq!(config.container.env.get("JAVA_OPTS").map(String::as_str), Some("-Xmx1g"));
    }

    #[test]
    fn rejects_inverted_port_range() {
        let toml_str = r#"
[process]
port_range_start = 9500
port_range_end = 9400
"#;
        let err = toml_str.parse::<WorldgateConfig>().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_bad_duration() {
        let toml_str = r#"
[orchestrator]
probe_timeout = "soon"
"#;
        assert!(toml_str.parse::<WorldgateConfig>().is_err());
    }

    #[test]
    fn load_or_default_without_file() {
        let config = WorldgateConfig::load_or_default(Path::new("/nonexistent/worldgate.toml")).unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn parse_duration_forms() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("fast"), None);
    }
}
