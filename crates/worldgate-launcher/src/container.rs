//! Container launcher: one named container per version.
//!
//! Drives the container CLI (`docker` by default) as a subprocess. Every
//! call is bounded by a timeout; a timed-out CLI process is killed.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use worldgate_core::config::ContainerConfig;
use worldgate_core::{LauncherKind, VersionRequest};

use crate::error::{LaunchError, LaunchResult};
use crate::{LaunchSpec, Launcher, UnitHandle, non_blank, or_default, sanitize_name};

/// Captured result of one CLI invocation.
#[derive(Debug)]
struct CliOutput {
    success: bool,
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl CliOutput {
    fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
            (false, true) => self.stdout.clone(),
            _ => self.stderr.clone(),
        }
    }
}

/// Launches game backends as containers on a shared network.
pub struct ContainerLauncher {
    config: ContainerConfig,
}

impl ContainerLauncher {
    pub fn new(config: ContainerConfig) -> Self {
        Self { config }
    }

    /// Container name for a version key.
    pub fn container_name(key: &str) -> String {
        format!("game-{}", sanitize_name(key))
    }

    fn image_for(&self, spec: &LaunchSpec) -> String {
        spec.image_tag
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.config.image_prefix, spec.key))
    }

    /// Arguments for `docker run`.
    fn run_args(&self, spec: &LaunchSpec, name: &str, image: &str) -> Vec<String> {
        let store = &self.config.datastore;
        let mut env = vec![
            ("SERVER_PORT".to_string(), self.config.internal_port.to_string()),
            ("GAME_COMMIT_SHA".to_string(), spec.commit_sha.clone()),
            ("GAME_VERSION".to_string(), spec.game_version.clone()),
            ("DB_HOST".to_string(), store.db_host.clone()),
            ("DB_PORT".to_string(), store.db_port.to_string()),
            ("DB_NAME".to_string(), store.db_name.clone()),
            ("DB_USER".to_string(), store.db_user.clone()),
            ("DB_PASSWORD".to_string(), store.db_password.clone()),
            ("REDIS_HOST".to_string(), store.redis_host.clone()),
            ("REDIS_PORT".to_string(), store.redis_port.to_string()),
        ];
        env.extend(self.config.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            name.to_string(),
            "--network".to_string(),
            self.config.network.clone(),
        ];
        for (key, value) in env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(image.to_string());
        args
    }

    async fn cli(&self, args: &[&str], timeout: Duration) -> LaunchResult<CliOutput> {
        let command = format!("{} {}", self.config.binary, args.first().unwrap_or(&""));
        let child = Command::new(&self.config.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                command: command.clone(),
                source,
            })?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(CliOutput {
                success: output.status.success(),
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
            Ok(Err(source)) => Err(LaunchError::Spawn { command, source }),
            Err(_) => Err(LaunchError::CommandTimeout { command, timeout }),
        }
    }

    /// `docker rm -f <name>`, ignoring failures.
    async fn remove(&self, name: &str) {
        match self.cli(&["rm", "-f", name], self.config.stop_timeout()).await {
            Ok(out) if !out.success => {
                debug!(container = %name, output = %out.combined(), "container remove reported failure");
            }
            Err(e) => debug!(container = %name, error = %e, "container remove failed"),
            Ok(_) => {}
        }
    }
}

/// The container id is the first 12 characters of the last line printed
/// by `docker run -d`.
fn parse_container_id(stdout: &str) -> Option<String> {
    let line = stdout.lines().map(str::trim).rfind(|l| !l.is_empty())?;
    Some(line.chars().take(12).collect())
}

#[async_trait]
impl Launcher for ContainerLauncher {
    fn kind(&self) -> LauncherKind {
        LauncherKind::Container
    }

    fn resolve(&self, request: &VersionRequest) -> Option<LaunchSpec> {
        let key = or_default(&request.game_version, "latest");
        Some(LaunchSpec {
            commit_sha: or_default(&request.commit_sha, "local"),
            game_version: key.clone(),
            key,
            artifact_path: None,
            port: None,
            runtime_command: None,
            image_tag: non_blank(&request.image_tag),
        })
    }

    async fn start(&self, spec: &LaunchSpec) -> LaunchResult<UnitHandle> {
        let name = Self::container_name(&spec.key);
        let image = self.image_for(spec);

        // A stale container with the same name would make `run` fail.
        self.remove(&name).await;

        info!(container = %name, %image, version = %spec.key, "starting container");
        let args = self.run_args(spec, &name, &image);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        // A failed or timed-out run may still have created the container.
        let out = match self.cli(&arg_refs, self.config.run_timeout()).await {
            Ok(out) => out,
            Err(e) => {
                self.remove(&name).await;
                return Err(e);
            }
        };

        if !out.success {
            self.remove(&name).await;
            return Err(LaunchError::CommandFailed {
                command: format!("{} run", self.config.binary),
                code: out.code,
                output: out.combined(),
            });
        }

        let Some(container_id) = parse_container_id(&out.stdout) else {
            // Started, but we cannot identify it; do not leave it behind.
            self.remove(&name).await;
            return Err(LaunchError::CommandFailed {
                command: format!("{} run", self.config.binary),
                code: out.code,
                output: "no container id in output".to_string(),
            });
        };

        info!(container = %name, id = %container_id, "container created");

        Ok(UnitHandle {
            key: spec.key.clone(),
            unit_id: container_id,
            host: name.clone(),
            port: self.config.internal_port,
            artifact: image,
            name,
        })
    }

    async fn is_alive(&self, handle: &UnitHandle) -> bool {
        let args = ["inspect", "-f", "{{.State.Running}}", handle.name.as_str()];
        match self.cli(&args, self.config.inspect_timeout()).await {
            Ok(out) => out.success && out.stdout == "true",
            Err(e) => {
                debug!(container = %handle.name, error = %e, "container inspect failed");
                false
            }
        }
    }

    async fn stop(&self, handle: &UnitHandle) {
        info!(container = %handle.name, version = %handle.key, "stopping container");
        match self
            .cli(&["stop", handle.name.as_str()], self.config.stop_timeout())
            .await
        {
            Ok(out) if !out.success => {
                debug!(container = %handle.name, output = %out.combined(), "container stop reported failure");
            }
            Err(e) => warn!(container = %handle.name, error = %e, "container stop failed"),
            Ok(_) => {}
        }
        self.remove(&handle.name).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launcher() -> ContainerLauncher {
        let mut config = ContainerConfig::default();
        config.network = "games".to_string();
        config.image_prefix = "registry.local/game".to_string();
        config.env.insert("JAVA_OPTS".to_string(), "-Xmx1g".to_string());
        ContainerLauncher::new(config)
    }

    fn missing_binary() -> ContainerLauncher {
        let mut config = ContainerConfig::default();
        config.binary = "/nonexistent/worldgate-docker".to_string();
        config.run_timeout = "2s".to_string();
        config.inspect_timeout = "1s".to_string();
        config.stop_timeout = "1s".to_string();
        ContainerLauncher::new(config)
    }

    #[test]
    fn resolve_keys_on_game_version() {
        let l = launcher();

        let spec = l.resolve(&VersionRequest::new("", "")).unwrap();
        assert_eq!(spec.key, "latest");
        assert_eq!(spec.commit_sha, "local");

        let spec = l.resolve(&VersionRequest::new("abc", " 1.4.2 ")).unwrap();
        assert_eq!(spec.key, "1.4.2");
        assert_eq!(spec.game_version, "1.4.2");
        assert_eq!(spec.commit_sha, "abc");
    }

    #[test]
    fn container_name_is_sanitized() {
        assert_eq!(ContainerLauncher::container_name("1.4.2"), "game-1-4-2");
        assert_eq!(ContainerLauncher::container_name("Beta_2"), "game-beta-2");
    }

    #[test]
    fn image_defaults_to_prefix_and_key() {
        let l = launcher();
        let mut spec = l.resolve(&VersionRequest::new("abc", "1.4.2")).unwrap();
        assert_eq!(l.image_for(&spec), "registry.local/game:1.4.2");

        spec.image_tag = Some("custom/img:7".to_string());
        assert_eq!(l.image_for(&spec), "custom/img:7");
    }

    #[test]
    fn run_args_carry_network_env_and_image() {
        let l = launcher();
        let spec = l.resolve(&VersionRequest::new("abc", "1.4.2")).unwrap();
        let args = l.run_args(&spec, "game-1-4-2", "registry.local/game:1.4.2");

        assert_eq!(&args[..6], ["run", "-d", "--name", "game-1-4-2", "--network", "games"]);
        assert_eq!(args.last().map(String::as_str), Some("registry.local/game:1.4.2"));
        for expected in [
            "SERVER_PORT=9001",
            "GAME_COMMIT_SHA=abc",
            "GAME_VERSION=1.4.2",
            "DB_HOST=postgres",
            "REDIS_PORT=6379",
            "JAVA_OPTS=-Xmx1g",
        ] {
            let pos = args.iter().position(|a| a == expected).unwrap();
            assert_eq!(args[pos - 1], "-e");
        }
    }

    #[test]
    fn container_id_from_last_output_line() {
        let out = "Unable to find image locally\n3f2a9c1b7d4e5f60718293a4b5c6d7e8\n";
        assert_eq!(parse_container_id(out).as_deref(), Some("3f2a9c1b7d4e"));
        assert_eq!(parse_container_id("  \n"), None);
    }

    #[test]
    fn base_url_uses_container_name() {
        let l = launcher();
        let handle = UnitHandle {
            key: "1.4.2".to_string(),
            unit_id: "3f2a9c1b7d4e".to_string(),
            host: "game-1-4-2".to_string(),
            port: 9001,
            artifact: "registry.local/game:1.4.2".to_string(),
            name: "game-1-4-2".to_string(),
        };
        assert_eq!(l.base_url(&handle), "http://game-1-4-2:9001");
    }

    #[tokio::test]
    async fn missing_cli_fails_start_and_reports_dead() {
        let l = missing_binary();
        let spec = l.resolve(&VersionRequest::new("abc", "1.0")).unwrap();

        let err = l.start(&spec).await.unwrap_err();
        assert!(matches!(err, LaunchError::Spawn { .. }));
        assert!(!err.is_request_error());

        let handle = UnitHandle {
            key: "1.0".to_string(),
            unit_id: "x".to_string(),
            host: "game-1-0".to_string(),
            port: 9001,
            artifact: String::new(),
            name: "game-1-0".to_string(),
        };
        assert!(!l.is_alive(&handle).await);
        // Best-effort: must not panic.
        l.stop(&handle).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_run_is_command_failed() {
        // `false` ignores its arguments and exits 1.
        let mut config = ContainerConfig::default();
        config.binary = "false".to_string();
        let l = ContainerLauncher::new(config);
        let spec = l.resolve(&VersionRequest::new("abc", "1.0")).unwrap();

        let err = l.start(&spec).await.unwrap_err();
        assert!(matches!(err, LaunchError::CommandFailed { code: Some(1), .. }));
    }
}
