//! Process launcher: one child process per version.
//!
//! Units are started as
//! `<runtime_command> <runtime_args…> <artifact> --server.port=<port>
//! --game.commit-sha=<sha> --game.version=<version>` with stdout and stderr
//! appended to `<logs_dir>/game-<key>.log`. The launcher owns every
//! [`Child`]; handles only carry the pid used to look it up.

use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use worldgate_core::config::ProcessConfig;
use worldgate_core::{LauncherKind, VersionRequest};

use crate::error::{LaunchError, LaunchResult};
use crate::{LaunchSpec, Launcher, UnitHandle, non_blank, or_default, sanitize_name};

/// A child process owned by the launcher.
struct ManagedChild {
    child: Child,
    port: u16,
}

/// Launches game backends as local child processes.
pub struct ProcessLauncher {
    config: ProcessConfig,
    /// Running children keyed by pid.
    children: Mutex<HashMap<String, ManagedChild>>,
}

impl ProcessLauncher {
    pub fn new(config: ProcessConfig) -> Self {
        Self {
            config,
            children: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the runtime artifact for a spec, as an absolute path.
    fn artifact_path(&self, spec: &LaunchSpec) -> LaunchResult<PathBuf> {
        let path = match &spec.artifact_path {
            Some(explicit) => PathBuf::from(explicit),
            None => self
                .config
                .artifacts_dir
                .join(self.config.artifact_template.replace("{commit}", &spec.commit_sha)),
        };
        Ok(std::path::absolute(path)?)
    }

    /// Full argument list passed to the runtime command.
    fn command_args(&self, spec: &LaunchSpec, artifact: &Path, port: u16) -> Vec<String> {
        let mut args = self.config.runtime_args.clone();
        args.push(artifact.display().to_string());
        args.push(format!("--server.port={port}"));
        args.push(format!("--game.commit-sha={}", spec.commit_sha));
        args.push(format!("--game.version={}", spec.game_version));
        args
    }

    /// Pick the first port in the configured range that no tracked unit
    /// holds and that can currently be bound.
    fn allocate_port(&self, in_use: &HashSet<u16>) -> LaunchResult<u16> {
        let (start, end) = (self.config.port_range_start, self.config.port_range_end);
        (start..=end)
            .find(|port| !in_use.contains(port) && port_is_free(&self.config.host, *port))
            .ok_or(LaunchError::NoFreePort { start, end })
    }

    fn log_path(&self, key: &str) -> PathBuf {
        self.config
            .logs_dir
            .join(format!("game-{}.log", sanitize_name(key)))
    }

    /// Number of children currently tracked (running or not yet reaped).
    pub async fn tracked_units(&self) -> usize {
        self.children.lock().await.len()
    }
}

fn port_is_free(host: &str, port: u16) -> bool {
    TcpListener::bind((host, port)).is_ok()
}

#[async_trait]
impl Launcher for ProcessLauncher {
    fn kind(&self) -> LauncherKind {
        LauncherKind::Process
    }

    fn resolve(&self, request: &VersionRequest) -> Option<LaunchSpec> {
        let commit_sha = request.commit_sha.trim();
        if commit_sha.is_empty() {
            return None;
        }
        Some(LaunchSpec {
            key: commit_sha.to_string(),
            commit_sha: commit_sha.to_string(),
            game_version: or_default(&request.game_version, "dev"),
            artifact_path: non_blank(&request.artifact_path),
            port: request.port,
            runtime_command: non_blank(&request.runtime_command),
            image_tag: None,
        })
    }

    async fn start(&self, spec: &LaunchSpec) -> LaunchResult<UnitHandle> {
        let artifact = self.artifact_path(spec)?;
        if !artifact.is_file() {
            return Err(LaunchError::ArtifactNotFound(artifact));
        }

        let mut children = self.children.lock().await;
        let port = match spec.port {
            Some(port) => port,
            None => {
                let in_use: HashSet<u16> = children.values().map(|c| c.port).collect();
                self.allocate_port(&in_use)?
            }
        };

        std::fs::create_dir_all(&self.config.logs_dir)?;
        let log_path = self.log_path(&spec.key);
        let stdout = OpenOptions::new().create(true).append(true).open(&log_path)?;
        let stderr = stdout.try_clone()?;

        let program = spec
            .runtime_command
            .clone()
            .unwrap_or_else(|| self.config.runtime_command.clone());
        let args = self.command_args(spec, &artifact, port);

        let child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                command: program.clone(),
                source,
            })?;

        let Some(pid) = child.id() else {
            return Err(LaunchError::CommandFailed {
                command: program,
                code: None,
                output: "process exited immediately".to_string(),
            });
        };

        info!(
            version = %spec.key,
            pid,
            port,
            artifact = %artifact.display(),
            log = %log_path.display(),
            "game process spawned"
        );

        let unit_id = pid.to_string();
        children.insert(unit_id.clone(), ManagedChild { child, port });

        Ok(UnitHandle {
            key: spec.key.clone(),
            unit_id,
            host: self.config.host.clone(),
            port,
            artifact: artifact.display().to_string(),
            name: log_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        })
    }

    async fn is_alive(&self, handle: &UnitHandle) -> bool {
        let mut children = self.children.lock().await;
        let Some(managed) = children.get_mut(&handle.unit_id) else {
            return false;
        };
        match managed.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!(version = %handle.key, pid = %handle.unit_id, %status, "game process has exited");
                false
            }
            Err(e) => {
                debug!(version = %handle.key, pid = %handle.unit_id, error = %e, "liveness check failed");
                false
            }
        }
    }

    async fn stop(&self, handle: &UnitHandle) {
        let Some(mut managed) = self.children.lock().await.remove(&handle.unit_id) else {
            return;
        };

        if let Ok(Some(_)) = managed.child.try_wait() {
            debug!(version = %handle.key, pid = %handle.unit_id, "game process already exited");
            return;
        }

        info!(version = %handle.key, pid = %handle.unit_id, "stopping game process");
        terminate(&mut managed.child);

        let grace = self.config.stop_timeout();
        if tokio::time::timeout(grace, managed.child.wait()).await.is_ok() {
            return;
        }

        warn!(version = %handle.key, pid = %handle.unit_id, "game process ignored SIGTERM, killing");
        if let Err(e) = managed.child.start_kill() {
            debug!(pid = %handle.unit_id, error = %e, "kill failed");
            return;
        }
        let _ = tokio::time::timeout(grace, managed.child.wait()).await;
    }
}

/// Ask the child to shut down gracefully.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
        return;
    }
    let _ = child.start_kill();
}
