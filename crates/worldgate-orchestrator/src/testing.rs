//! Scripted launcher for orchestrator tests.
//!
//! Units are bookkeeping entries; their health endpoints are served by one
//! in-process axum server, with each unit under its own path prefix.
//! Versions whose key contains `unhealthy` answer 503.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::http::{StatusCode, Uri};

use worldgate_core::{LauncherKind, VersionRequest};
use worldgate_health::HealthProber;
use worldgate_launcher::{LaunchError, LaunchResult, LaunchSpec, Launcher, UnitHandle};

#[derive(Default)]
struct FakeState {
    /// unit id → (version key, alive)
    units: HashMap<String, (String, bool)>,
    starts: Vec<String>,
    stops: Vec<String>,
    failing: HashSet<String>,
    /// version key → liveness checks left before its unit dies
    doomed: HashMap<String, u32>,
    /// (checks answered promptly, delay for the ones after)
    slow_liveness: Option<(u32, Duration)>,
}

pub(crate) struct FakeLauncher {
    addr: SocketAddr,
    next_id: AtomicU32,
    state: Mutex<FakeState>,
}

impl FakeLauncher {
    pub(crate) async fn serve() -> Self {
        let router = Router::new().fallback(|uri: Uri| async move {
            if uri.path().contains("unhealthy") {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::OK
            }
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Self {
            addr,
            next_id: AtomicU32::new(1000),
            state: Mutex::new(FakeState::default()),
        }
    }

    /// Base URL of the live unit for `key`.
    pub(crate) fn url_for(&self, key: &str) -> String {
        let state = self.state.lock().unwrap();
        let unit_id = state
            .units
            .iter()
            .find(|(_, (unit_key, alive))| unit_key == key && *alive)
            .map(|(id, _)| id.clone())
            .unwrap_or_default();
        format!("http://{}/{key}/{unit_id}", self.addr)
    }

    /// Make the next starts of `key` fail at launch.
    pub(crate) fn fail_start(&self, key: &str) {
        self.state.lock().unwrap().failing.insert(key.to_string());
    }

    /// Kill every unit of `key` out of band.
    pub(crate) fn crash(&self, key: &str) {
        let mut state = self.state.lock().unwrap();
        for (unit_key, alive) in state.units.values_mut() {
            if unit_key == key {
                *alive = false;
            }
        }
    }

    /// Let the unit of `key` pass `checks` more liveness checks, then die.
    pub(crate) fn crash_after_checks(&self, key: &str, checks: u32) {
        self.state.lock().unwrap().doomed.insert(key.to_string(), checks);
    }

    /// Answer the next `prompt` liveness checks at once and stall every
    /// later one for `delay`. `None` restores prompt answers.
    pub(crate) fn slow_liveness(&self, slow: Option<(u32, Duration)>) {
        self.state.lock().unwrap().slow_liveness = slow;
    }

    pub(crate) fn starts(&self) -> Vec<String> {
        self.state.lock().unwrap().starts.clone()
    }

    pub(crate) fn stopped_keys(&self) -> Vec<String> {
        self.state.lock().unwrap().stops.clone()
    }

    pub(crate) fn live_units(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.units.values().filter(|(_, alive)| *alive).count()
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    fn kind(&self) -> LauncherKind {
        LauncherKind::Process
    }

    fn resolve(&self, request: &VersionRequest) -> Option<LaunchSpec> {
        let key = request.commit_sha.trim();
        if key.is_empty() {
            return None;
        }
        Some(LaunchSpec {
            key: key.to_string(),
            commit_sha: key.to_string(),
            game_version: request.game_version.clone(),
            artifact_path: None,
            port: None,
            runtime_command: None,
            image_tag: None,
        })
    }

    async fn start(&self, spec: &LaunchSpec) -> LaunchResult<UnitHandle> {
        let mut state = self.state.lock().unwrap();
        state.starts.push(spec.key.clone());
        if state.failing.contains(&spec.key) {
            return Err(LaunchError::CommandFailed {
                command: "fake run".to_string(),
                code: Some(1),
                output: "scripted failure".to_string(),
            });
        }
        let unit_id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        state.units.insert(unit_id.clone(), (spec.key.clone(), true));
        Ok(UnitHandle {
            key: spec.key.clone(),
            unit_id,
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            artifact: format!("fake-{}", spec.key),
            name: spec.key.clone(),
        })
    }

    async fn is_alive(&self, handle: &UnitHandle) -> bool {
        let delay = {
            let mut state = self.state.lock().unwrap();
            match &mut state.slow_liveness {
                Some((0, delay)) => Some(*delay),
                Some((prompt, _)) => {
                    *prompt -= 1;
                    None
                }
                None => None,
            }
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        let FakeState { units, doomed, .. } = &mut *state;
        let Some((key, alive)) = units.get_mut(&handle.unit_id) else {
            return false;
        };
        if *alive {
            if let Some(left) = doomed.get_mut(key.as_str()) {
                if *left == 0 {
                    *alive = false;
                    doomed.remove(key.as_str());
                } else {
                    *left -= 1;
                }
            }
        }
        *alive
    }

    async fn stop(&self, handle: &UnitHandle) {
        let mut state = self.state.lock().unwrap();
        if let Some((_, alive)) = state.units.get_mut(&handle.unit_id) {
            *alive = false;
        }
        state.stops.push(handle.key.clone());
    }

    fn base_url(&self, handle: &UnitHandle) -> String {
        format!("http://{}:{}/{}/{}", handle.host, handle.port, handle.key, handle.unit_id)
    }
}

pub(crate) fn fast_prober() -> HealthProber {
    HealthProber::new(
        Duration::from_millis(300),
        Duration::from_millis(20),
        Duration::from_millis(200),
    )
}
