//! Orchestrator: maps worlds onto versioned game instances.
//!
//! The `Orchestrator` owns the instance table:
//! - at most one instance per version key
//! - each world assigned to at most one instance
//! - routes in the registry always mirror the assigned worlds
//!
//! Every operation runs under one async mutex, including unit start and
//! the health wait. Control-plane calls are rare and bounded by the
//! configured timeouts, so serializing them rules out double starts and
//! double assignment without finer locking.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use worldgate_core::{InstanceStatus, LauncherKind, VersionRequest, WorldId, epoch_secs};
use worldgate_health::HealthProber;
use worldgate_launcher::{LaunchSpec, Launcher, UnitHandle};
use worldgate_routes::RouteRegistry;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::guard::StartGuard;

/// One live instance and the worlds it serves.
#[derive(Debug, Clone)]
struct InstanceRecord {
    handle: UnitHandle,
    commit_sha: String,
    game_version: String,
    world_ids: BTreeSet<WorldId>,
    base_url: String,
    started_at: u64,
}

type InstanceTable = BTreeMap<String, InstanceRecord>;

/// Serialized control plane over a [`Launcher`] and a [`RouteRegistry`].
pub struct Orchestrator {
    launcher: Arc<dyn Launcher>,
    routes: Arc<dyn RouteRegistry>,
    prober: HealthProber,
    /// version key → instance.
    table: Mutex<InstanceTable>,
}

impl Orchestrator {
    pub fn new(
        launcher: Arc<dyn Launcher>,
        routes: Arc<dyn RouteRegistry>,
        prober: HealthProber,
    ) -> Self {
        Self {
            launcher,
            routes,
            prober,
            table: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn launcher_kind(&self) -> LauncherKind {
        self.launcher.kind()
    }

    /// Serve `world_id` from the instance for `request`, moving it off any
    /// other instance first.
    pub async fn attach_world(
        &self,
        world_id: WorldId,
        request: &VersionRequest,
    ) -> OrchestratorResult<InstanceStatus> {
        let spec = self.resolve(request)?;
        let mut table = self.table.lock().await;
        self.reconcile(&mut table).await;

        if let Some(current) = owner_of(&table, world_id) {
            if current != spec.key {
                info!(world_id, from = %current, to = %spec.key, "migrating world");
                self.release_world(&mut table, &current, world_id).await;
            }
        }

        let mut record = self.obtain(&mut table, &spec).await?;
        record.world_ids.insert(world_id);
        self.routes.attach(world_id, &record.base_url);
        info!(world_id, version = %spec.key, base_url = %record.base_url, "world attached");

        let status = self.status_of(&spec.key, &record, true);
        table.insert(spec.key, record);
        Ok(status)
    }

    /// Make sure an instance for `request` is running without assigning
    /// any world to it.
    pub async fn ensure_version(&self, request: &VersionRequest) -> OrchestratorResult<InstanceStatus> {
        let spec = self.resolve(request)?;
        let mut table = self.table.lock().await;
        self.reconcile(&mut table).await;

        let record = self.obtain(&mut table, &spec).await?;
        let status = self.status_of(&spec.key, &record, true);
        table.insert(spec.key, record);
        Ok(status)
    }

    /// Stop serving `world_id`. Returns false if no instance held it.
    pub async fn detach_world(&self, world_id: WorldId) -> bool {
        let mut table = self.table.lock().await;
        self.reconcile(&mut table).await;

        let Some(key) = owner_of(&table, world_id) else {
            debug!(world_id, "detach requested for unassigned world");
            return false;
        };
        self.release_world(&mut table, &key, world_id).await;
        info!(world_id, version = %key, "world detached");
        true
    }

    /// Stop the instance for `version_key` regardless of its worlds.
    /// Returns false if no such instance was tracked.
    pub async fn stop_version(&self, version_key: &str) -> bool {
        let mut table = self.table.lock().await;
        let Some(record) = self.retire(&mut table, version_key).await else {
            return false;
        };
        info!(version = %version_key, worlds = ?record.world_ids, "instance stopped");
        true
    }

    /// One status per live instance, ordered by version key.
    pub async fn statuses(&self) -> Vec<InstanceStatus> {
        let mut table = self.table.lock().await;
        self.reconcile(&mut table).await;

        let mut statuses = Vec::with_capacity(table.len());
        for (key, record) in table.iter() {
            let alive = self.launcher.is_alive(&record.handle).await;
            statuses.push(self.status_of(key, record, alive));
        }
        statuses
    }

    /// Stop every instance and forget all routes.
    pub async fn shutdown_all(&self) {
        let mut table = self.table.lock().await;
        let keys: Vec<String> = table.keys().cloned().collect();
        info!(instances = keys.len(), "shutting down all instances");
        for key in keys {
            if self.retire(&mut table, &key).await.is_some() {
                debug!(version = %key, "instance stopped");
            }
        }
    }

    fn resolve(&self, request: &VersionRequest) -> OrchestratorResult<LaunchSpec> {
        self.launcher.resolve(request).ok_or_else(|| {
            let field = match self.launcher.kind() {
                LauncherKind::Process => "commitSha",
                LauncherKind::Container => "gameVersion",
            };
            OrchestratorError::Validation(format!("{field} is required"))
        })
    }

    /// Drop every instance whose unit has died, along with its routes.
    async fn reconcile(&self, table: &mut InstanceTable) {
        let mut dead = Vec::new();
        for (key, record) in table.iter() {
            if !self.launcher.is_alive(&record.handle).await {
                dead.push(key.clone());
            }
        }

        for key in dead {
            if let Some(record) = table.get(&key) {
                warn!(
                    version = %key,
                    unit_id = %record.handle.unit_id,
                    worlds = ?record.world_ids,
                    "instance died, removing"
                );
            }
            // Stopping also reaps the exited child or stopped container.
            self.retire(table, &key).await;
        }
    }

    /// Stop the unit under `key`, then drop its record and routes.
    ///
    /// The record stays in the table until the stop returns; a call
    /// cancelled mid-stop leaves it for the next reconciliation.
    async fn retire(&self, table: &mut InstanceTable, key: &str) -> Option<InstanceRecord> {
        let handle = table.get(key)?.handle.clone();
        self.launcher.stop(&handle).await;
        let record = table.remove(key)?;
        for world_id in &record.world_ids {
            self.routes.detach(*world_id);
        }
        Some(record)
    }

    /// Remove `world_id` from the instance under `key`, stopping the
    /// instance once it serves nothing.
    async fn release_world(&self, table: &mut InstanceTable, key: &str, world_id: WorldId) {
        self.routes.detach(world_id);
        let now_empty = match table.get_mut(key) {
            Some(record) => {
                record.world_ids.remove(&world_id);
                record.world_ids.is_empty()
            }
            None => false,
        };
        if now_empty && self.retire(table, key).await.is_some() {
            info!(version = %key, "instance has no worlds left, stopped");
        }
    }

    /// Take the instance for `spec` out of the table, starting or
    /// restarting it as needed. The caller reinserts it.
    ///
    /// A live entry leaves the table only after the last await, so a
    /// cancelled caller never strands a running unit.
    async fn obtain(&self, table: &mut InstanceTable, spec: &LaunchSpec) -> OrchestratorResult<InstanceRecord> {
        let Some(handle) = table.get(&spec.key).map(|record| record.handle.clone()) else {
            return self.start_fresh(spec, BTreeSet::new()).await;
        };
        if self.launcher.is_alive(&handle).await {
            if let Some(record) = table.remove(&spec.key) {
                return Ok(record);
            }
        }

        let world_ids = self
            .retire(table, &spec.key)
            .await
            .map(|record| record.world_ids)
            .unwrap_or_default();
        warn!(version = %spec.key, worlds = ?world_ids, "instance is dead, restarting");

        let record = self.start_fresh(spec, world_ids).await?;
        for world_id in &record.world_ids {
            self.routes.attach(*world_id, &record.base_url);
        }
        Ok(record)
    }

    /// Start a unit and wait for it to become healthy. The unit is stopped
    /// on every failure path.
    async fn start_fresh(&self, spec: &LaunchSpec, world_ids: BTreeSet<WorldId>) -> OrchestratorResult<InstanceRecord> {
        info!(version = %spec.key, commit = %spec.commit_sha, "starting instance");
        let handle = self.launcher.start(spec).await?;
        let guard = StartGuard::new(Arc::clone(&self.launcher), handle);

        if let Err(e) = self.prober.wait_until_ready(self.launcher.as_ref(), guard.handle()).await {
            warn!(version = %spec.key, error = %e, "instance failed to become healthy");
            if e.unit_stopped() {
                guard.disarm();
            } else {
                guard.release().await;
            }
            return Err(e.into());
        }

        let handle = guard.commit();
        let base_url = self.launcher.base_url(&handle);
        info!(version = %spec.key, unit_id = %handle.unit_id, %base_url, "instance started");
        Ok(InstanceRecord {
            handle,
            commit_sha: spec.commit_sha.clone(),
            game_version: spec.game_version.clone(),
            world_ids,
            base_url,
            started_at: epoch_secs(),
        })
    }

    fn status_of(&self, key: &str, record: &InstanceRecord, alive: bool) -> InstanceStatus {
        InstanceStatus {
            version_key: key.to_string(),
            commit_sha: record.commit_sha.clone(),
            game_version: record.game_version.clone(),
            artifact: record.handle.artifact.clone(),
            world_ids: record.world_ids.iter().copied().collect(),
            alive,
            unit_id: record.handle.unit_id.clone(),
            base_url: record.base_url.clone(),
            port: record.handle.port,
            launcher: self.launcher.kind(),
            started_at: record.started_at,
        }
    }
}

/// Version key of the instance currently serving `world_id`.
fn owner_of(table: &InstanceTable, world_id: WorldId) -> Option<String> {
    table
        .iter()
        .find(|(_, record)| record.world_ids.contains(&world_id))
        .map(|(key, _)| key.clone())
}
