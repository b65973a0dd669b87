//! Activation bootstrap: bring back the worlds that were active before
//! the gateway restarted.

use tokio::sync::watch;
use tracing::{info, warn};

use worldgate_core::WorldId;
use worldgate_state::StateStore;

use crate::Orchestrator;

/// Outcome of one restore pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: Vec<WorldId>,
    pub failed: Vec<WorldId>,
    /// Never attempted because shutdown was signalled first.
    pub skipped: Vec<WorldId>,
}

/// Replay `attach_world` for every world marked `gatewayActive`.
///
/// A world that fails to come up is logged and the pass moves on. Once
/// `shutdown` turns true no further world is attempted; an attach already
/// in flight runs to completion so its unit is either installed or
/// stopped.
pub async fn restore_active_worlds(
    orchestrator: &Orchestrator,
    store: &StateStore,
    enabled: bool,
    shutdown: watch::Receiver<bool>,
) -> RestoreReport {
    let mut report = RestoreReport::default();
    if !enabled {
        info!("active world restore disabled");
        return report;
    }

    let worlds = match store.list_active_worlds() {
        Ok(worlds) => worlds,
        Err(e) => {
            warn!(error = %e, "could not read world catalog, skipping restore");
            return report;
        }
    };
    info!(count = worlds.len(), "restoring active worlds");

    for world in worlds {
        if *shutdown.borrow() {
            report.skipped.push(world.id);
            continue;
        }
        match orchestrator.attach_world(world.id, &world.version_request()).await {
            Ok(status) => {
                info!(world_id = world.id, version = %status.version_key, base_url = %status.base_url, "world restored");
                report.restored.push(world.id);
            }
            Err(e) => {
                warn!(world_id = world.id, commit = %world.commit_sha, error = %e, "failed to restore world");
                report.failed.push(world.id);
            }
        }
    }

    if !report.skipped.is_empty() {
        warn!(skipped = ?report.skipped, "restore interrupted by shutdown");
    }
    info!(restored = report.restored.len(), failed = report.failed.len(), "restore finished");
    report
}
