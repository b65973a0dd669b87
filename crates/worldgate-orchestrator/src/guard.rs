//! Scoped release of a unit that has been started but not yet installed.

use std::sync::Arc;

use tracing::{debug, warn};

use worldgate_launcher::{Launcher, UnitHandle};

/// Owns a freshly started unit until it is committed to the instance table.
///
/// Every exit path other than [`StartGuard::commit`] and
/// [`StartGuard::disarm`] stops the unit: the error path awaits
/// [`StartGuard::release`], and dropping an armed guard
/// (e.g. the caller's future was cancelled mid health-check) spawns a
/// best-effort stop on the current runtime.
pub(crate) struct StartGuard {
    launcher: Arc<dyn Launcher>,
    handle: UnitHandle,
    armed: bool,
}

impl StartGuard {
    pub(crate) fn new(launcher: Arc<dyn Launcher>, handle: UnitHandle) -> Self {
        Self {
            launcher,
            handle,
            armed: true,
        }
    }

    pub(crate) fn handle(&self) -> &UnitHandle {
        &self.handle
    }

    /// Keep the unit running and hand over its handle.
    pub(crate) fn commit(mut self) -> UnitHandle {
        self.armed = false;
        self.handle.clone()
    }

    /// Give up ownership of a unit that has already been stopped.
    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }

    /// Stop the unit now.
    pub(crate) async fn release(mut self) {
        self.armed = false;
        debug!(version = %self.handle.key, unit_id = %self.handle.unit_id, "releasing unit that failed to start");
        self.launcher.stop(&self.handle).await;
    }
}

impl Drop for StartGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let launcher = Arc::clone(&self.launcher);
        let handle = self.handle.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                warn!(version = %handle.key, unit_id = %handle.unit_id, "start abandoned, stopping unit");
                rt.spawn(async move {
                    launcher.stop(&handle).await;
                });
            }
            Err(_) => {
                warn!(version = %handle.key, unit_id = %handle.unit_id, "start abandoned outside a runtime, unit may leak");
            }
        }
    }
}
