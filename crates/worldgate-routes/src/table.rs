//! World routing table.
//!
//! Maps each active world to the base address of the instance serving it.
//! Writes are idempotent: attaching an already-routed world overwrites
//! its address, detaching an unknown world does nothing.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use tracing::debug;

use worldgate_core::WorldId;

/// Route writes issued by the orchestrator.
pub trait RouteRegistry: Send + Sync {
    /// Point `world_id` at `base_url`.
    fn attach(&self, world_id: WorldId, base_url: &str);

    /// Forget the route for `world_id`.
    fn detach(&self, world_id: WorldId);
}

/// In-memory route table shared between the orchestrator and the API.
#[derive(Clone, Default)]
pub struct RouteTable {
    routes: Arc<RwLock<HashMap<WorldId, String>>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base address currently serving `world_id`.
    pub fn resolve(&self, world_id: WorldId) -> Option<String> {
        let routes = self.routes.read().expect("routes lock");
        routes.get(&world_id).cloned()
    }

    /// All routes, ordered by world id.
    pub fn snapshot(&self) -> BTreeMap<WorldId, String> {
        let routes = self.routes.read().expect("routes lock");
        routes.iter().map(|(id, url)| (*id, url.clone())).collect()
    }

    pub fn len(&self) -> usize {
        self.routes.read().expect("routes lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RouteRegistry for RouteTable {
    fn attach(&self, world_id: WorldId, base_url: &str) {
        let mut routes = self.routes.write().expect("routes lock");
        routes.insert(world_id, base_url.to_string());
        debug!(world_id, %base_url, "world route attached");
    }

    fn detach(&self, world_id: WorldId) {
        let mut routes = self.routes.write().expect("routes lock");
        if routes.remove(&world_id).is_some() {
            debug!(world_id, "world route detached");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_and_resolve() {
        let table = RouteTable::new();
        table.attach(7, "http://127.0.0.1:9001");

        assert_eq!(table.resolve(7).as_deref(), Some("http://127.0.0.1:9001"));
        assert_eq!(table.resolve(8), None);
    }

    #[test]
    fn attach_overwrites_existing_route() {
        let table = RouteTable::new();
        table.attach(7, "http://127.0.0.1:9001");
        table.attach(7, "http://127.0.0.1:9002");

        assert_eq!(table.len(), 1);
        assert_eq!(table.resolve(7).as_deref(), Some("http://127.0.0.1:9002"));
    }

    #[test]
    fn detach_is_idempotent() {
        let table = RouteTable::new();
        table.attach(1, "http://a:9001");

        table.detach(1);
        table.detach(1);
        table.detach(42);
        assert!(table.is_empty());
    }

    #[test]
    fn snapshot_is_ordered() {
        let table = RouteTable::new();
        table.attach(3, "http://c:9001");
        table.attach(1, "http://a:9001");
        table.attach(2, "http://b:9001");

        let ids: Vec<WorldId> = table.snapshot().keys().copied().collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn clones_share_state() {
        let table = RouteTable::new();
        let reader = table.clone();
        table.attach(5, "http://x:9001");
        assert_eq!(reader.resolve(5).as_deref(), Some("http://x:9001"));
    }
}
