//! StateStore: redb-backed world catalog.
//!
//! All values are JSON-serialized into redb's `&[u8]` value columns. The
//! store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use worldgate_core::{WorldId, epoch_secs};

use crate::error::{StateError, StateResult};
use crate::tables::WORLDS;
use crate::types::WorldRecord;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe world catalog backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(WORLDS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Insert or replace a world record.
    pub fn put_world(&self, world: &WorldRecord) -> StateResult<()> {
        let value = serde_json::to_vec(world).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(WORLDS).map_err(map_err!(Table))?;
            table
                .insert(world.id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(world_id = world.id, "world stored");
        Ok(())
    }

    pub fn get_world(&self, id: WorldId) -> StateResult<Option<WorldRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(WORLDS).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let world: WorldRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(world))
            }
            None => Ok(None),
        }
    }

    /// List all worlds, ordered by id.
    pub fn list_worlds(&self) -> StateResult<Vec<WorldRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(WORLDS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let world: WorldRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(world);
        }
        Ok(results)
    }

    /// Worlds the gateway had active.
    pub fn list_active_worlds(&self) -> StateResult<Vec<WorldRecord>> {
        Ok(self
            .list_worlds()?
            .into_iter()
            .filter(WorldRecord::is_gateway_active)
            .collect())
    }

    /// Delete a world. Returns true if it existed.
    pub fn delete_world(&self, id: WorldId) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(WORLDS).map_err(map_err!(Table))?;
            existed = table.remove(id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(world_id = id, existed, "world deleted");
        Ok(existed)
    }

    /// Record the build a world now runs and its activation flag.
    pub fn update_version_and_activation(
        &self,
        id: WorldId,
        commit_sha: &str,
        game_version: &str,
        active: bool,
    ) -> StateResult<WorldRecord> {
        self.modify(id, |world| {
            world.commit_sha = commit_sha.to_string();
            world.game_version = game_version.to_string();
            world.set_gateway_active(active);
        })
    }

    /// Set only the activation flag.
    pub fn mark_activation(&self, id: WorldId, active: bool) -> StateResult<WorldRecord> {
        self.modify(id, |world| world.set_gateway_active(active))
    }

    /// Read-modify-write of one record inside a single write transaction.
    fn modify(&self, id: WorldId, apply: impl FnOnce(&mut WorldRecord)) -> StateResult<WorldRecord> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let world = {
            let mut table = txn.open_table(WORLDS).map_err(map_err!(Table))?;
            let mut world: WorldRecord = match table.get(id).map_err(map_err!(Read))? {
                Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
                None => return Err(StateError::NotFound(id)),
            };
            apply(&mut world);
            world.updated_at = epoch_secs();
            let value = serde_json::to_vec(&world).map_err(map_err!(Serialize))?;
            table
                .insert(id, value.as_slice())
                .map_err(map_err!(Write))?;
            world
        };
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world(id: WorldId, active: bool) -> WorldRecord {
        let mut w = WorldRecord::new(id, format!("sha-{id}"), "1.0.0");
        w.name = format!("world-{id}");
        w.set_gateway_active(active);
        w
    }

    #[test]
    fn world_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let w = world(1, true);

        store.put_world(&w).unwrap();
        assert_eq!(store.get_world(1).unwrap(), Some(w));
        assert_eq!(store.get_world(2).unwrap(), None);
    }

    #[test]
    fn list_is_ordered_by_id() {
        let store = StateStore::open_in_memory().unwrap();
        for id in [3, 1, 2] {
            store.put_world(&world(id, false)).unwrap();
        }

        let ids: Vec<WorldId> = store.list_worlds().unwrap().iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn list_active_filters_flag() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_world(&world(1, true)).unwrap();
        store.put_world(&world(2, false)).unwrap();
        store.put_world(&WorldRecord::new(3, "c", "1.0")).unwrap();

        let active: Vec<WorldId> = store.list_active_worlds().unwrap().iter().map(|w| w.id).collect();
        assert_eq!(active, vec![1]);
    }

    #[test]
    fn update_version_and_activation_rewrites_record() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_world(&world(5, false)).unwrap();

        let updated = store.update_version_and_activation(5, "new-sha", "2.0.0", true).unwrap();
        assert_eq!(updated.commit_sha, "new-sha");
        assert!(updated.is_gateway_active());
        assert!(updated.updated_at > 0);

        let stored = store.get_world(5).unwrap().unwrap();
        assert_eq!(stored, updated);
        assert_eq!(stored.name, "world-5");
    }

    #[test]
    fn mark_activation_unknown_world_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        let err = store.mark_activation(9, true).unwrap_err();
        assert!(matches!(err, StateError::NotFound(9)));
    }

    #[test]
    fn delete_world() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_world(&world(1, true)).unwrap();

        assert!(store.delete_world(1).unwrap());
        assert!(!store.delete_world(1).unwrap());
        assert!(store.list_worlds().unwrap().is_empty());
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put_world(&world(11, true)).unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        let active = store.list_active_worlds().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, 11);
    }
}
