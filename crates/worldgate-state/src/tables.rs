//! redb table definitions for the world catalog.

use redb::TableDefinition;

/// World records keyed by world id, JSON-serialized.
pub const WORLDS: TableDefinition<i64, &[u8]> = TableDefinition::new("worlds");
