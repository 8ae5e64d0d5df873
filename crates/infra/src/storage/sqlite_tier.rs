//! SQLite implementation of the persistent cache tier port.

use std::path::Path;

use clinicdesk_common::cache::{PersistentTier, StoreResult};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, instrument};

use crate::errors::IntoStoreError;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv (
        namespace TEXT NOT NULL,
        key TEXT NOT NULL,
        value TEXT NOT NULL,
        PRIMARY KEY (namespace, key)
    );";

/// Namespaced string store in a single `kv` table
///
/// One connection is shared behind a mutex; cache entries are small and
/// written once per GET, so there is no pool.
pub struct SqliteTier {
    conn: Mutex<Connection>,
}

impl SqliteTier {
    /// Open (or create) the database file at `path`
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref()).map_err(IntoStoreError::into_store)?;
        Self::with_connection(conn)
    }

    /// Private database that disappears with the value
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(IntoStoreError::into_store)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA).map_err(IntoStoreError::into_store)?;
        debug!("persistent cache tier ready");
        Ok(Self { conn: Mutex::new(conn) })
    }
}

impl PersistentTier for SqliteTier {
    fn load(&self, namespace: &str, key: &str) -> StoreResult<Option<String>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT value FROM kv WHERE namespace = ?1 AND key = ?2",
            params![namespace, key],
            |row| row.get(0),
        )
        .optional()
        .map_err(IntoStoreError::into_store)
    }

    fn store(&self, namespace: &str, key: &str, value: &str) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO kv (namespace, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(namespace, key) DO UPDATE SET value = excluded.value",
            params![namespace, key, value],
        )
        .map_err(IntoStoreError::into_store)?;
        Ok(())
    }

    fn remove(&self, namespace: &str, key: &str) -> StoreResult<bool> {
        let conn = self.conn.lock();
        let removed = conn
            .execute("DELETE FROM kv WHERE namespace = ?1 AND key = ?2", params![namespace, key])
            .map_err(IntoStoreError::into_store)?;
        Ok(removed > 0)
    }

    fn keys(&self, namespace: &str) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT key FROM kv WHERE namespace = ?1 ORDER BY rowid")
            .map_err(IntoStoreError::into_store)?;
        let rows = stmt
            .query_map(params![namespace], |row| row.get::<_, String>(0))
            .map_err(IntoStoreError::into_store)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(IntoStoreError::into_store)
    }

    fn clear(&self, namespace: &str) -> StoreResult<usize> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM kv WHERE namespace = ?1", params![namespace])
            .map_err(IntoStoreError::into_store)
    }
}
