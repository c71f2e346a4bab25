//! SQLite persistence backend using rusqlite.
//!
//! A local, durable table store with the same batch rules as any other
//! backend: at most [`MAX_BATCH_SIZE`](crate::MAX_BATCH_SIZE) actions per
//! batch, one partition per batch, all-or-nothing. Uses WAL mode by default.
//!
//! Calls run on the caller's task; SQLite I/O is short and local.
//!
//! # Example
//!
//! ```no_run
//! use tabula_store::{SqliteStore, TableStore};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = SqliteStore::open("tables.db").unwrap();
//! store.ensure_table("orders").await.unwrap();
//! let row = store.get_entity("orders", "eu", "o-1").await.unwrap();
//! assert!(row.is_none());
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::entity::{Entity, Value};
use crate::error::StoreError;
use crate::traits::{
    check_batch, resolve, BatchAction, ContinuationToken, EntityPage, TableStore, Write,
};

/// SQLite configuration options.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// SQLite journal mode. Defaults to WAL.
    pub journal_mode: JournalMode,
    /// Busy timeout in milliseconds. Defaults to 5000.
    pub busy_timeout_ms: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            journal_mode: JournalMode::Wal,
            busy_timeout_ms: 5000,
        }
    }
}

/// SQLite journal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    /// Write-Ahead Logging, allows concurrent reads during writes.
    Wal,
    /// Traditional rollback journal.
    Delete,
    /// In-memory journal (fastest, no crash recovery).
    Memory,
}

impl JournalMode {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Wal => "WAL",
            Self::Delete => "DELETE",
            Self::Memory => "MEMORY",
        }
    }
}

/// SQLite table store.
///
/// Wraps a `rusqlite::Connection` behind a `Mutex` for safe shared access.
/// Creates the schema automatically on first open.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at the given path with default config.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::open_with_config(path, SqliteConfig::default())
    }

    /// Open with custom configuration.
    pub fn open_with_config<P: AsRef<Path>>(
        path: P,
        config: SqliteConfig,
    ) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        Self::init_connection(&conn, &config)?;
        Self::create_schema(&conn)?;
        debug!(
            path = %path.as_ref().display(),
            journal_mode = config.journal_mode.as_str(),
            "opened sqlite store"
        );
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(&conn, &SqliteConfig::default())?;
        Self::create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_connection(conn: &Connection, config: &SqliteConfig) -> Result<(), StoreError> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = {};
             PRAGMA busy_timeout = {};
             PRAGMA synchronous = NORMAL;",
            config.journal_mode.as_str(),
            config.busy_timeout_ms,
        ))?;
        Ok(())
    }

    fn create_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tabula_tables (
                name        TEXT PRIMARY KEY,
                created_at  INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tabula_entities (
                table_name    TEXT NOT NULL,
                partition_key TEXT NOT NULL,
                row_key       TEXT NOT NULL,
                properties    BLOB NOT NULL,
                updated_at    INTEGER NOT NULL,
                PRIMARY KEY (table_name, partition_key, row_key)
            );",
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn now_ms() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }

    fn table_exists(conn: &Connection, table: &str) -> Result<bool, StoreError> {
        let found: Option<String> = conn
            .query_row(
                "SELECT name FROM tabula_tables WHERE name = ?1",
                params![table],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn require_table(conn: &Connection, table: &str) -> Result<(), StoreError> {
        if Self::table_exists(conn, table)? {
            Ok(())
        } else {
            Err(StoreError::TableNotFound(table.to_string()))
        }
    }

    /// SQL `LIMIT` for a page: one extra row tells us whether another page
    /// follows. Saturates for page sizes SQLite cannot express.
    fn fetch_limit(page_size: usize) -> i64 {
        i64::try_from(page_size)
            .ok()
            .and_then(|n| n.checked_add(1))
            .unwrap_or(i64::MAX)
    }

    fn encode(properties: &BTreeMap<String, Value>) -> Result<Vec<u8>, StoreError> {
        postcard::to_allocvec(properties).map_err(|e| StoreError::Codec(e.to_string()))
    }

    fn decode(
        partition_key: String,
        row_key: String,
        blob: &[u8],
    ) -> Result<Entity, StoreError> {
        let properties =
            postcard::from_bytes(blob).map_err(|e| StoreError::Codec(e.to_string()))?;
        Ok(Entity {
            partition_key,
            row_key,
            properties,
        })
    }

    fn load_row(
        conn: &Connection,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<Entity>, StoreError> {
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT properties FROM tabula_entities
                 WHERE table_name = ?1 AND partition_key = ?2 AND row_key = ?3",
                params![table, partition_key, row_key],
                |row| row.get(0),
            )
            .optional()?;
        blob.map(|b| Self::decode(partition_key.to_string(), row_key.to_string(), &b))
            .transpose()
    }

    fn apply(conn: &Connection, table: &str, action: &BatchAction) -> Result<(), StoreError> {
        let entity = &action.entity;
        let existing = Self::load_row(conn, table, &entity.partition_key, &entity.row_key)?;
        match resolve(table, action, existing.as_ref())? {
            Write::Put(row) => {
                conn.execute(
                    "INSERT INTO tabula_entities
                        (table_name, partition_key, row_key, properties, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(table_name, partition_key, row_key)
                     DO UPDATE SET properties = excluded.properties,
                                   updated_at = excluded.updated_at",
                    params![
                        table,
                        row.partition_key,
                        row.row_key,
                        Self::encode(&row.properties)?,
                        Self::now_ms()
                    ],
                )?;
            }
            Write::Remove => {
                conn.execute(
                    "DELETE FROM tabula_entities
                     WHERE table_name = ?1 AND partition_key = ?2 AND row_key = ?3",
                    params![table, entity.partition_key, entity.row_key],
                )?;
            }
        }
        Ok(())
    }

    /// Names of all existing tables.
    pub fn table_names(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT name FROM tabula_tables ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Number of rows in a table.
    pub fn row_count(&self, table: &str) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tabula_entities WHERE table_name = ?1",
            params![table],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Get the database file size in bytes (0 for in-memory).
    pub fn file_size(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
        Ok((page_count * page_size) as u64)
    }

    /// Get the current journal mode.
    pub fn journal_mode(&self) -> Result<String, StoreError> {
        let conn = self.lock()?;
        let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        Ok(mode)
    }
}

#[async_trait]
impl TableStore for SqliteStore {
    async fn ensure_table(&self, table: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO tabula_tables (name, created_at) VALUES (?1, ?2)",
            params![table, Self::now_ms()],
        )?;
        Ok(())
    }

    async fn delete_table(&self, table: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let removed = tx.execute(
            "DELETE FROM tabula_entities WHERE table_name = ?1",
            params![table],
        )?;
        tx.execute("DELETE FROM tabula_tables WHERE name = ?1", params![table])?;
        tx.commit()?;
        debug!(table, removed, "dropped table");
        Ok(())
    }

    async fn get_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<Entity>, StoreError> {
        let conn = self.lock()?;
        Self::require_table(&conn, table)?;
        Self::load_row(&conn, table, partition_key, row_key)
    }

    async fn submit_batch(
        &self,
        table: &str,
        partition_key: &str,
        actions: &[BatchAction],
    ) -> Result<(), StoreError> {
        check_batch(partition_key, actions)?;

        let conn = self.lock()?;
        Self::require_table(&conn, table)?;

        // Dropping the transaction without commit rolls it back.
        let tx = conn.unchecked_transaction()?;
        for (index, action) in actions.iter().enumerate() {
            Self::apply(&tx, table, action).map_err(|e| StoreError::BatchRejected {
                index,
                source: Box::new(e),
            })?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn query_page(
        &self,
        table: &str,
        page_size: usize,
        continuation: Option<&ContinuationToken>,
    ) -> Result<EntityPage, StoreError> {
        let conn = self.lock()?;
        Self::require_table(&conn, table)?;

        let (after_pk, after_rk, bounded) = match continuation {
            Some(token) => (token.partition_key.as_str(), token.row_key.as_str(), 1),
            None => ("", "", 0),
        };

        let mut stmt = conn.prepare(
            "SELECT partition_key, row_key, properties FROM tabula_entities
             WHERE table_name = ?1
               AND (?2 = 0 OR partition_key > ?3 OR (partition_key = ?3 AND row_key > ?4))
             ORDER BY partition_key, row_key
             LIMIT ?5",
        )?;

        let limit = Self::fetch_limit(page_size);
        let raw = stmt
            .query_map(params![table, bounded, after_pk, after_rk, limit], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let more = raw.len() > page_size;
        let mut entities = Vec::with_capacity(raw.len().min(page_size));
        for (pk, rk, blob) in raw.into_iter().take(page_size) {
            entities.push(Self::decode(pk, rk, &blob)?);
        }

        let continuation = match entities.last() {
            Some(last) if more => Some(ContinuationToken {
                partition_key: last.partition_key.clone(),
                row_key: last.row_key.clone(),
            }),
            _ => None,
        };

        Ok(EntityPage {
            entities,
            continuation,
        })
    }
}
