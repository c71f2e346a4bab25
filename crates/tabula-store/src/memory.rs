use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use crate::entity::Entity;
use crate::error::StoreError;
use crate::traits::{
    check_batch, resolve, BatchAction, ContinuationToken, EntityPage, TableStore, Write,
};

type Rows = BTreeMap<(String, String), Entity>;

/// In-memory storage backend.
///
/// All tables live in `BTreeMap`s; nothing touches disk.
/// Ideal for testing and prototyping.
///
/// # Example
///
/// ```
/// use tabula_store::{ActionKind, BatchAction, Entity, MemoryStore, TableStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = MemoryStore::new();
/// store.ensure_table("sensors").await.unwrap();
///
/// let entity = Entity::new("site-1", "s1").with("temp", 22.5);
/// store
///     .submit_batch("sensors", "site-1", &[BatchAction::new(ActionKind::Add, entity)])
///     .await
///     .unwrap();
///
/// let row = store.get_entity("sensors", "site-1", "s1").await.unwrap();
/// assert!(row.is_some());
/// # }
/// ```
pub struct MemoryStore {
    /// table name -> (partition_key, row_key) -> entity
    tables: Mutex<BTreeMap<String, Rows>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(BTreeMap::new()),
        }
    }

    /// Names of all existing tables.
    pub fn table_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    /// Number of rows in a table, or `None` if it does not exist.
    pub fn row_count(&self, table: &str) -> Result<Option<usize>, StoreError> {
        Ok(self.lock()?.get(table).map(|rows| rows.len()))
    }

    /// Every row of a table in key order.
    pub fn snapshot(&self, table: &str) -> Result<Vec<Entity>, StoreError> {
        let tables = self.lock()?;
        let rows = tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        Ok(rows.values().cloned().collect())
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, Rows>>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn row_key(entity: &Entity) -> (String, String) {
        (entity.partition_key.clone(), entity.row_key.clone())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn ensure_table(&self, table: &str) -> Result<(), StoreError> {
        self.lock()?.entry(table.to_string()).or_default();
        Ok(())
    }

    async fn delete_table(&self, table: &str) -> Result<(), StoreError> {
        let removed = self.lock()?.remove(table).map_or(0, |rows| rows.len());
        debug!(table, removed, "dropped table");
        Ok(())
    }

    async fn get_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<Entity>, StoreError> {
        let tables = self.lock()?;
        let rows = tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        Ok(rows
            .get(&(partition_key.to_string(), row_key.to_string()))
            .cloned())
    }

    async fn submit_batch(
        &self,
        table: &str,
        partition_key: &str,
        actions: &[BatchAction],
    ) -> Result<(), StoreError> {
        check_batch(partition_key, actions)?;

        let mut tables = self.lock()?;
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;

        // Stage on a copy of the partition so a failure leaves nothing behind.
        let mut staged: Rows = rows
            .range((partition_key.to_string(), String::new())..)
            .take_while(|((pk, _), _)| pk == partition_key)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (index, action) in actions.iter().enumerate() {
            let key = Self::row_key(&action.entity);
            match resolve(table, action, staged.get(&key)) {
                Ok(Write::Put(entity)) => {
                    staged.insert(key, entity);
                }
                Ok(Write::Remove) => {
                    staged.remove(&key);
                }
                Err(e) => {
                    return Err(StoreError::BatchRejected {
                        index,
                        source: Box::new(e),
                    })
                }
            }
        }

        rows.retain(|(pk, _), _| pk != partition_key);
        rows.extend(staged);
        Ok(())
    }

    async fn query_page(
        &self,
        table: &str,
        page_size: usize,
        continuation: Option<&ContinuationToken>,
    ) -> Result<EntityPage, StoreError> {
        let tables = self.lock()?;
        let rows = tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;

        let lower = match continuation {
            Some(token) => Bound::Excluded((token.partition_key.clone(), token.row_key.clone())),
            None => Bound::Unbounded,
        };

        let mut iter = rows.range((lower, Bound::Unbounded));
        let entities: Vec<Entity> = iter.by_ref().take(page_size).map(|(_, e)| e.clone()).collect();
        let more = iter.next().is_some();

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
