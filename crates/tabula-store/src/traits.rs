use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::StoreError;

/// Maximum number of actions in one atomic batch.
pub const MAX_BATCH_SIZE: usize = 100;

/// Store-level write primitive carried by a [`BatchAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// Insert; fails if the row exists.
    Add,
    /// Merge into an existing row.
    UpdateMerge,
    /// Replace an existing row.
    UpdateReplace,
    /// Merge into a row, inserting it if missing.
    UpsertMerge,
    /// Replace a row, inserting it if missing.
    UpsertReplace,
    /// Remove an existing row.
    Delete,
}

/// One write inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchAction {
    pub kind: ActionKind,
    pub entity: Entity,
}

impl BatchAction {
    pub fn new(kind: ActionKind, entity: Entity) -> Self {
        Self { kind, entity }
    }

    /// Partition the action writes to.
    pub fn partition_key(&self) -> &str {
        &self.entity.partition_key
    }
}

/// Resume point for a paged scan: the last key returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationToken {
    pub partition_key: String,
    pub row_key: String,
}

/// One page of a table scan.
#[derive(Debug, Clone, Default)]
pub struct EntityPage {
    /// Rows ordered by `(partition_key, row_key)`.
    pub entities: Vec<Entity>,
    /// Present when more rows may follow.
    pub continuation: Option<ContinuationToken>,
}

/// A partitioned key-value table store.
///
/// Rows are grouped into named tables and addressed by
/// `(partition_key, row_key)`. Writes go through [`submit_batch`], which is
/// atomic for at most [`MAX_BATCH_SIZE`] actions on a single partition.
///
/// [`submit_batch`]: TableStore::submit_batch
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Create the table if it does not exist.
    async fn ensure_table(&self, table: &str) -> Result<(), StoreError>;

    /// Drop the table and every row in it. Missing tables are ignored.
    async fn delete_table(&self, table: &str) -> Result<(), StoreError>;

    /// Point lookup. Returns `None` if the row does not exist.
    async fn get_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<Entity>, StoreError>;

    /// Apply `actions` atomically: either every action succeeds or none
    /// is applied.
    ///
    /// Every action must target `partition_key`, and there may be at most
    /// [`MAX_BATCH_SIZE`] of them.
    async fn submit_batch(
        &self,
        table: &str,
        partition_key: &str,
        actions: &[BatchAction],
    ) -> Result<(), StoreError>;

    /// Fetch up to `page_size` rows strictly after `continuation`.
    async fn query_page(
        &self,
        table: &str,
        page_size: usize,
        continuation: Option<&ContinuationToken>,
    ) -> Result<EntityPage, StoreError>;

    /// Lazily scan the whole table, one page at a time.
    fn query_all(&self, table: &str, page_size: usize) -> EntityPager<'_, Self> {
        EntityPager {
            store: self,
            table: table.to_string(),
            page_size: page_size.max(1),
            continuation: None,
            exhausted: false,
        }
    }
}

/// Finite, non-restartable page sequence over a table.
///
/// Only the current page is held in memory.
pub struct EntityPager<'a, S: ?Sized> {
    store: &'a S,
    table: String,
    page_size: usize,
    continuation: Option<ContinuationToken>,
    exhausted: bool,
}

impl<'a, S: TableStore + ?Sized> EntityPager<'a, S> {
    /// Fetch the next page, or `None` once the scan is complete.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Entity>>, StoreError> {
        if self.exhausted {
            return Ok(None);
        }

        let page = self
            .store
            .query_page(&self.table, self.page_size, self.continuation.as_ref())
            .await?;

        self.continuation = page.continuation;
        if self.continuation.is_none() {
            self.exhausted = true;
            if page.entities.is_empty() {
                return Ok(None);
            }
        }

        Ok(Some(page.entities))
    }
}

/// Durable ledger of applied migrations.
///
/// Every [`TableStore`] is a history store: records are rows in a
/// dedicated table, and recording uses an `Add` so a second writer
/// surfaces as [`StoreError::Conflict`].
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Create the history table if needed.
    async fn ensure_history_table(&self, table: &str) -> Result<(), StoreError>;

    /// Look up a history record.
    async fn find_record(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<Entity>, StoreError>;

    /// Write a new history record. Fails with a conflict if it exists.
    async fn put_record(&self, table: &str, record: &Entity) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: TableStore + ?Sized> HistoryStore for T {
    async fn ensure_history_table(&self, table: &str) -> Result<(), StoreError> {
        self.ensure_table(table).await
    }

    async fn find_record(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<Entity>, StoreError> {
        self.get_entity(table, partition_key, row_key).await
    }

    async fn put_record(&self, table: &str, record: &Entity) -> Result<(), StoreError> {
        let action = BatchAction::new(ActionKind::Add, record.clone());
        self.submit_batch(table, &record.partition_key, &[action])
            .await
            .map_err(|e| match e {
                StoreError::BatchRejected { source, .. } => *source,
                other => other,
            })
    }
}

/// Outcome of resolving one action against the current row.
pub(crate) enum Write {
    Put(Entity),
    Remove,
}

/// Check the batch-level rules shared by every backend.
pub(crate) fn check_batch(partition_key: &str, actions: &[BatchAction]) -> Result<(), StoreError> {
    if actions.len() > MAX_BATCH_SIZE {
        return Err(StoreError::BatchTooLarge {
            actual: actions.len(),
            limit: MAX_BATCH_SIZE,
        });
    }
    if let Some(stray) = actions.iter().find(|a| a.partition_key() != partition_key) {
        return Err(StoreError::PartitionMismatch {
            expected: partition_key.to_string(),
            found: stray.partition_key().to_string(),
        });
    }
    Ok(())
}

/// Decide what an action does to a row, given the row's current state.
pub(crate) fn resolve(
    table: &str,
    action: &BatchAction,
    existing: Option<&Entity>,
) -> Result<Write, StoreError> {
    let entity = &action.entity;
    let not_found = || StoreError::EntityNotFound {
        table: table.to_string(),
        partition_key: entity.partition_key.clone(),
        row_key: entity.row_key.clone(),
    };

    match (action.kind, existing) {
        (ActionKind::Add, Some(_)) => Err(StoreError::Conflict {
            table: table.to_string(),
            partition_key: entity.partition_key.clone(),
            row_key: entity.row_key.clone(),
        }),
        (ActionKind::Add, None)
        | (ActionKind::UpsertReplace, _)
        | (ActionKind::UpsertMerge, None)
        | (ActionKind::UpdateReplace, Some(_)) => Ok(Write::Put(entity.clone())),
        (ActionKind::UpdateMerge, Some(current)) | (ActionKind::UpsertMerge, Some(current)) => {
            let mut merged = current.clone();
            merged.merge_from(entity);
            Ok(Write::Put(merged))
        }
        (ActionKind::UpdateMerge, None) | (ActionKind::UpdateReplace, None) => Err(not_found()),
        (ActionKind::Delete, Some(_)) => Ok(Write::Remove),
        (ActionKind::Delete, None) => Err(not_found()),
    }
}
