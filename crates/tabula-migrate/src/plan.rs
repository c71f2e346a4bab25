//! Turning operations into atomic store batches.
//!
//! The store accepts at most [`MAX_BATCH_SIZE`](tabula_store::MAX_BATCH_SIZE)
//! actions per batch, all on one partition. Operations are grouped by
//! table, then by partition, then chunked. Table truncation and table-wide
//! updates bypass batching.
//!
//! Batches are atomic individually, not collectively: if a later batch
//! fails, earlier ones stay committed.

use tabula_store::{ActionKind, BatchAction, TableStore, MAX_BATCH_SIZE};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::MigrateError;
use crate::operation::{MigrationOperation, Operation, PropertyPatch};

/// Operations for one table, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct TableGroup {
    pub table: String,
    pub operations: Vec<MigrationOperation>,
}

/// Actions bound for one atomic submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub table: String,
    pub partition_key: String,
    pub actions: Vec<BatchAction>,
}

/// Counters from executing one migration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    /// Batches submitted.
    pub batches: usize,
    /// Actions across all submitted batches.
    pub actions: usize,
    /// Tables truncated by `DELETE <table> *`.
    pub truncated_tables: usize,
    /// Rows read by `UPDATEA` scans.
    pub scanned_entities: usize,
    /// Rows an `UPDATEA` patch actually changed.
    pub rewritten_entities: usize,
}

/// Group operations by table, keeping file order inside each group.
///
/// Groups appear in order of each table's first operation.
pub fn group_by_table(operations: Vec<MigrationOperation>) -> Vec<TableGroup> {
    let mut groups: Vec<TableGroup> = Vec::new();
    for op in operations {
        match groups.iter_mut().find(|g| g.table == op.table) {
            Some(group) => group.operations.push(op),
            None => groups.push(TableGroup {
                table: op.table.clone(),
                operations: vec![op],
            }),
        }
    }
    groups
}

/// Split actions into per-partition batches of at most `max_batch_size`.
///
/// Partitions appear in order of first occurrence and actions keep their
/// relative order.
pub fn chunk_by_partition(
    table: &str,
    actions: Vec<BatchAction>,
    max_batch_size: usize,
) -> Vec<Batch> {
    let max_batch_size = max_batch_size.max(1);

    let mut partitions: Vec<(String, Vec<BatchAction>)> = Vec::new();
    for action in actions {
        match partitions
            .iter_mut()
            .find(|(pk, _)| pk == action.partition_key())
        {
            Some((_, list)) => list.push(action),
            None => partitions.push((action.partition_key().to_string(), vec![action])),
        }
    }

    let mut batches = Vec::new();
    for (partition_key, list) in partitions {
        let mut list = list.into_iter().peekable();
        while list.peek().is_some() {
            batches.push(Batch {
                table: table.to_string(),
                partition_key: partition_key.clone(),
                actions: list.by_ref().take(max_batch_size).collect(),
            });
        }
    }
    batches
}

/// Executes one migration's operations against a store.
pub struct BatchExecutor<'a, S: TableStore + ?Sized> {
    store: &'a S,
    cancel: &'a CancellationToken,
    max_batch_size: usize,
    page_size: usize,
    stats: ExecutionStats,
}

impl<'a, S: TableStore + ?Sized> BatchExecutor<'a, S> {
    /// Sizes are clamped: batches hold 1 to [`MAX_BATCH_SIZE`] actions and
    /// pages at least one row.
    pub fn new(
        store: &'a S,
        cancel: &'a CancellationToken,
        max_batch_size: usize,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            cancel,
            max_batch_size: max_batch_size.clamp(1, MAX_BATCH_SIZE),
            page_size: page_size.max(1),
            stats: ExecutionStats::default(),
        }
    }

    /// Apply `operations` table by table, submitting batches sequentially.
    ///
    /// Within a table, `DELETE *` runs as soon as it is reached, ahead of
    /// any row write. Row writes are collected and grouped by partition;
    /// an `UPDATEA` first submits the writes collected so far, so its scan
    /// sees them and its changes land after them.
    pub async fn execute(
        mut self,
        operations: Vec<MigrationOperation>,
    ) -> Result<ExecutionStats, MigrateError> {
        for group in group_by_table(operations) {
            self.execute_table(group).await?;
        }
        Ok(self.stats)
    }

    async fn execute_table(&mut self, group: TableGroup) -> Result<(), MigrateError> {
        let table = group.table;
        self.checkpoint()?;
        self.store.ensure_table(&table).await?;

        let mut actions = Vec::new();
        for op in group.operations {
            match op.operation {
                Operation::DeleteAll => self.truncate(&table).await?,
                Operation::UpdateAll(ref patch) => {
                    self.submit_all(&table, std::mem::take(&mut actions)).await?;
                    self.update_all(&table, patch).await?
                }
                _ => actions.push(op.into_action()?),
            }
        }

        self.submit_all(&table, actions).await
    }

    async fn truncate(&mut self, table: &str) -> Result<(), MigrateError> {
        warn!(table, "truncating table outside any batch");
        self.checkpoint()?;
        self.store.delete_table(table).await?;
        self.checkpoint()?;
        self.store.ensure_table(table).await?;
        self.stats.truncated_tables += 1;
        Ok(())
    }

    /// Scan the table page by page, submitting each page's changes before
    /// fetching the next one.
    async fn update_all(
        &mut self,
        table: &str,
        patch: &PropertyPatch,
    ) -> Result<(), MigrateError> {
        let store = self.store;
        let mut pager = store.query_all(table, self.page_size);
        loop {
            self.checkpoint()?;
            let Some(page) = pager.next_page().await? else {
                break;
            };
            self.stats.scanned_entities += page.len();

            let actions: Vec<BatchAction> = page
                .iter()
                .filter_map(|entity| patch.apply(entity))
                .map(|entity| BatchAction::new(ActionKind::UpdateMerge, entity))
                .collect();
            debug!(
                table,
                scanned = page.len(),
                changed = actions.len(),
                "update-all page"
            );
            self.stats.rewritten_entities += actions.len();
            self.submit_all(table, actions).await?;
        }
        Ok(())
    }

    async fn submit_all(
        &mut self,
        table: &str,
        actions: Vec<BatchAction>,
    ) -> Result<(), MigrateError> {
        for batch in chunk_by_partition(table, actions, self.max_batch_size) {
            self.checkpoint()?;
            debug!(
                table,
                partition_key = %batch.partition_key,
                actions = batch.actions.len(),
                "submitting batch"
            );
            self.store
                .submit_batch(&batch.table, &batch.partition_key, &batch.actions)
                .await?;
            self.stats.batches += 1;
            self.stats.actions += batch.actions.len();
        }
        Ok(())
    }

    fn checkpoint(&self) -> Result<(), MigrateError> {
        if self.cancel.is_cancelled() {
            Err(MigrateError::Cancelled)
        } else {
            Ok(())
        }
    }
}
