use std::path::PathBuf;

use tabula_store::{Entity, HistoryStore, StoreError, TableStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::MigrationOptions;
use crate::constants::HISTORY_PARTITION_KEY;
use crate::error::MigrateError;
use crate::parser::parse_migration;
use crate::plan::{BatchExecutor, ExecutionStats};
use crate::source::{self, MigrationFile};

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Migrations applied by this run, in order.
    pub applied: Vec<String>,
    /// Migrations that were already recorded.
    pub skipped: Vec<String>,
}

/// Applied state of one discovered migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub id: String,
    pub path: PathBuf,
    pub applied: bool,
}

/// Applies pending migration files, in file name order, exactly once each.
///
/// Each file goes `Pending -> Applying -> Applied`, with a history record
/// written only after all of its batches succeed. The first failure stops
/// the run.
///
/// # Example
///
/// ```no_run
/// use tabula_migrate::{MigrationOptions, Migrator};
/// use tabula_store::MemoryStore;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), tabula_migrate::MigrateError> {
/// let store = MemoryStore::new();
/// let migrator = Migrator::new(&store, MigrationOptions::new("migrations"));
///
/// let summary = migrator.run(&CancellationToken::new()).await?;
/// println!("applied {:?}", summary.applied);
/// # Ok(())
/// # }
/// ```
pub struct Migrator<'a, S: ?Sized, H: ?Sized = S> {
    store: &'a S,
    history: &'a H,
    options: MigrationOptions,
}

impl<'a, S: TableStore + ?Sized> Migrator<'a, S> {
    /// Keep the history table in the same store the migrations write to.
    pub fn new(store: &'a S, options: MigrationOptions) -> Self {
        Self {
            store,
            history: store,
            options,
        }
    }
}

impl<'a, S, H> Migrator<'a, S, H>
where
    S: TableStore + ?Sized,
    H: HistoryStore + ?Sized,
{
    /// Record history in a separate store.
    pub fn with_history(store: &'a S, history: &'a H, options: MigrationOptions) -> Self {
        Self {
            store,
            history,
            options,
        }
    }

    pub fn options(&self) -> &MigrationOptions {
        &self.options
    }

    /// Apply every pending migration.
    ///
    /// Cancellation is observed before each store call; a batch already
    /// submitted is never rolled back. Once a file's last batch has been
    /// committed its history record is always written, so cancellation
    /// takes effect at the next file.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunSummary, MigrateError> {
        let files = self.discover().await?;
        let mut summary = RunSummary::default();
        if files.is_empty() {
            info!(directory = %self.options.directory.display(), "no migrations found");
            return Ok(summary);
        }

        let history_table = self.options.history_table();
        checkpoint(cancel)?;
        self.history.ensure_history_table(&history_table).await?;

        for file in files {
            match self.run_file(&file, &history_table, cancel).await {
                Ok(Some(stats)) => {
                    info!(
                        migration = %file.id,
                        batches = stats.batches,
                        actions = stats.actions,
                        "applied migration"
                    );
                    summary.applied.push(file.id);
                }
                Ok(None) => {
                    info!(migration = %file.id, "already applied, skipping");
                    summary.skipped.push(file.id);
                }
                Err(MigrateError::Cancelled) => {
                    info!(migration = %file.id, "migration run cancelled");
                    return Err(MigrateError::Cancelled);
                }
                Err(e) => {
                    error!(
                        migration = %file.id,
                        path = %file.path.display(),
                        error = %e,
                        "migration failed"
                    );
                    return Err(MigrateError::Migration {
                        id: file.id,
                        source: Box::new(e),
                    });
                }
            }
        }

        info!(
            applied = summary.applied.len(),
            skipped = summary.skipped.len(),
            "migration run complete"
        );
        Ok(summary)
    }

    /// List discovered migrations with their applied state. Writes nothing.
    pub async fn status(&self) -> Result<Vec<MigrationStatus>, MigrateError> {
        let history_table = self.options.history_table();
        let mut statuses = Vec::new();
        for file in self.discover().await? {
            let applied = match self
                .history
                .find_record(&history_table, HISTORY_PARTITION_KEY, &file.id)
                .await
            {
                Ok(record) => record.is_some(),
                Err(StoreError::TableNotFound(_)) => false,
                Err(e) => return Err(e.into()),
            };
            statuses.push(MigrationStatus {
                id: file.id,
                path: file.path,
                applied,
            });
        }
        Ok(statuses)
    }

    async fn discover(&self) -> Result<Vec<MigrationFile>, MigrateError> {
        source::discover(&self.options.directory, &self.options.extension).await
    }

    /// Apply one file. Returns `None` if it was already recorded.
    async fn run_file(
        &self,
        file: &MigrationFile,
        history_table: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ExecutionStats>, MigrateError> {
        checkpoint(cancel)?;
        if self
            .history
            .find_record(history_table, HISTORY_PARTITION_KEY, &file.id)
            .await?
            .is_some()
        {
            return Ok(None);
        }

        let content = source::read(file).await?;
        let operations =
            parse_migration(&content).map_err(|(line, source)| MigrateError::Parse { line, source })?;
        debug!(migration = %file.id, operations = operations.len(), "parsed migration");

        let stats = BatchExecutor::new(
            self.store,
            cancel,
            self.options.max_batch_size,
            self.options.page_size,
        )
        .execute(operations)
        .await?;

        // Every batch is committed: record the file even if a cancel just
        // arrived, so a rerun does not apply it twice.
        let record = Entity::new(HISTORY_PARTITION_KEY, file.id.as_str());
        self.history
            .put_record(history_table, &record)
            .await
            .map_err(|e| {
                if e.is_conflict() {
                    MigrateError::HistoryConflict(file.id.clone())
                } else {
                    e.into()
                }
            })?;

        Ok(Some(stats))
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<(), MigrateError> {
    if cancel.is_cancelled() {
        Err(MigrateError::Cancelled)
    } else {
        Ok(())
    }
}
