use std::path::{Path, PathBuf};

use tabula_store::MAX_BATCH_SIZE;

use crate::constants::{DEFAULT_PAGE_SIZE, HISTORY_TABLE, MIGRATION_FILE_EXTENSION};

/// Where migrations live and how they are applied.
#[derive(Debug, Clone)]
pub struct MigrationOptions {
    /// Directory scanned (non-recursively) for migration files.
    pub directory: PathBuf,
    /// File name suffix that marks a migration file, including the dot.
    pub extension: String,
    /// Optional prefix for the history table name, so several projects
    /// can share one store.
    pub table_prefix: Option<String>,
    /// Page size for `UPDATEA` table scans.
    pub page_size: usize,
    /// Maximum actions per submitted batch. Clamped to the store limit.
    pub max_batch_size: usize,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("migrations"),
            extension: MIGRATION_FILE_EXTENSION.to_string(),
            table_prefix: None,
            page_size: DEFAULT_PAGE_SIZE,
            max_batch_size: MAX_BATCH_SIZE,
        }
    }
}

impl MigrationOptions {
    /// Options for migrations in `directory`, defaults elsewhere.
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Set the migration file extension (`".mig"` or `"mig"`).
    pub fn extension(mut self, extension: &str) -> Self {
        self.extension = if extension.starts_with('.') {
            extension.to_string()
        } else {
            format!(".{extension}")
        };
        self
    }

    /// Set the history table prefix.
    pub fn table_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.table_prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    /// Set the scan page size.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Set the batch size, at most [`MAX_BATCH_SIZE`].
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    /// Name of the history table, prefix included.
    pub fn history_table(&self) -> String {
        match &self.table_prefix {
            Some(prefix) => format!("{prefix}{HISTORY_TABLE}"),
            None => HISTORY_TABLE.to_string(),
        }
    }
}
