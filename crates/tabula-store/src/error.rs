use thiserror::Error;

/// Error returned by every [`TableStore`](crate::TableStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The table does not exist.
    #[error("table '{0}' not found")]
    TableNotFound(String),
    /// An `Add` targeted a row that already exists.
    #[error("entity ({partition_key}, {row_key}) already exists in '{table}'")]
    Conflict {
        table: String,
        partition_key: String,
        row_key: String,
    },
    /// An update or delete targeted a row that does not exist.
    #[error("entity ({partition_key}, {row_key}) not found in '{table}'")]
    EntityNotFound {
        table: String,
        partition_key: String,
        row_key: String,
    },
    /// A batch exceeded the per-transaction action limit.
    #[error("batch of {actual} actions exceeds the limit of {limit}")]
    BatchTooLarge { actual: usize, limit: usize },
    /// An action in a batch targeted a different partition than the batch.
    #[error("action targets partition '{found}' in a batch for partition '{expected}'")]
    PartitionMismatch { expected: String, found: String },
    /// One action in a batch failed; nothing in the batch was applied.
    #[error("batch rejected at action {index}: {source}")]
    BatchRejected {
        index: usize,
        #[source]
        source: Box<StoreError>,
    },
    /// Property encoding failed.
    #[error("codec error: {0}")]
    Codec(String),
    /// Internal lock poisoned.
    #[error("store lock poisoned")]
    LockPoisoned,
    /// An error from SQLite.
    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// The error behind a batch rejection, or `self`.
    pub fn root(&self) -> &StoreError {
        match self {
            Self::BatchRejected { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this error means a row already existed.
    pub fn is_conflict(&self) -> bool {
        matches!(self.root(), Self::Conflict { .. })
    }
}
