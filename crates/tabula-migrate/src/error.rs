use std::path::PathBuf;

use tabula_store::StoreError;
use thiserror::Error;

use crate::operation::OperationMode;

/// A line that does not conform to the migration format.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// Too few or too many fields, or an empty field.
    #[error("malformed line: {0}")]
    MalformedLine(String),
    /// The first field is not a known opcode.
    #[error("unsupported operation '{0}'")]
    UnsupportedOperation(String),
    /// A property carries an unknown type tag.
    #[error("unsupported type '{0}'")]
    UnsupportedType(String),
    /// A `NUMBER` value that is neither an `i64` nor an `f64`.
    #[error("invalid number '{raw}': {reason}")]
    InvalidNumber { raw: String, reason: String },
}

/// Everything that can stop a migration run.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// The migration directory could not be listed.
    #[error("failed to read migration directory {}: {source}", path.display())]
    Discover {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A migration file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A line of a migration file failed to parse.
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: ParseError,
    },
    /// The store rejected a call.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// An operation reached the planner without a batch mapping.
    #[error("operation {0:?} cannot be sent as a batch action")]
    UnsupportedOperation(OperationMode),
    /// The history record was written by someone else mid-run.
    #[error("migration '{0}' was recorded by another writer")]
    HistoryConflict(String),
    /// The run was cancelled.
    #[error("migration run cancelled")]
    Cancelled,
    /// A specific migration failed; nothing after it was attempted.
    #[error("migration '{id}' failed: {source}")]
    Migration {
        id: String,
        #[source]
        source: Box<MigrateError>,
    },
}

impl MigrateError {
    /// Identifier of the migration that failed, if known.
    pub fn migration_id(&self) -> Option<&str> {
        match self {
            Self::Migration { id, .. } => Some(id),
            _ => None,
        }
    }

    /// The underlying cause, unwrapping the per-migration context.
    pub fn cause(&self) -> &MigrateError {
        match self {
            Self::Migration { source, .. } => source.cause(),
            other => other,
        }
    }
}
