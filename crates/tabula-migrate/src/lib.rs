//! # tabula-migrate
//!
//! Versioned, run-once data migrations for partitioned table stores.
//!
//! Migrations are plain text files, one operation per line:
//!
//! ```text
//! INSERT orders eu o-1 status|open|STRING total|12.5|NUMBER
//! UPSERTM customers eu c-7 vip|TRUE|BOOL
//! UPDATEA orders status|archived|STRING
//! DELETE sessions *
//! ```
//!
//! The [`Migrator`] applies the files of a directory in file name order.
//! Each file's operations are grouped by table and partition and sent to
//! the store as atomic batches of at most 100 actions, and a history
//! record is written once the whole file succeeded. Recorded files are
//! skipped on later runs.
//!
//! ## Quick Start
//!
//! ```
//! use tabula_migrate::{parse_migration, OperationMode};
//!
//! let ops = parse_migration("DELETE sessions *\nINSERT orders eu o-1 n|1|NUMBER").unwrap();
//! assert_eq!(ops[0].mode(), OperationMode::DeleteAll);
//! assert_eq!(ops[1].to_string(), "INSERT orders eu o-1 n|1|NUMBER");
//! ```
//!
//! ## Guarantees
//!
//! - Each batch is atomic. A file is not: if a later batch fails, earlier
//!   batches stay committed and no history record is written.
//! - `DELETE <table> *` truncates immediately, outside any batch.
//! - `UPDATEA` scans the table one page at a time and merges only the rows
//!   its properties would change.

mod config;
pub mod constants;
mod engine;
mod error;
mod operation;
mod parser;
mod plan;
mod source;
pub mod value;

pub use config::MigrationOptions;
pub use engine::{MigrationStatus, Migrator, RunSummary};
pub use error::{MigrateError, ParseError};
pub use operation::{MigrationOperation, Operation, OperationMode, PropertyPatch};
pub use parser::{parse_line, parse_migration};
pub use plan::{chunk_by_partition, group_by_table, Batch, BatchExecutor, ExecutionStats, TableGroup};
pub use source::{discover, MigrationFile};

pub use tokio_util::sync::CancellationToken;
