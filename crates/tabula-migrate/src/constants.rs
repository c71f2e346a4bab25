//! Fixed vocabulary of the migration format and its defaults.

/// Opcode for [`Operation::Insert`](crate::Operation::Insert).
pub const INSERT: &str = "INSERT";
/// Opcode for [`Operation::UpdateMerge`](crate::Operation::UpdateMerge).
pub const UPDATE_MERGE: &str = "UPDATEM";
/// Opcode for [`Operation::UpdateReplace`](crate::Operation::UpdateReplace).
pub const UPDATE_REPLACE: &str = "UPDATER";
/// Opcode for [`Operation::UpdateAll`](crate::Operation::UpdateAll).
pub const UPDATE_ALL: &str = "UPDATEA";
/// Opcode for [`Operation::UpsertMerge`](crate::Operation::UpsertMerge).
pub const UPSERT_MERGE: &str = "UPSERTM";
/// Opcode for [`Operation::UpsertReplace`](crate::Operation::UpsertReplace).
pub const UPSERT_REPLACE: &str = "UPSERTR";
/// Opcode for single-row and whole-table deletes.
pub const DELETE: &str = "DELETE";
/// Token that turns a `DELETE` into a table truncation.
pub const WILDCARD: &str = "*";

pub const STRING_TYPE: &str = "STRING";
pub const NUMBER_TYPE: &str = "NUMBER";
pub const BOOL_TYPE: &str = "BOOL";
pub const NULL_TYPE: &str = "NULL";

/// Separator between fields of a line.
pub const FIELD_SEPARATOR: char = ' ';
/// Separator inside a `name|value|TYPE` property token.
pub const PROPERTY_SEPARATOR: char = '|';

/// Base name of the history table (before any prefix).
pub const HISTORY_TABLE: &str = "MigrationHistories";
/// Partition key shared by every history record.
pub const HISTORY_PARTITION_KEY: &str = "migration";
/// Default extension of migration files.
pub const MIGRATION_FILE_EXTENSION: &str = ".mig";
/// Default page size for whole-table scans.
pub const DEFAULT_PAGE_SIZE: usize = 1000;
