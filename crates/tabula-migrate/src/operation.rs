use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tabula_store::{ActionKind, BatchAction, Entity, Value};

use crate::constants::{
    DELETE, FIELD_SEPARATOR, INSERT, PROPERTY_SEPARATOR, UPDATE_ALL, UPDATE_MERGE, UPDATE_REPLACE,
    UPSERT_MERGE, UPSERT_REPLACE, WILDCARD,
};
use crate::error::MigrateError;
use crate::value;

/// The kind of change an operation makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationMode {
    Insert,
    UpdateMerge,
    UpdateReplace,
    UpsertMerge,
    UpsertReplace,
    UpdateAll,
    DeleteSingle,
    DeleteAll,
}

impl OperationMode {
    /// The store primitive this mode maps to, if it is a single-row write.
    ///
    /// `UpdateAll` and `DeleteAll` have no batch mapping: they are expanded
    /// or executed directly by the planner.
    pub fn action_kind(self) -> Option<ActionKind> {
        match self {
            Self::Insert => Some(ActionKind::Add),
            Self::UpdateMerge => Some(ActionKind::UpdateMerge),
            Self::UpdateReplace => Some(ActionKind::UpdateReplace),
            Self::UpsertMerge => Some(ActionKind::UpsertMerge),
            Self::UpsertReplace => Some(ActionKind::UpsertReplace),
            Self::DeleteSingle => Some(ActionKind::Delete),
            Self::UpdateAll | Self::DeleteAll => None,
        }
    }

    /// Opcode used in migration files.
    pub fn opcode(self) -> &'static str {
        match self {
            Self::Insert => INSERT,
            Self::UpdateMerge => UPDATE_MERGE,
            Self::UpdateReplace => UPDATE_REPLACE,
            Self::UpsertMerge => UPSERT_MERGE,
            Self::UpsertReplace => UPSERT_REPLACE,
            Self::UpdateAll => UPDATE_ALL,
            Self::DeleteSingle | Self::DeleteAll => DELETE,
        }
    }
}

/// A partial overwrite applied to every row of a table.
///
/// This is the transform carried by `UPDATEA`: a plain value rather than
/// a closure, so operations stay comparable and serializable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyPatch {
    pub properties: BTreeMap<String, Value>,
}

impl PropertyPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style property setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Apply the patch to `entity`.
    ///
    /// Returns `None` when the patch would not change anything, so the row
    /// can be skipped.
    pub fn apply(&self, entity: &Entity) -> Option<Entity> {
        let changes = self
            .properties
            .iter()
            .any(|(name, value)| entity.get(name) != Some(value));
        if !changes {
            return None;
        }

        let mut patched = entity.clone();
        for (name, value) in &self.properties {
            patched.set(name.clone(), value.clone());
        }
        Some(patched)
    }
}

/// What an operation does, with exactly the data that change needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    Insert(Entity),
    UpdateMerge(Entity),
    UpdateReplace(Entity),
    UpsertMerge(Entity),
    UpsertReplace(Entity),
    /// Keys only; properties are ignored.
    DeleteSingle(Entity),
    UpdateAll(PropertyPatch),
    DeleteAll,
}

/// One parsed line of a migration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationOperation {
    /// Target table.
    pub table: String,
    pub operation: Operation,
}

impl MigrationOperation {
    pub fn new(table: impl Into<String>, operation: Operation) -> Self {
        Self {
            table: table.into(),
            operation,
        }
    }

    pub fn mode(&self) -> OperationMode {
        match &self.operation {
            Operation::Insert(_) => OperationMode::Insert,
            Operation::UpdateMerge(_) => OperationMode::UpdateMerge,
            Operation::UpdateReplace(_) => OperationMode::UpdateReplace,
            Operation::UpsertMerge(_) => OperationMode::UpsertMerge,
            Operation::UpsertReplace(_) => OperationMode::UpsertReplace,
            Operation::DeleteSingle(_) => OperationMode::DeleteSingle,
            Operation::UpdateAll(_) => OperationMode::UpdateAll,
            Operation::DeleteAll => OperationMode::DeleteAll,
        }
    }

    /// The target row, for every mode except `UpdateAll` and `DeleteAll`.
    pub fn entity(&self) -> Option<&Entity> {
        match &self.operation {
            Operation::Insert(e)
            | Operation::UpdateMerge(e)
            | Operation::UpdateReplace(e)
            | Operation::UpsertMerge(e)
            | Operation::UpsertReplace(e)
            | Operation::DeleteSingle(e) => Some(e),
            Operation::UpdateAll(_) | Operation::DeleteAll => None,
        }
    }

    /// The table-wide transform, for `UpdateAll` only.
    pub fn transform(&self) -> Option<&PropertyPatch> {
        match &self.operation {
            Operation::UpdateAll(patch) => Some(patch),
            _ => None,
        }
    }

    /// Convert a single-row operation into a batch action.
    pub fn into_action(self) -> Result<BatchAction, MigrateError> {
        let mode = self.mode();
        let kind = mode
            .action_kind()
            .ok_or(MigrateError::UnsupportedOperation(mode))?;
        match self.operation {
            Operation::DeleteSingle(e) => Ok(BatchAction::new(
                kind,
                Entity::new(e.partition_key, e.row_key),
            )),
            Operation::Insert(e)
            | Operation::UpdateMerge(e)
            | Operation::UpdateReplace(e)
            | Operation::UpsertMerge(e)
            | Operation::UpsertReplace(e) => Ok(BatchAction::new(kind, e)),
            Operation::UpdateAll(_) | Operation::DeleteAll => {
                Err(MigrateError::UnsupportedOperation(mode))
            }
        }
    }
}

fn write_properties(f: &mut fmt::Formatter<'_>, properties: &BTreeMap<String, Value>) -> fmt::Result {
    for (name, value) in properties {
        let (raw, tag) = value::encode(value);
        write!(
            f,
            "{FIELD_SEPARATOR}{name}{PROPERTY_SEPARATOR}{raw}{PROPERTY_SEPARATOR}{tag}"
        )?;
    }
    Ok(())
}

/// Renders the operation as a migration file line.
impl fmt::Display for MigrationOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sp = FIELD_SEPARATOR;
        write!(f, "{}{sp}{}", self.mode().opcode(), self.table)?;
        match &self.operation {
            Operation::DeleteAll => write!(f, "{sp}{WILDCARD}"),
            Operation::DeleteSingle(e) => write!(f, "{sp}{}{sp}{}", e.partition_key, e.row_key),
            Operation::UpdateAll(patch) => write_properties(f, &patch.properties),
            Operation::Insert(e)
            | Operation::UpdateMerge(e)
            | Operation::UpdateReplace(e)
            | Operation::UpsertMerge(e)
            | Operation::UpsertReplace(e) => {
                write!(f, "{sp}{}{sp}{}", e.partition_key, e.row_key)?;
                write_properties(f, &e.properties)
            }
        }
    }
}
