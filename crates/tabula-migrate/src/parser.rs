//! Parser for the line-oriented migration format.
//!
//! ```text
//! line     := opcode SP table SP rest
//! opcode   := INSERT | UPDATEM | UPDATER | UPDATEA | UPSERTM | UPSERTR | DELETE
//! rest     := partitionKey SP rowKey (SP property)*     row writes
//!           | "*"                                       DELETE, whole table
//!           | partitionKey SP rowKey                    DELETE, one row
//!           | (SP property)*                            UPDATEA
//! property := name "|" rawValue "|" typeTag
//! ```

use std::collections::BTreeSet;

use tabula_store::Entity;

use crate::constants::{
    DELETE, FIELD_SEPARATOR, INSERT, PROPERTY_SEPARATOR, UPDATE_ALL, UPDATE_MERGE, UPDATE_REPLACE,
    UPSERT_MERGE, UPSERT_REPLACE, WILDCARD,
};
use crate::error::ParseError;
use crate::operation::{MigrationOperation, Operation, PropertyPatch};
use crate::value;

/// Parse one line into an operation.
///
/// # Example
///
/// ```
/// use tabula_migrate::{parse_line, OperationMode};
///
/// let op = parse_line("INSERT orders eu o-1 total|12.5|NUMBER").unwrap();
/// assert_eq!(op.mode(), OperationMode::Insert);
/// assert_eq!(op.table, "orders");
/// ```
pub fn parse_line(line: &str) -> Result<MigrationOperation, ParseError> {
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    if fields.iter().any(|f| f.is_empty()) {
        return Err(malformed(line, "empty field"));
    }

    let (opcode, table, rest) = match fields.as_slice() {
        [opcode, table, rest @ ..] => (*opcode, *table, rest),
        _ => return Err(malformed(line, "expected an opcode and a table")),
    };

    let operation = match opcode {
        INSERT => Operation::Insert(parse_row(line, rest)?),
        UPDATE_MERGE => Operation::UpdateMerge(parse_row(line, rest)?),
        UPDATE_REPLACE => Operation::UpdateReplace(parse_row(line, rest)?),
        UPSERT_MERGE => Operation::UpsertMerge(parse_row(line, rest)?),
        UPSERT_REPLACE => Operation::UpsertReplace(parse_row(line, rest)?),
        UPDATE_ALL => Operation::UpdateAll(parse_patch(rest)?),
        DELETE => parse_delete(line, rest)?,
        other => return Err(ParseError::UnsupportedOperation(other.to_string())),
    };

    Ok(MigrationOperation::new(table, operation))
}

/// Parse every line of a migration file, stopping at the first error.
///
/// Errors carry the 1-based line number.
pub fn parse_migration(content: &str) -> Result<Vec<MigrationOperation>, (usize, ParseError)> {
    content
        .lines()
        .enumerate()
        .map(|(i, line)| parse_line(line).map_err(|e| (i + 1, e)))
        .collect()
}

fn malformed(line: &str, reason: &str) -> ParseError {
    ParseError::MalformedLine(format!("{reason}: '{line}'"))
}

fn parse_row(line: &str, rest: &[&str]) -> Result<Entity, ParseError> {
    let (partition_key, row_key, properties) = match rest {
        [pk, rk, properties @ ..] => (*pk, *rk, properties),
        _ => return Err(malformed(line, "expected a partition key and a row key")),
    };

    let mut entity = Entity::new(partition_key, row_key);
    let mut seen = BTreeSet::new();
    for token in properties {
        let (name, value) = parse_property(token)?;
        check_unique(&mut seen, name)?;
        if let Some(value) = value {
            entity.set(name, value);
        }
    }
    Ok(entity)
}

fn parse_patch(rest: &[&str]) -> Result<PropertyPatch, ParseError> {
    let mut patch = PropertyPatch::new();
    let mut seen = BTreeSet::new();
    for token in rest {
        let (name, value) = parse_property(token)?;
        check_unique(&mut seen, name)?;
        // Null values never clear a field; they are skipped.
        if let Some(value) = value {
            patch.properties.insert(name.to_string(), value);
        }
    }
    Ok(patch)
}

/// Property names are unique per line, `NULL` ones included.
fn check_unique<'a>(seen: &mut BTreeSet<&'a str>, name: &'a str) -> Result<(), ParseError> {
    if seen.insert(name) {
        Ok(())
    } else {
        Err(ParseError::MalformedLine(format!(
            "property '{name}' appears more than once"
        )))
    }
}

fn parse_delete(line: &str, rest: &[&str]) -> Result<Operation, ParseError> {
    if rest.contains(&WILDCARD) {
        return Ok(Operation::DeleteAll);
    }
    match rest {
        [pk, rk] => Ok(Operation::DeleteSingle(Entity::new(*pk, *rk))),
        _ => Err(malformed(line, "DELETE expects '*' or a partition key and a row key")),
    }
}

fn parse_property(token: &str) -> Result<(&str, Option<tabula_store::Value>), ParseError> {
    let parts: Vec<&str> = token.split(PROPERTY_SEPARATOR).collect();
    match parts.as_slice() {
        [name, raw, tag] if !name.is_empty() => Ok((*name, value::decode(raw, tag)?)),
        _ => Err(ParseError::MalformedLine(format!(
            "property '{token}' is not name|value|TYPE"
        ))),
    }
}
