//! Locating migration files on disk.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::MigrateError;

/// A migration file and its identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// File name without the extension. Used as the history row key.
    pub id: String,
    pub path: PathBuf,
}

/// List the migration files in `directory`, sorted by file name.
///
/// Only regular files whose name ends with `extension` are returned;
/// subdirectories are not scanned. A missing directory yields no files.
pub async fn discover(directory: &Path, extension: &str) -> Result<Vec<MigrationFile>, MigrateError> {
    let discover_err = |source: io::Error| MigrateError::Discover {
        path: directory.to_path_buf(),
        source,
    };

    let mut entries = match tokio::fs::read_dir(directory).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(discover_err(e)),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(discover_err)? {
        if !entry.file_type().await.map_err(discover_err)?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(id) = name.strip_suffix(extension) else {
            continue;
        };
        if id.is_empty() {
            continue;
        }
        files.push(MigrationFile {
            id: id.to_string(),
            path: entry.path(),
        });
    }

    // Byte-wise ordering of names; file system order is unspecified.
    files.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    Ok(files)
}

/// Read a migration file as UTF-8 text.
pub async fn read(file: &MigrationFile) -> Result<String, MigrateError> {
    tokio::fs::read_to_string(&file.path)
        .await
        .map_err(|source| MigrateError::Read {
            path: file.path.clone(),
            source,
        })
}
