use std::path::{Path, PathBuf};

use serde::Deserialize;
use tabula_migrate::MigrationOptions;
use thiserror::Error;

/// Config file picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "tabula.toml";
/// Database used when neither the config file nor `--db` names one.
pub const DEFAULT_DATABASE: &str = "tabula.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Contents of `tabula.toml`.
///
/// ```toml
/// [store]
/// path = "data/tabula.db"
///
/// [migrations]
/// directory = "migrations"
/// extension = ".mig"
/// table_prefix = "billing"
/// page_size = 500
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub store: StoreSection,
    pub migrations: MigrationsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSection {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrationsSection {
    pub directory: Option<PathBuf>,
    pub extension: Option<String>,
    pub table_prefix: Option<String>,
    pub page_size: Option<usize>,
}

/// Flags that take precedence over the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub db: Option<PathBuf>,
    pub dir: Option<PathBuf>,
}

/// Everything a command needs to open the store and find migrations.
#[derive(Debug)]
pub struct Settings {
    pub database: PathBuf,
    pub options: MigrationOptions,
}

impl FileConfig {
    pub fn from_toml(path: &Path, content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `explicit`, or `tabula.toml` if it exists, or the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Path::new(DEFAULT_CONFIG_FILE),
            None => return Ok(Self::default()),
        };
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(path, &content)
    }

    pub fn resolve(self, overrides: Overrides) -> Settings {
        let migrations = self.migrations;
        let defaults = MigrationOptions::default();

        let mut options =
            MigrationOptions::new(overrides.dir.or(migrations.directory).unwrap_or(defaults.directory));
        if let Some(extension) = migrations.extension {
            options = options.extension(&extension);
        }
        if let Some(prefix) = migrations.table_prefix {
            options = options.table_prefix(prefix);
        }
        if let Some(page_size) = migrations.page_size {
            options = options.page_size(page_size);
        }

        Settings {
            database: overrides
                .db
                .or(self.store.path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE)),
            options,
        }
    }
}
