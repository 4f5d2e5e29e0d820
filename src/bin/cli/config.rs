use super::{JournalModeArg, SynchronousArg};
use clap::ValueEnum;
use nested_set::{SchemaBuilder, StoreOptions};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Settings loaded from the TOML config file, before command line overrides.
#[derive(Debug, Default)]
pub struct CliConfig {
    path: Option<PathBuf>,
    data: RawConfig,
}

impl CliConfig {
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit.or_else(default_config_path);
        let data = match path.as_ref() {
            Some(config_path) if config_path.exists() => read_file(config_path)?,
            _ => RawConfig::default(),
        };
        Ok(Self { path, data })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn database_path(&self, flag: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
        flag.or_else(|| self.data.store.path.clone())
            .ok_or(ConfigError::MissingDatabase)
    }

    pub fn store_options(
        &self,
        synchronous: Option<SynchronousArg>,
        journal_mode: Option<JournalModeArg>,
        busy_timeout_ms: Option<u64>,
    ) -> Result<StoreOptions, ConfigError> {
        let raw = &self.data.store;
        let mut opts = StoreOptions::default();

        let synchronous = match (synchronous, raw.synchronous.as_deref()) {
            (Some(flag), _) => Some(flag),
            (None, Some(value)) => Some(SynchronousArg::from_str(value, true).map_err(|_| {
                ConfigError::InvalidSynchronous {
                    value: value.to_string(),
                }
            })?),
            (None, None) => None,
        };
        if let Some(mode) = synchronous {
            opts.synchronous = mode.into();
        }

        let journal_mode = match (journal_mode, raw.journal_mode.as_deref()) {
            (Some(flag), _) => Some(flag),
            (None, Some(value)) => Some(JournalModeArg::from_str(value, true).map_err(|_| {
                ConfigError::InvalidJournalMode {
                    value: value.to_string(),
                }
            })?),
            (None, None) => None,
        };
        if let Some(mode) = journal_mode {
            opts.journal_mode = mode.into();
        }

        if let Some(timeout) = busy_timeout_ms.or(raw.busy_timeout_ms) {
            opts.busy_timeout_ms = timeout;
        }
        Ok(opts)
    }

    /// Schema builder from the `[schema]` section, with flag overrides applied.
    ///
    /// Names are validated later by [`SchemaBuilder::build`].
    pub fn schema_builder(
        &self,
        table: Option<String>,
        payload_columns: Option<Vec<String>>,
    ) -> Result<SchemaBuilder, ConfigError> {
        let raw = &self.data.schema;
        let table = table
            .or_else(|| raw.table.clone())
            .ok_or(ConfigError::MissingTable)?;
        let mut builder = SchemaBuilder::new(table);
        if let Some(key) = &raw.key_column {
            builder = builder.key_column(key);
        }
        if let Some(left) = &raw.left_column {
            builder = builder.left_column(left);
        }
        if let Some(right) = &raw.right_column {
            builder = builder.right_column(right);
        }
        if let Some(prefix) = &raw.prefix {
            builder = builder.prefix(prefix);
        }
        let payload = payload_columns.unwrap_or_else(|| raw.payload_columns.clone());
        Ok(builder.payload_columns(payload))
    }
}

fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    store: StoreSection,
    #[serde(default)]
    schema: SchemaSection,
}

#[derive(Debug, Default, Deserialize)]
struct StoreSection {
    path: Option<PathBuf>,
    journal_mode: Option<String>,
    synchronous: Option<String>,
    busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SchemaSection {
    table: Option<String>,
    key_column: Option<String>,
    left_column: Option<String>,
    right_column: Option<String>,
    #[serde(default)]
    payload_columns: Vec<String>,
    prefix: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("synchronous value '{value}' is invalid")]
    InvalidSynchronous { value: String },
    #[error("journal_mode value '{value}' is invalid")]
    InvalidJournalMode { value: String },
    #[error("no database given; pass --db or set [store] path in the config")]
    MissingDatabase,
    #[error("no table given; pass --table or set [schema] table in the config")]
    MissingTable,
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("nested-set").join("config.toml"))
}
