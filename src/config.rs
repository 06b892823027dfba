//! Runtime configuration: which storage backend to open and how to log.

use crate::{
    error::{Result, TodoError},
    storage::{MemoryStorage, Storage},
};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::info;

pub const ENV_STORAGE: &str = "TODOLIST_STORAGE";
pub const ENV_DATA_DIR: &str = "TODOLIST_DATA_DIR";
pub const ENV_DATABASE_PATH: &str = "TODOLIST_DATABASE_PATH";
pub const ENV_LOG: &str = "TODOLIST_LOG";

const DEFAULT_LOG_FILTER: &str = "todolist_core=info";
const DEFAULT_DATABASE_FILE: &str = "todolist.db";

/// Storage backend selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    Memory,
    File { root: PathBuf },
    Sqlite { path: PathBuf },
}

impl Default for StorageConfig {
    fn default() -> Self {
        if cfg!(feature = "file-storage") {
            Self::File {
                root: PathBuf::from("."),
            }
        } else {
            Self::Memory
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Reads `TODOLIST_*` variables from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup, falling back to defaults for
    /// unset keys
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(backend) = lookup(ENV_STORAGE) {
            config.storage = match backend.trim().to_lowercase().as_str() {
                "memory" => StorageConfig::Memory,
                "file" => StorageConfig::File {
                    root: lookup(ENV_DATA_DIR)
                        .map(PathBuf::from)
                        .unwrap_or_else(|| PathBuf::from(".")),
                },
                "sqlite" => StorageConfig::Sqlite {
                    path: lookup(ENV_DATABASE_PATH)
                        .map(PathBuf::from)
                        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_FILE)),
                },
                other => {
                    return Err(TodoError::ConfigError(format!(
                        "unknown storage backend '{}'. Valid backends: memory, file, sqlite",
                        other
                    )))
                }
            };
        } else if let Some(root) = lookup(ENV_DATA_DIR) {
            if let StorageConfig::File { root: current } = &mut config.storage {
                *current = PathBuf::from(root);
            }
        }

        if let Some(filter) = lookup(ENV_LOG) {
            config.log_filter = filter;
        }

        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Loads a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    /// Opens and initializes the configured storage backend
    pub async fn open_storage(&self) -> Result<Arc<dyn Storage>> {
        let storage: Arc<dyn Storage> = match &self.storage {
            StorageConfig::Memory => Arc::new(MemoryStorage::new()),
            #[cfg(feature = "file-storage")]
            StorageConfig::File { root } => Arc::new(crate::storage::FileStorage::new(root)),
            #[cfg(not(feature = "file-storage"))]
            StorageConfig::File { .. } => {
                return Err(TodoError::ConfigError(
                    "file storage requires the `file-storage` feature".to_string(),
                ))
            }
            #[cfg(feature = "sqlite-storage")]
            StorageConfig::Sqlite { path } => {
                Arc::new(crate::storage::SqliteStorage::open(path)?)
            }
            #[cfg(not(feature = "sqlite-storage"))]
            StorageConfig::Sqlite { .. } => {
                return Err(TodoError::ConfigError(
                    "sqlite storage requires the `sqlite-storage` feature".to_string(),
                ))
            }
        };

        storage.initialize().await?;
        info!(storage = ?self.storage, "storage opened");
        Ok(storage)
    }
}
