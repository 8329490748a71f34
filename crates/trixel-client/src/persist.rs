//! Persistence of the station configuration.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::config::ClientConfig;

/// Errors raised while persisting the configuration.
#[derive(Debug, Error)]
pub enum PersistError {
    /// IO error
    #[error("failed to write configuration: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("failed to serialize configuration: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Rejected by a user supplied persister
    #[error("configuration rejected: {0}")]
    Rejected(String),
}

/// Called synchronously after every durable configuration change.
pub trait ConfigPersister: Send + Sync {
    fn persist(&self, config: &ClientConfig) -> Result<(), PersistError>;
}

impl<F> ConfigPersister for F
where
    F: Fn(&ClientConfig) -> Result<(), PersistError> + Send + Sync,
{
    fn persist(&self, config: &ClientConfig) -> Result<(), PersistError> {
        self(config)
    }
}

/// Stores the configuration as pretty printed JSON.
///
/// The file is written to a temporary sibling first and then renamed over the
/// target, so a crash never leaves a truncated configuration behind.
#[derive(Debug, Clone)]
pub struct JsonFilePersister {
    path: PathBuf,
}

impl JsonFilePersister {
    /// Persist to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigPersister for JsonFilePersister {
    fn persist(&self, config: &ClientConfig) -> Result<(), PersistError> {
        let data = serde_json::to_vec_pretty(config)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "persisted client configuration");
        Ok(())
    }
}
