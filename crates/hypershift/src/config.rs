//! Configuration file handling.
//!
//! The config lives in `.config/hypershift.styx`, in the starting directory or
//! the nearest ancestor that has one. Without a file the built-in defaults
//! apply.

pub use hypershift_config::Config;

use std::path::{Path, PathBuf};
use thiserror::Error;

const CONFIG_PATH: &str = ".config/hypershift.styx";

/// Resolve the configuration for a project rooted at or below `start`.
///
/// Falls back to [`Config::default`] when no ancestor has a config file;
/// an unreadable or malformed file is still an error.
pub fn load_or_default(start: &Path) -> crate::Result<Config> {
    match find_config_file(start) {
        Some(path) => Ok(load_from(&path)?),
        None => {
            tracing::debug!(start = %start.display(), "no config file, using defaults");
            Ok(Config::default())
        }
    }
}

/// Parse the config file at `path`.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let config = facet_styx::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

/// The nearest `.config/hypershift.styx` at or above `start`.
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_PATH))
        .find(|candidate| candidate.is_file())
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {message}", path.display())]
    Io { path: PathBuf, message: String },

    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
}
