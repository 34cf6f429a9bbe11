//! Loading simulation configurations from JSON files.

use integrity_core::{SimError, SimulationConfig};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not a valid configuration document
    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The configuration parsed but holds out-of-domain values
    #[error(transparent)]
    Sim(#[from] SimError),
}

/// Parses and validates a configuration document.
pub fn parse_config(json: &str) -> Result<SimulationConfig, ConfigError> {
    let config: SimulationConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
}

/// Reads, parses and validates a configuration file.
pub fn load_config(path: &Path) -> Result<SimulationConfig, ConfigError> {
    let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&json)
}
